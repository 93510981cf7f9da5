//! Multi-result adjustment.
//!
//! Calls and `...` produce value lists; every binding site resizes them to
//! the exact arity it needs.

use crate::value::Value;

/// Truncate or pad with `nil` to exactly `n` values.
pub fn adjust(mut values: Vec<Value>, n: usize) -> Vec<Value> {
    values.resize(n, Value::Nil);
    values
}

/// Truncate to a single value, `nil` when the list is empty.
pub fn first(values: Vec<Value>) -> Value {
    values.into_iter().next().unwrap_or_default()
}

/// Value at position `i`, `nil` past the end.
pub fn nth(values: &[Value], i: usize) -> Value {
    values.get(i).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|&i| Value::integer(i)).collect()
    }

    #[test]
    fn adjust_truncates_and_pads() {
        assert_eq!(adjust(ints(&[1, 2, 3]), 2), ints(&[1, 2]));
        assert_eq!(adjust(ints(&[1]), 3), vec![Value::integer(1), Value::Nil, Value::Nil]);
        assert!(adjust(ints(&[1, 2]), 0).is_empty());
    }

    #[test]
    fn adjust_is_idempotent() {
        let lists = [ints(&[]), ints(&[1]), ints(&[1, 2, 3, 4])];
        for list in lists.iter() {
            for n in 0..6 {
                let once = adjust(list.clone(), n);
                assert_eq!(adjust(once.clone(), n), once);
            }
        }
    }

    #[test]
    fn first_of_empty_is_nil() {
        assert_eq!(first(Vec::new()), Value::Nil);
        assert_eq!(first(ints(&[100, 200, 300])), Value::integer(100));
        assert_eq!(nth(&ints(&[1]), 4), Value::Nil);
    }
}
