//! Metamethod names and raw metatable lookup.

use crate::value::{TableRef, Value};

pub const INDEX: &str = "__index";
pub const NEWINDEX: &str = "__newindex";
pub const CALL: &str = "__call";
pub const EQ: &str = "__eq";
pub const LT: &str = "__lt";
pub const LE: &str = "__le";
pub const CONCAT: &str = "__concat";
pub const LEN: &str = "__len";
pub const CLOSE: &str = "__close";
pub const TOSTRING: &str = "__tostring";
pub const NAME: &str = "__name";
pub const PAIRS: &str = "__pairs";
pub const METATABLE: &str = "__metatable";

/// Longest `__index` / `__newindex` table chain followed before giving up.
pub const MAX_TAG_LOOP: usize = 2000;

/// Field `event` of the metatable of `value`, `nil` if either is missing.
pub fn get_metamethod(value: &Value, event: &str) -> Value {
    match value.metatable() {
        Some(mt) => mt.borrow().get_str(event),
        None => Value::Nil,
    }
}

/// First of the two operands' handlers for a binary event.
pub fn get_binary_metamethod(a: &Value, b: &Value, event: &str) -> Value {
    let handler = get_metamethod(a, event);
    if handler.is_nil() {
        get_metamethod(b, event)
    } else {
        handler
    }
}

/// A table's `__metatable` guard, if its metatable sets one.
pub fn protected_field(metatable: &TableRef) -> Option<Value> {
    let field = metatable.borrow().get_str(METATABLE);
    if field.is_nil() {
        None
    } else {
        Some(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_lookup_prefers_first_operand() {
        let left = TableRef::new();
        let right = TableRef::new();
        let mt_left = TableRef::new();
        let mt_right = TableRef::new();
        mt_left.borrow_mut().set_str("__add", Value::from("left"));
        mt_right.borrow_mut().set_str("__add", Value::from("right"));
        left.borrow_mut().set_metatable(Some(mt_left));
        right.borrow_mut().set_metatable(Some(mt_right));

        let (l, r) = (Value::from(left), Value::from(right));
        assert_eq!(get_binary_metamethod(&l, &r, "__add"), Value::from("left"));
        assert_eq!(get_binary_metamethod(&Value::integer(1), &r, "__add"), Value::from("right"));
        assert_eq!(get_binary_metamethod(&Value::Nil, &Value::Nil, "__add"), Value::Nil);
    }
}
