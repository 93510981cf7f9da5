//! Lua table storage.
//!
//! Entries live in an insertion-ordered [`IndexMap`]. Assigning `nil` to an
//! existing key leaves a tombstone instead of removing the slot, which keeps
//! `next` stable while a traversal clears fields. Tombstones are compacted
//! only when a brand-new key is inserted outside a traversal.
//!
//! `next(t, nil)` records how many slots exist; the rest of that traversal
//! stops there, so keys inserted mid-traversal are not visited.

use std::cell::Cell;

use indexmap::IndexMap;
use thiserror::Error;

use crate::arith::float_to_integer;
use crate::value::{FunctionRef, LuaString, Number, TableRef, ThreadRef, UserDataRef, Value};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("table index is nil")]
    NilKey,

    #[error("table index is NaN")]
    NaNKey,

    #[error("invalid key to 'next'")]
    InvalidNextKey,
}

/// Normalised, hashable form of a non-nil, non-NaN key.
///
/// Floats with an exact integer value are stored as `Integer`, so `t[1]`
/// and `t[1.0]` name the same slot. Remaining floats are stored by bit
/// pattern; `-0.0` never reaches that arm because it is integral.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableKey {
    Boolean(bool),
    Integer(i64),
    Float(u64),
    String(LuaString),
    Table(TableRef),
    Function(FunctionRef),
    UserData(UserDataRef),
    Thread(ThreadRef),
}

impl TableKey {
    pub fn new(key: &Value) -> Result<TableKey, TableError> {
        Ok(match key {
            Value::Nil => return Err(TableError::NilKey),
            Value::Boolean(b) => TableKey::Boolean(*b),
            Value::Number(Number::Integer(i)) => TableKey::Integer(*i),
            Value::Number(Number::Float(f)) => {
                if f.is_nan() {
                    return Err(TableError::NaNKey);
                }
                match float_to_integer(*f) {
                    Some(i) => TableKey::Integer(i),
                    None => TableKey::Float(f.to_bits()),
                }
            }
            Value::String(s) => TableKey::String(s.clone()),
            Value::Table(t) => TableKey::Table(t.clone()),
            Value::Function(f) => TableKey::Function(f.clone()),
            Value::UserData(u) => TableKey::UserData(u.clone()),
            Value::Thread(t) => TableKey::Thread(t.clone()),
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            TableKey::Boolean(b) => Value::Boolean(*b),
            TableKey::Integer(i) => Value::integer(*i),
            TableKey::Float(bits) => Value::float(f64::from_bits(*bits)),
            TableKey::String(s) => Value::String(s.clone()),
            TableKey::Table(t) => Value::Table(t.clone()),
            TableKey::Function(f) => Value::Function(f.clone()),
            TableKey::UserData(u) => Value::UserData(u.clone()),
            TableKey::Thread(t) => Value::Thread(t.clone()),
        }
    }
}

#[derive(Default)]
pub struct Table {
    entries: IndexMap<TableKey, Value>,
    metatable: Option<TableRef>,
    tombstones: usize,

    /// Slot count when the current traversal started.
    horizon: Cell<Option<usize>>,

    /// Largest `n` such that `1..=n` are all non-nil.
    border: i64,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding `values` at keys `1..=n`.
    pub fn from_sequence(values: Vec<Value>) -> Self {
        let mut table = Table::new();
        for (i, value) in values.into_iter().enumerate() {
            table.set_int(i as i64 + 1, value);
        }
        table
    }

    /// Raw read. Absent keys, `nil` and NaN all read as `nil`.
    pub fn get(&self, key: &Value) -> Value {
        match TableKey::new(key) {
            Ok(k) => self.get_key(&k),
            Err(_) => Value::Nil,
        }
    }

    pub fn get_int(&self, i: i64) -> Value {
        self.get_key(&TableKey::Integer(i))
    }

    pub fn get_str(&self, name: &str) -> Value {
        self.get_key(&TableKey::String(LuaString::from(name)))
    }

    fn get_key(&self, key: &TableKey) -> Value {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    /// Raw write. Fails for `nil` and NaN keys.
    pub fn put(&mut self, key: Value, value: Value) -> Result<(), TableError> {
        let key = TableKey::new(&key)?;
        self.put_key(key, value);
        Ok(())
    }

    pub fn set_int(&mut self, i: i64, value: Value) {
        self.put_key(TableKey::Integer(i), value)
    }

    pub fn set_str(&mut self, name: &str, value: Value) {
        self.put_key(TableKey::String(LuaString::from(name)), value)
    }

    fn put_key(&mut self, key: TableKey, value: Value) {
        let index = match &key {
            TableKey::Integer(i) => Some(*i),
            _ => None,
        };
        let is_nil = value.is_nil();

        match self.entries.get_mut(&key) {
            Some(slot) => {
                match (slot.is_nil(), is_nil) {
                    (false, true) => self.tombstones += 1,
                    (true, false) => self.tombstones -= 1,
                    _ => {}
                }
                *slot = value;
            }
            None if is_nil => return,
            None => {
                if self.horizon.get().is_none()
                    && self.tombstones > 0
                    && self.tombstones * 2 > self.entries.len()
                {
                    self.compact();
                }
                self.entries.insert(key, value);
            }
        }

        if let Some(i) = index {
            self.update_border(i, is_nil);
        }
    }

    fn update_border(&mut self, i: i64, is_nil: bool) {
        if is_nil {
            if i >= 1 && i <= self.border {
                self.border = i - 1;
            }
        } else if self.border < i64::MAX && i == self.border + 1 {
            let mut n = i;
            while n < i64::MAX && !self.get_int(n + 1).is_nil() {
                n += 1;
            }
            self.border = n;
        }
    }

    fn compact(&mut self) {
        self.entries.retain(|_, v| !v.is_nil());
        self.tombstones = 0;
    }

    /// Length without `__len`: the border reached by probing upward from 1.
    pub fn len(&self) -> i64 {
        self.border
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == self.tombstones
    }

    /// Entry following `key` in traversal order, `nil` starts the traversal.
    /// `Ok(None)` marks the end.
    pub fn next(&self, key: &Value) -> Result<Option<(Value, Value)>, TableError> {
        let start = if key.is_nil() {
            self.horizon.set(Some(self.entries.len()));
            0
        } else {
            let k = TableKey::new(key).map_err(|_| TableError::InvalidNextKey)?;
            match self.entries.get_index_of(&k) {
                Some(i) => i + 1,
                None => return Err(TableError::InvalidNextKey),
            }
        };

        let end = match self.horizon.get() {
            Some(h) => h.min(self.entries.len()),
            None => self.entries.len(),
        };
        let found = (start..end)
            .filter_map(|i| self.entries.get_index(i))
            .find(|(_, v)| !v.is_nil())
            .map(|(k, v)| (k.to_value(), v.clone()));
        if found.is_none() {
            self.horizon.set(None);
        }
        Ok(found)
    }

    /// Live entries in traversal order.
    pub fn iter(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        self.entries
            .iter()
            .filter(|(_, v)| !v.is_nil())
            .map(|(k, v)| (k.to_value(), v.clone()))
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.clone()
    }

    pub fn set_metatable(&mut self, metatable: Option<TableRef>) {
        self.metatable = metatable;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_keys_normalise_to_integers() {
        let mut t = Table::new();
        t.put(Value::float(2.0), Value::from("two")).unwrap();
        assert_eq!(t.get_int(2), Value::from("two"));
        t.put(Value::float(2.5), Value::from("half")).unwrap();
        assert_eq!(t.get(&Value::float(2.5)), Value::from("half"));
    }

    #[test]
    fn nil_and_nan_keys_are_rejected() {
        let mut t = Table::new();
        assert_eq!(t.put(Value::Nil, Value::integer(1)), Err(TableError::NilKey));
        assert_eq!(
            t.put(Value::float(f64::NAN), Value::integer(1)),
            Err(TableError::NaNKey)
        );
        assert_eq!(t.get(&Value::Nil), Value::Nil);
    }

    #[test]
    fn border_probes_from_one() {
        let mut t = Table::from_sequence(vec![Value::integer(1), Value::integer(2), Value::integer(3)]);
        t.set_int(5, Value::integer(5));
        assert_eq!(t.len(), 3);
        t.set_int(4, Value::integer(4));
        assert_eq!(t.len(), 5);
        t.set_int(2, Value::Nil);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn clearing_during_traversal_keeps_next_valid() {
        let mut t = Table::new();
        for name in ["a", "b", "c", "d"] {
            t.set_str(name, Value::from(true));
        }

        let mut seen = Vec::new();
        let mut key = Value::Nil;
        while let Some((k, _)) = t.next(&key).unwrap() {
            t.put(k.clone(), Value::Nil).unwrap();
            seen.push(k.clone());
            key = k;
        }

        assert_eq!(seen.len(), 4);
        assert!(t.is_empty());
    }

    #[test]
    fn keys_inserted_during_traversal_are_not_visited() {
        let mut t = Table::new();
        t.set_str("a", Value::integer(1));

        let mut visits = 0;
        let mut key = Value::Nil;
        while let Some((k, _)) = t.next(&key).unwrap() {
            visits += 1;
            t.set_str(&format!("new{}", visits), Value::from(true));
            key = k;
        }

        assert_eq!(visits, 1);
        assert_eq!(t.iter().count(), 2);
    }

    #[test]
    fn inserts_while_clearing_do_not_lose_the_cursor() {
        let mut t = Table::new();
        for i in 0..8 {
            t.set_str(&format!("k{}", i), Value::integer(i));
        }

        let mut seen = 0;
        let mut key = Value::Nil;
        while let Some((k, _)) = t.next(&key).unwrap() {
            seen += 1;
            t.put(k.clone(), Value::Nil).unwrap();
            t.set_str(&format!("fresh{}", seen), Value::from(true));
            key = k;
        }

        assert_eq!(seen, 8);
        assert_eq!(t.iter().count(), 8);
        assert!(t.iter().all(|(k, _)| k.to_string().starts_with("fresh")));
    }

    #[test]
    fn unknown_next_key_is_an_error() {
        let t = Table::new();
        assert_eq!(t.next(&Value::from("x")), Err(TableError::InvalidNextKey));
    }
}
