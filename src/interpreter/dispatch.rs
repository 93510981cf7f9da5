//! Metamethod-aware primitives.
//!
//! Each operation tries the raw behaviour first and falls back to the
//! operand's metatable. Errors name the offending operand through a
//! [`VarInfo`] callback, which the expression evaluator builds from the
//! source expression and which host callers replace with [`no_info`].

use log::trace;

use crate::arith::{self, ArithOp};
use crate::metamethod::{self, get_binary_metamethod, get_metamethod, MAX_TAG_LOOP};
use crate::multires;
use crate::value::{LuaString, Value};
use crate::error::Result;

use super::Interpreter;

/// Variable description for operand `i` of an operation, e.g.
/// `" (global 'x')"`, or an empty string.
pub(crate) type VarInfo<'a> = &'a dyn Fn(usize) -> String;

pub(crate) fn no_info(_: usize) -> String {
    String::new()
}

impl Interpreter {
    // ─────────────────────────────────────────────────────────────────────────
    // Indexing
    // ─────────────────────────────────────────────────────────────────────────

    /// `obj[key]`, following `__index` tables and functions.
    pub(crate) fn index(
        &mut self,
        obj: Value,
        key: Value,
        line: Option<usize>,
        info: VarInfo,
    ) -> Result<Value> {
        let mut obj = obj;
        for step in 0..MAX_TAG_LOOP {
            let handler = match &obj {
                Value::Table(t) => {
                    let raw = t.borrow().get(&key);
                    if !raw.is_nil() {
                        return Ok(raw);
                    }
                    let handler = get_metamethod(&obj, metamethod::INDEX);
                    if handler.is_nil() {
                        return Ok(Value::Nil);
                    }
                    handler
                }
                other => {
                    let handler = get_metamethod(other, metamethod::INDEX);
                    if handler.is_nil() {
                        let what = if step == 0 { info(0) } else { String::new() };
                        return Err(self.raise(
                            line,
                            format!("attempt to index a {} value{}", other.type_name(), what),
                        ));
                    }
                    handler
                }
            };

            if let Value::Function(_) = handler {
                trace!("__index handler called for key {}", key);
                let results = self.call_value(handler, vec![obj, key], line, &no_info)?;
                return Ok(multires::first(results));
            }
            obj = handler;
        }

        Err(self.raise(line, "'__index' chain too long; possibly a loop"))
    }

    /// `obj[key] = value`, following `__newindex` tables and functions.
    pub(crate) fn set_index(
        &mut self,
        obj: Value,
        key: Value,
        value: Value,
        line: Option<usize>,
        info: VarInfo,
    ) -> Result<()> {
        let mut obj = obj;
        for step in 0..MAX_TAG_LOOP {
            let handler = match &obj {
                Value::Table(t) => {
                    let handler = get_metamethod(&obj, metamethod::NEWINDEX);
                    if handler.is_nil() || !t.borrow().get(&key).is_nil() {
                        let stored = t.borrow_mut().put(key, value);
                        return stored.map_err(|e| self.raise(line, e.to_string()));
                    }
                    handler
                }
                other => {
                    let handler = get_metamethod(other, metamethod::NEWINDEX);
                    if handler.is_nil() {
                        let what = if step == 0 { info(0) } else { String::new() };
                        return Err(self.raise(
                            line,
                            format!("attempt to index a {} value{}", other.type_name(), what),
                        ));
                    }
                    handler
                }
            };

            if let Value::Function(_) = handler {
                self.call_value(handler, vec![obj, key, value], line, &no_info)?;
                return Ok(());
            }
            obj = handler;
        }

        Err(self.raise(line, "'__newindex' chain too long; possibly a loop"))
    }

    /// Metamethod-aware read for natives (`ipairs` and friends).
    pub fn get_index(&mut self, obj: &Value, key: &Value) -> Result<Value> {
        self.index(obj.clone(), key.clone(), None, &no_info)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Arithmetic
    // ─────────────────────────────────────────────────────────────────────────

    /// Binary arithmetic or bitwise operation; unary ones pass the operand
    /// twice, as Lua does for their metamethods.
    pub(crate) fn arith_values(
        &mut self,
        op: ArithOp,
        a: Value,
        b: Value,
        line: Option<usize>,
        info: VarInfo,
    ) -> Result<Value> {
        let numbers = (arith::to_number(&a), arith::to_number(&b));

        if let (Some(x), Some(y)) = numbers {
            let integral = arith::number_to_integer(x).is_some() && arith::number_to_integer(y).is_some();
            if !op.is_bitwise() || integral {
                return arith::arith(op, x, y)
                    .map(Value::Number)
                    .map_err(|e| self.raise(line, e.to_string()));
            }
        }

        let handler = get_binary_metamethod(&a, &b, op.event());
        if !handler.is_nil() {
            let results = self.call_value(handler, vec![a, b], line, &no_info)?;
            return Ok(multires::first(results));
        }

        let message = match numbers {
            (Some(_), Some(y)) => {
                let bad = if arith::number_to_integer(y).is_none() { 1 } else { 0 };
                format!("number has no integer representation{}", info(bad))
            }
            (x, _) => {
                let (bad, value) = if x.is_none() { (0, &a) } else { (1, &b) };
                let what = if op.is_bitwise() {
                    "perform bitwise operation on"
                } else {
                    "perform arithmetic on"
                };
                format!("attempt to {} a {} value{}", what, value.type_name(), info(bad))
            }
        };
        Err(self.raise(line, message))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Comparison
    // ─────────────────────────────────────────────────────────────────────────

    /// `a == b`. `__eq` is consulted only for two distinct tables or two
    /// distinct userdata.
    pub(crate) fn values_equal(&mut self, a: &Value, b: &Value, line: Option<usize>) -> Result<bool> {
        if a.raw_equals(b) {
            return Ok(true);
        }
        match (a, b) {
            (Value::Table(_), Value::Table(_)) | (Value::UserData(_), Value::UserData(_)) => {
                let handler = get_binary_metamethod(a, b, metamethod::EQ);
                if handler.is_nil() {
                    return Ok(false);
                }
                let results = self.call_value(handler, vec![a.clone(), b.clone()], line, &no_info)?;
                Ok(multires::first(results).is_truthy())
            }
            _ => Ok(false),
        }
    }

    pub(crate) fn less_than(&mut self, a: &Value, b: &Value, line: Option<usize>) -> Result<bool> {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => Ok(arith::num_lt(*x, *y)),
            (Value::String(x), Value::String(y)) => Ok(x.as_bytes() < y.as_bytes()),
            _ => self.compare_by_metamethod(a, b, metamethod::LT, line),
        }
    }

    pub(crate) fn less_equal(&mut self, a: &Value, b: &Value, line: Option<usize>) -> Result<bool> {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => Ok(arith::num_le(*x, *y)),
            (Value::String(x), Value::String(y)) => Ok(x.as_bytes() <= y.as_bytes()),
            _ => self.compare_by_metamethod(a, b, metamethod::LE, line),
        }
    }

    fn compare_by_metamethod(
        &mut self,
        a: &Value,
        b: &Value,
        event: &str,
        line: Option<usize>,
    ) -> Result<bool> {
        let handler = get_binary_metamethod(a, b, event);
        if handler.is_nil() {
            let (ta, tb) = (a.type_name(), b.type_name());
            let message = if ta == tb {
                format!("attempt to compare two {} values", ta)
            } else {
                format!("attempt to compare {} with {}", ta, tb)
            };
            return Err(self.raise(line, message));
        }
        let results = self.call_value(handler, vec![a.clone(), b.clone()], line, &no_info)?;
        Ok(multires::first(results).is_truthy())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Concatenation and length
    // ─────────────────────────────────────────────────────────────────────────

    pub(crate) fn concat_values(
        &mut self,
        a: Value,
        b: Value,
        line: Option<usize>,
        info: VarInfo,
    ) -> Result<Value> {
        let left = arith::to_concat_string(&a);
        let right = arith::to_concat_string(&b);
        if let (Some(x), Some(y)) = (&left, &right) {
            return Ok(Value::String(x.concat(y.as_bytes())));
        }

        let handler = get_binary_metamethod(&a, &b, metamethod::CONCAT);
        if !handler.is_nil() {
            let results = self.call_value(handler, vec![a, b], line, &no_info)?;
            return Ok(multires::first(results));
        }

        let (bad, value) = if left.is_none() { (0, &a) } else { (1, &b) };
        Err(self.raise(
            line,
            format!("attempt to concatenate a {} value{}", value.type_name(), info(bad)),
        ))
    }

    /// `#v`: string byte length, `__len`, or the table border.
    pub(crate) fn length(&mut self, v: Value, line: Option<usize>, info: VarInfo) -> Result<Value> {
        if let Value::String(s) = &v {
            return Ok(Value::integer(s.len() as i64));
        }

        let handler = get_metamethod(&v, metamethod::LEN);
        if !handler.is_nil() {
            let results = self.call_value(handler, vec![v.clone(), v], line, &no_info)?;
            return Ok(multires::first(results));
        }

        match &v {
            Value::Table(t) => Ok(Value::integer(t.borrow().len())),
            other => Err(self.raise(
                line,
                format!("attempt to get length of a {} value{}", other.type_name(), info(0)),
            )),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Calls
    // ─────────────────────────────────────────────────────────────────────────

    /// Call `callee`, resolving `__call` on non-functions. The handler gets
    /// the original object as an extra first argument.
    pub(crate) fn call_value(
        &mut self,
        callee: Value,
        mut args: Vec<Value>,
        line: Option<usize>,
        info: VarInfo,
    ) -> Result<Vec<Value>> {
        let mut callee = callee;
        for step in 0..MAX_TAG_LOOP {
            if let Value::Function(f) = &callee {
                return self.invoke(f, args, line);
            }

            let handler = get_metamethod(&callee, metamethod::CALL);
            if handler.is_nil() {
                let what = if step == 0 { info(0) } else { String::new() };
                return Err(self.raise(
                    line,
                    format!("attempt to call a {} value{}", callee.type_name(), what),
                ));
            }
            args.insert(0, callee);
            callee = handler;
        }

        Err(self.raise(line, "'__call' chain too long; possibly a loop"))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Display and closing
    // ─────────────────────────────────────────────────────────────────────────

    /// Display string honouring `__tostring` and `__name`.
    pub fn tostring(&mut self, v: &Value) -> Result<LuaString> {
        let handler = get_metamethod(v, metamethod::TOSTRING);
        if !handler.is_nil() {
            let result = multires::first(self.call(&handler, vec![v.clone()])?);
            return match &result {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(LuaString::from(n.to_string())),
                _ => Err(self.raise(None, "'__tostring' must return a string")),
            };
        }

        if let (Some(mt), Some(ptr)) = (v.metatable(), v.object_ptr()) {
            if let Value::String(name) = mt.borrow().get_str(metamethod::NAME) {
                return Ok(LuaString::from(format!("{}: {:p}", name, ptr)));
            }
        }

        Ok(match v {
            Value::String(s) => s.clone(),
            other => LuaString::from(other.to_string()),
        })
    }

    /// Run `__close(value, err)` for a to-be-closed value. `nil` and `false`
    /// need no closing.
    pub(crate) fn close_value(&mut self, value: Value, err: Value, line: Option<usize>) -> Result<()> {
        if !value.is_truthy() {
            return Ok(());
        }
        let handler = get_metamethod(&value, metamethod::CLOSE);
        self.call_value(handler, vec![value, err], line, &|_: usize| " (metamethod 'close')".to_string())?;
        Ok(())
    }
}
