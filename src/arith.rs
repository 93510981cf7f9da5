//! Arithmetic, comparison and coercion with Lua 5.4 semantics.
//!
//! Everything here is pure: operands are [`Number`]s or plain [`Value`]s and
//! failures come back as [`ArithError`]. Metamethod fallback and error
//! positions belong to the interpreter.

use serde::Serialize;
use thiserror::Error;

use crate::numeral::str_to_number;
use crate::value::{LuaString, Number, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    IDiv,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
    Unm,
    BNot,
}

impl ArithOp {
    /// Metamethod consulted when the raw operation does not apply.
    pub fn event(self) -> &'static str {
        match self {
            ArithOp::Add => "__add",
            ArithOp::Sub => "__sub",
            ArithOp::Mul => "__mul",
            ArithOp::Div => "__div",
            ArithOp::Mod => "__mod",
            ArithOp::Pow => "__pow",
            ArithOp::IDiv => "__idiv",
            ArithOp::BAnd => "__band",
            ArithOp::BOr => "__bor",
            ArithOp::BXor => "__bxor",
            ArithOp::Shl => "__shl",
            ArithOp::Shr => "__shr",
            ArithOp::Unm => "__unm",
            ArithOp::BNot => "__bnot",
        }
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            ArithOp::BAnd | ArithOp::BOr | ArithOp::BXor | ArithOp::Shl | ArithOp::Shr | ArithOp::BNot
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArithError {
    #[error("attempt to perform 'n//0'")]
    IntegerDivideByZero,

    #[error("attempt to perform 'n%0'")]
    IntegerModuloByZero,

    #[error("number has no integer representation")]
    NoIntegerRepresentation,
}

/// Apply `op` to two numbers. Unary operators ignore `b`.
pub fn arith(op: ArithOp, a: Number, b: Number) -> Result<Number, ArithError> {
    use Number::{Float, Integer};

    if op.is_bitwise() {
        let x = number_to_integer(a).ok_or(ArithError::NoIntegerRepresentation)?;
        let y = number_to_integer(b).ok_or(ArithError::NoIntegerRepresentation)?;
        return Ok(Integer(match op {
            ArithOp::BAnd => x & y,
            ArithOp::BOr => x | y,
            ArithOp::BXor => x ^ y,
            ArithOp::Shl => lua_shl(x, y),
            ArithOp::Shr => lua_shl(x, y.wrapping_neg()),
            _ => !x,
        }));
    }

    Ok(match (op, a, b) {
        (ArithOp::Add, Integer(x), Integer(y)) => Integer(x.wrapping_add(y)),
        (ArithOp::Sub, Integer(x), Integer(y)) => Integer(x.wrapping_sub(y)),
        (ArithOp::Mul, Integer(x), Integer(y)) => Integer(x.wrapping_mul(y)),
        (ArithOp::IDiv, Integer(x), Integer(y)) => {
            if y == 0 {
                return Err(ArithError::IntegerDivideByZero);
            }
            Integer(lua_idiv(x, y))
        }
        (ArithOp::Mod, Integer(x), Integer(y)) => {
            if y == 0 {
                return Err(ArithError::IntegerModuloByZero);
            }
            Integer(lua_imod(x, y))
        }
        (ArithOp::Unm, Integer(x), _) => Integer(x.wrapping_neg()),
        (ArithOp::Unm, Float(x), _) => Float(-x),
        (op, a, b) => {
            let (x, y) = (a.to_float(), b.to_float());
            Float(match op {
                ArithOp::Add => x + y,
                ArithOp::Sub => x - y,
                ArithOp::Mul => x * y,
                ArithOp::Div => x / y,
                ArithOp::Pow => x.powf(y),
                ArithOp::IDiv => (x / y).floor(),
                _ => lua_fmod(x, y),
            })
        }
    })
}

/// Floor division; `i64::MIN // -1` wraps.
fn lua_idiv(a: i64, b: i64) -> i64 {
    let d = a.wrapping_div(b);
    let r = a.wrapping_rem(b);
    if r != 0 && (r ^ b) < 0 {
        d - 1
    } else {
        d
    }
}

/// Floor modulo: the result takes the sign of the divisor.
fn lua_imod(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && (r ^ b) < 0 {
        r.wrapping_add(b)
    } else {
        r
    }
}

fn lua_fmod(a: f64, b: f64) -> f64 {
    let m = a % b;
    let adjust = if m > 0.0 { b < 0.0 } else { m < 0.0 && b != m };
    if adjust {
        m + b
    } else {
        m
    }
}

/// Logical shift left; negative amounts shift right, `|n| >= 64` clears.
fn lua_shl(a: i64, n: i64) -> i64 {
    if n <= -64 || n >= 64 {
        0
    } else if n >= 0 {
        ((a as u64) << n) as i64
    } else {
        ((a as u64) >> -n) as i64
    }
}

// ─── Conversions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rounding {
    Exact,
    Floor,
    Ceil,
}

fn f2i(f: f64, mode: Rounding) -> Option<i64> {
    let g = match mode {
        Rounding::Exact => f,
        Rounding::Floor => f.floor(),
        Rounding::Ceil => f.ceil(),
    };
    if g != g.floor() {
        return None;
    }
    // 2^63 is exact as a double; NaN fails both comparisons.
    if g >= -9_223_372_036_854_775_808.0 && g < 9_223_372_036_854_775_808.0 {
        Some(g as i64)
    } else {
        None
    }
}

/// Exact float→integer conversion; fails on fractions, NaN and out-of-range.
pub fn float_to_integer(f: f64) -> Option<i64> {
    f2i(f, Rounding::Exact)
}

pub fn number_to_integer(n: Number) -> Option<i64> {
    match n {
        Number::Integer(i) => Some(i),
        Number::Float(f) => float_to_integer(f),
    }
}

/// Numbers as-is, numeric strings converted, everything else `None`.
pub fn to_number(value: &Value) -> Option<Number> {
    match value {
        Value::Number(n) => Some(*n),
        Value::String(s) => str_to_number(s.as_bytes()),
        _ => None,
    }
}

/// Integer view of a number or numeric string with an exact integer value.
pub fn to_integer(value: &Value) -> Option<i64> {
    to_number(value).and_then(number_to_integer)
}

/// String view used by `..`: strings as-is, numbers formatted.
pub fn to_concat_string(value: &Value) -> Option<LuaString> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(LuaString::from(n.to_string())),
        _ => None,
    }
}

// ─── Comparison ─────────────────────────────────────────────────────────────

pub fn num_eq(a: Number, b: Number) -> bool {
    match (a, b) {
        (Number::Integer(x), Number::Integer(y)) => x == y,
        (Number::Float(x), Number::Float(y)) => x == y,
        (Number::Integer(i), Number::Float(f)) | (Number::Float(f), Number::Integer(i)) => {
            float_to_integer(f) == Some(i)
        }
    }
}

/// `a < b` without rounding the integer operand through a double.
pub fn num_lt(a: Number, b: Number) -> bool {
    match (a, b) {
        (Number::Integer(x), Number::Integer(y)) => x < y,
        (Number::Float(x), Number::Float(y)) => x < y,
        // i < f  <=>  i < ceil(f)
        (Number::Integer(i), Number::Float(f)) => match f2i(f, Rounding::Ceil) {
            Some(c) => i < c,
            None => f > 0.0,
        },
        // f < i  <=>  floor(f) < i
        (Number::Float(f), Number::Integer(i)) => match f2i(f, Rounding::Floor) {
            Some(fl) => fl < i,
            None => f < 0.0,
        },
    }
}

pub fn num_le(a: Number, b: Number) -> bool {
    match (a, b) {
        (Number::Integer(x), Number::Integer(y)) => x <= y,
        (Number::Float(x), Number::Float(y)) => x <= y,
        // i <= f  <=>  i <= floor(f)
        (Number::Integer(i), Number::Float(f)) => match f2i(f, Rounding::Floor) {
            Some(fl) => i <= fl,
            None => f > 0.0,
        },
        // f <= i  <=>  ceil(f) <= i
        (Number::Float(f), Number::Integer(i)) => match f2i(f, Rounding::Ceil) {
            Some(c) => c <= i,
            None => f < 0.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Number::{Float, Integer};

    fn int(op: ArithOp, a: i64, b: i64) -> i64 {
        match arith(op, Integer(a), Integer(b)) {
            Ok(Integer(i)) => i,
            other => panic!("{:?} gave {:?}", op, other),
        }
    }

    #[test]
    fn integer_ops_wrap_around() {
        assert_eq!(int(ArithOp::Add, i64::MAX, 1), i64::MIN);
        assert_eq!(int(ArithOp::Sub, i64::MIN, 1), i64::MAX);
        assert_eq!(int(ArithOp::Mul, i64::MAX, 2), -2);
        assert_eq!(int(ArithOp::Unm, i64::MIN, 0), i64::MIN);

        let samples = [0, 1, -1, 7, i64::MAX, i64::MIN, 0x1234_5678_9abc_def0];
        for &a in &samples {
            for &b in &samples {
                assert_eq!(int(ArithOp::Add, a, b), (a as i128 + b as i128) as i64);
                assert_eq!(int(ArithOp::Sub, a, b), (a as i128 - b as i128) as i64);
                assert_eq!(int(ArithOp::Mul, a, b), (a as i128 * b as i128) as i64);
            }
        }
    }

    #[test]
    fn division_always_yields_float() {
        assert!(matches!(arith(ArithOp::Div, Integer(6), Integer(3)), Ok(Float(f)) if f == 2.0));
        assert!(matches!(arith(ArithOp::Pow, Integer(2), Integer(10)), Ok(Float(f)) if f == 1024.0));
        assert!(matches!(arith(ArithOp::Pow, Integer(4), Float(0.5)), Ok(Float(f)) if f == 2.0));
    }

    #[test]
    fn floor_division_and_modulo() {
        assert_eq!(int(ArithOp::IDiv, 7, 2), 3);
        assert_eq!(int(ArithOp::IDiv, -7, 2), -4);
        assert_eq!(int(ArithOp::IDiv, i64::MIN, -1), i64::MIN);
        assert_eq!(int(ArithOp::Mod, -7, 3), 2);
        assert_eq!(int(ArithOp::Mod, 7, -3), -2);
        assert_eq!(int(ArithOp::Mod, i64::MIN, -1), 0);

        assert!(matches!(arith(ArithOp::Mod, Float(-7.0), Float(3.0)), Ok(Float(f)) if f == 2.0));
        assert!(matches!(arith(ArithOp::Mod, Float(5.5), Integer(-2)), Ok(Float(f)) if f == -0.5));
        assert!(matches!(arith(ArithOp::IDiv, Float(7.0), Integer(2)), Ok(Float(f)) if f == 3.0));
        assert!(matches!(arith(ArithOp::IDiv, Integer(1), Float(0.0)), Ok(Float(f)) if f == f64::INFINITY));
    }

    #[test]
    fn integer_division_by_zero_fails() {
        assert_eq!(
            arith(ArithOp::IDiv, Integer(1), Integer(0)),
            Err(ArithError::IntegerDivideByZero)
        );
        assert_eq!(
            arith(ArithOp::Mod, Integer(1), Integer(0)),
            Err(ArithError::IntegerModuloByZero)
        );
        assert_eq!(ArithError::IntegerModuloByZero.to_string(), "attempt to perform 'n%0'");
    }

    #[test]
    fn shifts() {
        assert_eq!(int(ArithOp::Shl, 1, 4), 16);
        assert_eq!(int(ArithOp::Shl, 1, 64), 0);
        assert_eq!(int(ArithOp::Shl, 1, -64), 0);
        assert_eq!(int(ArithOp::Shl, 16, -4), 1);
        assert_eq!(int(ArithOp::Shr, -1, 60), 15);
        assert_eq!(int(ArithOp::Shr, 1, -3), 8);
        assert_eq!(int(ArithOp::Shr, 1, i64::MIN), 0);
        assert_eq!(int(ArithOp::BNot, 0, 0), -1);
    }

    #[test]
    fn bitwise_requires_integral_values() {
        assert!(matches!(arith(ArithOp::BOr, Float(3.0), Integer(4)), Ok(Integer(7))));
        assert_eq!(
            arith(ArithOp::BAnd, Float(1.5), Integer(1)),
            Err(ArithError::NoIntegerRepresentation)
        );
        assert_eq!(
            arith(ArithOp::BAnd, Float(2f64.powi(63)), Integer(1)),
            Err(ArithError::NoIntegerRepresentation)
        );
    }

    #[test]
    fn float_to_integer_is_exact() {
        assert_eq!(float_to_integer(3.0), Some(3));
        assert_eq!(float_to_integer(-0.0), Some(0));
        assert_eq!(float_to_integer(3.5), None);
        assert_eq!(float_to_integer(f64::NAN), None);
        assert_eq!(float_to_integer(-9_223_372_036_854_775_808.0), Some(i64::MIN));
        assert_eq!(float_to_integer(9_223_372_036_854_775_808.0), None);
    }

    #[test]
    fn mixed_comparisons_are_exact() {
        // 2^53 + 1 is not representable as a double.
        let big = (1i64 << 53) + 1;
        let f = (1u64 << 53) as f64;
        assert!(num_lt(Float(f), Integer(big)));
        assert!(!num_le(Integer(big), Float(f)));
        assert!(!num_eq(Integer(big), Float(f)));

        assert!(num_lt(Integer(i64::MAX), Float(9_223_372_036_854_775_808.0)));
        assert!(num_le(Integer(1), Float(1.0)));
        assert!(num_lt(Integer(1), Float(1.5)));
        assert!(num_lt(Float(-1.5), Integer(-1)));
        assert!(!num_lt(Integer(0), Float(f64::NAN)));
        assert!(!num_le(Float(f64::NAN), Integer(0)));
        assert!(!num_lt(Integer(i64::MIN), Float(f64::NEG_INFINITY)));
    }

    #[test]
    fn string_coercion() {
        assert!(matches!(to_number(&Value::from("0x10")), Some(Integer(16))));
        assert!(matches!(to_number(&Value::from(" 2.5 ")), Some(Float(f)) if f == 2.5));
        assert_eq!(to_number(&Value::from("abc")), None);
        assert_eq!(to_integer(&Value::from("3.0")), Some(3));
        assert_eq!(to_integer(&Value::from(true)), None);
        assert_eq!(
            to_concat_string(&Value::float(1.0)).map(|s| s.to_string()),
            Some("1.0".to_string())
        );
    }
}
