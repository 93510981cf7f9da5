//! Numeral grammar and number display.
//!
//! [`parse_numeral`] is shared by the scanner and by string→number
//! coercion, so `0x10`, `"0x10" + 0` and `tonumber("0x10")` agree.
//! [`format_float`] reproduces C's `%.14g` followed by Lua's rule of
//! appending `.0` to floats that would otherwise look like integers.

use crate::value::Number;

/// Hex digits that contribute to a hex float mantissa; the rest only
/// scale the exponent (integer part) or are dropped (fraction).
const MAX_HEX_SIGNIFICANT: u32 = 30;

pub fn is_lua_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0b' | b'\x0c')
}

/// Convert a string the way `tonumber` and arithmetic coercion do:
/// surrounding whitespace and one leading sign are allowed.
pub fn str_to_number(text: &[u8]) -> Option<Number> {
    let start = text.iter().position(|&b| !is_lua_space(b))?;
    let end = text.iter().rposition(|&b| !is_lua_space(b))? + 1;
    let body = &text[start..end];

    let (negative, body) = match body.first() {
        Some(b'-') => (true, &body[1..]),
        Some(b'+') => (false, &body[1..]),
        _ => (false, body),
    };

    parse_unsigned(body, negative)
}

/// Convert an unsigned numeral as written in source code.
pub fn parse_numeral(text: &str) -> Option<Number> {
    parse_unsigned(text.as_bytes(), false)
}

fn parse_unsigned(body: &[u8], negative: bool) -> Option<Number> {
    let number = match body {
        [b'0', b'x' | b'X', rest @ ..] => parse_hex(rest)?,
        _ => parse_decimal(body, negative)?,
    };

    Some(match (number, negative) {
        (Number::Integer(i), true) => Number::Integer(i.wrapping_neg()),
        (Number::Float(f), true) => Number::Float(-f),
        (n, false) => n,
    })
}

fn parse_decimal(body: &[u8], negative: bool) -> Option<Number> {
    let mut i = 0;
    let int_digits = count_while(&body[i..], |b| b.is_ascii_digit());
    i += int_digits;

    let mut frac_digits = 0;
    let mut is_float = false;
    if body.get(i) == Some(&b'.') {
        is_float = true;
        i += 1;
        frac_digits = count_while(&body[i..], |b| b.is_ascii_digit());
        i += frac_digits;
    }
    if int_digits + frac_digits == 0 {
        return None;
    }

    if matches!(body.get(i), Some(b'e' | b'E')) {
        is_float = true;
        i += 1;
        if matches!(body.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        let exp_digits = count_while(&body[i..], |b| b.is_ascii_digit());
        if exp_digits == 0 {
            return None;
        }
        i += exp_digits;
    }
    if i != body.len() {
        return None;
    }

    // Validated ASCII at this point.
    let text = std::str::from_utf8(body).ok()?;

    if !is_float {
        // `-9223372036854775808` is the one magnitude that only fits negated.
        let limit = if negative { 1u64 << 63 } else { i64::MAX as u64 };
        match text.parse::<u64>() {
            Ok(u) if u <= limit => return Some(Number::Integer(u as i64)),
            _ => {}
        }
    }

    text.parse::<f64>().ok().map(Number::Float)
}

fn parse_hex(body: &[u8]) -> Option<Number> {
    let mut i = 0;
    let mut any_digit = false;
    let mut is_float = false;

    let mut int_value: u64 = 0;
    let mut mantissa: f64 = 0.0;
    let mut exponent: i64 = 0;
    let mut significant: u32 = 0;

    while let Some(d) = body.get(i).and_then(|b| hex_value(*b)) {
        int_value = int_value.wrapping_mul(16).wrapping_add(d as u64);
        if significant == 0 && d == 0 {
            // leading zero, no contribution
        } else if significant < MAX_HEX_SIGNIFICANT {
            significant += 1;
            mantissa = mantissa * 16.0 + d as f64;
        } else {
            exponent += 4;
        }
        any_digit = true;
        i += 1;
    }

    if body.get(i) == Some(&b'.') {
        is_float = true;
        i += 1;
        while let Some(d) = body.get(i).and_then(|b| hex_value(*b)) {
            if significant == 0 && d == 0 {
                exponent -= 4;
            } else if significant < MAX_HEX_SIGNIFICANT {
                significant += 1;
                mantissa = mantissa * 16.0 + d as f64;
                exponent -= 4;
            }
            any_digit = true;
            i += 1;
        }
    }
    if !any_digit {
        return None;
    }

    if matches!(body.get(i), Some(b'p' | b'P')) {
        is_float = true;
        i += 1;
        let mut exp_negative = false;
        match body.get(i) {
            Some(b'-') => {
                exp_negative = true;
                i += 1;
            }
            Some(b'+') => i += 1,
            _ => {}
        }
        let digits = count_while(&body[i..], |b| b.is_ascii_digit());
        if digits == 0 {
            return None;
        }
        let mut e: i64 = 0;
        for b in &body[i..i + digits] {
            e = e.saturating_mul(10).saturating_add((b - b'0') as i64);
        }
        i += digits;
        exponent = exponent.saturating_add(if exp_negative { -e } else { e });
    }
    if i != body.len() {
        return None;
    }

    if is_float {
        Some(Number::Float(ldexp(mantissa, exponent)))
    } else {
        Some(Number::Integer(int_value as i64))
    }
}

fn hex_value(b: u8) -> Option<u32> {
    (b as char).to_digit(16)
}

fn count_while(bytes: &[u8], pred: impl Fn(u8) -> bool) -> usize {
    bytes.iter().take_while(|&&b| pred(b)).count()
}

/// `x * 2^exp` without intermediate overflow of the power.
fn ldexp(mut x: f64, mut exp: i64) -> f64 {
    if x == 0.0 {
        return x;
    }
    while exp > 1000 {
        x *= 2f64.powi(1000);
        exp -= 1000;
        if x.is_infinite() {
            return x;
        }
    }
    while exp < -1000 {
        x *= 2f64.powi(-1000);
        exp += 1000;
        if x == 0.0 {
            return x;
        }
    }
    x * 2f64.powi(exp as i32)
}

/// `%.14g`, plus `.0` when the result reads as an integer.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return if f.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if f.is_infinite() {
        return if f < 0.0 { "-inf" } else { "inf" }.to_string();
    }

    let mut out = format_g14(f);
    if out.bytes().all(|b| b == b'-' || b.is_ascii_digit()) {
        out.push_str(".0");
    }
    out
}

fn format_g14(f: f64) -> String {
    const PRECISION: i32 = 14;

    if f == 0.0 {
        return if f.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // Scientific form with PRECISION significant digits gives the exponent
    // after rounding, which decides between the two layouts.
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, f);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if exp < -4 || exp >= PRECISION {
        let mantissa = trim_fraction(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exp.abs())
    } else {
        let decimals = (PRECISION - 1 - exp).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, f)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(s: &str) -> i64 {
        match parse_numeral(s) {
            Some(Number::Integer(i)) => i,
            other => panic!("{} parsed as {:?}", s, other),
        }
    }

    fn float(s: &str) -> f64 {
        match parse_numeral(s) {
            Some(Number::Float(f)) => f,
            other => panic!("{} parsed as {:?}", s, other),
        }
    }

    #[test]
    fn decimal_numerals() {
        assert_eq!(int("42"), 42);
        assert_eq!(float("3."), 3.0);
        assert_eq!(float(".5"), 0.5);
        assert_eq!(float("1e3"), 1000.0);
        assert_eq!(float("2E-1"), 0.2);
        assert_eq!(int("9223372036854775807"), i64::MAX);
        assert_eq!(float("9223372036854775808"), 9223372036854775808.0);
    }

    #[test]
    fn hex_integers_wrap() {
        assert_eq!(int("0xff"), 255);
        assert_eq!(int("0xffffffffffffffff"), -1);
        assert_eq!(int("0x10000000000000000"), 0);
    }

    #[test]
    fn hex_floats() {
        assert_eq!(float("0x1p4"), 16.0);
        assert_eq!(float("0x.8"), 0.5);
        assert_eq!(float("0xA.8p0"), 10.5);
        assert_eq!(float("0x1P-2"), 0.25);
        // Beyond 30 significant digits the fraction is silently dropped.
        assert_eq!(float("0x1.000000000000000000000000000001"), 1.0);
    }

    #[test]
    fn malformed_numerals() {
        for text in ["", ".", "e1", "1e", "0x", "0xp1", "1..2", "inf", "nan", "1a", "0x1p"] {
            assert!(parse_numeral(text).is_none(), "{:?} should not parse", text);
        }
    }

    #[test]
    fn string_coercion_allows_spaces_and_sign() {
        assert_eq!(str_to_number(b"  10  "), Some(Number::Integer(10)));
        assert_eq!(str_to_number(b"-0x10"), Some(Number::Integer(-16)));
        assert_eq!(str_to_number(b"\t-2.5\n"), Some(Number::Float(-2.5)));
        assert_eq!(
            str_to_number(b"-9223372036854775808"),
            Some(Number::Integer(i64::MIN))
        );
        assert!(str_to_number(b"- 1").is_none());
        assert!(str_to_number(b"   ").is_none());
    }

    #[test]
    fn float_display_matches_percent_g() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(-0.0), "-0.0");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(1.0 / 3.0), "0.33333333333333");
        assert_eq!(format_float(1e15), "1e+15");
        assert_eq!(format_float(1234567890123456.0), "1.2345678901235e+15");
        assert_eq!(format_float(1e-5), "1e-05");
        assert_eq!(format_float(2.5e-4), "0.00025");
        assert_eq!(format_float(100.0), "100.0");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NEG_INFINITY), "-inf");
        assert_eq!(format_float(2f64.powi(63)), "9.2233720368548e+18");
    }
}
