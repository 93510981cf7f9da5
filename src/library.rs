//! Basic library: the natives every chunk finds in `_G`.
//!
//! Natives follow one calling convention: they receive the already adjusted
//! argument list and return a result list, or fail with a runtime error at
//! level 1 so the message points at the calling line.

use std::fs;
use std::io::{self, Read, Write};

use log::{debug, info};

use crate::arith;
use crate::error::{LuaError, Result, RuntimeError};
use crate::interpreter::Interpreter;
use crate::metamethod::{self, get_metamethod, protected_field};
use crate::multires;
use crate::numeral::{is_lua_space, str_to_number};
use crate::value::{FunctionRef, LuaString, Number, TableRef, Value};
use crate::Scope;

pub const VERSION: &str = "Lua 5.4";

/// Register the basic library into the interpreter's global table.
pub fn open_base(interp: &mut Interpreter) {
    info!("Opening basic library");

    let globals = interp.globals().clone();
    {
        let mut g = globals.borrow_mut();
        g.set_str("_G", Value::Table(globals.clone()));
        g.set_str("_VERSION", Value::from(VERSION));
    }

    interp.register("assert", lua_assert);
    interp.register("error", lua_error);
    interp.register("getmetatable", lua_getmetatable);
    interp.register("setmetatable", lua_setmetatable);
    interp.register("rawequal", lua_rawequal);
    interp.register("rawget", lua_rawget);
    interp.register("rawset", lua_rawset);
    interp.register("rawlen", lua_rawlen);
    interp.register("select", lua_select);
    interp.register("tonumber", lua_tonumber);
    interp.register("tostring", lua_tostring);
    interp.register("type", lua_type);
    interp.register("print", lua_print);
    interp.register("pcall", lua_pcall);
    interp.register("xpcall", lua_xpcall);
    interp.register("load", lua_load);
    interp.register("dofile", lua_dofile);
    interp.register("collectgarbage", lua_collectgarbage);
    interp.register("warn", lua_warn);

    // `pairs` hands out the very function stored as `next`.
    let next = FunctionRef::native("next", lua_next);
    globals.borrow_mut().set_str("next", Value::Function(next.clone()));
    interp.register("pairs", move |interp, args| lua_pairs(interp, args, &next));

    let ipairs_step = FunctionRef::native("ipairs_step", lua_ipairs_step);
    interp.register("ipairs", move |_, args| {
        check_any(&args, 1, "ipairs")?;
        Ok(vec![
            Value::Function(ipairs_step.clone()),
            multires::nth(&args, 0),
            Value::integer(0),
        ])
    });
}

// ─── Argument checks ────────────────────────────────────────────────────────

fn bad_argument<S: AsRef<str>>(n: usize, func: &str, message: S) -> LuaError {
    LuaError::runtime(format!(
        "bad argument #{} to '{}' ({})",
        n,
        func,
        message.as_ref()
    ))
}

fn type_name_or_none(args: &[Value], n: usize) -> &'static str {
    match args.get(n - 1) {
        Some(v) => v.type_name(),
        None => "no value",
    }
}

fn type_error(args: &[Value], n: usize, func: &str, expected: &str) -> LuaError {
    bad_argument(
        n,
        func,
        format!("{} expected, got {}", expected, type_name_or_none(args, n)),
    )
}

fn check_any(args: &[Value], n: usize, func: &str) -> Result<Value> {
    match args.get(n - 1) {
        Some(v) => Ok(v.clone()),
        None => Err(bad_argument(n, func, "value expected")),
    }
}

fn check_table(args: &[Value], n: usize, func: &str) -> Result<TableRef> {
    match args.get(n - 1) {
        Some(Value::Table(t)) => Ok(t.clone()),
        _ => Err(type_error(args, n, func, "table")),
    }
}

fn check_integer(args: &[Value], n: usize, func: &str) -> Result<i64> {
    let value = multires::nth(args, n - 1);
    match arith::to_number(&value) {
        Some(number) => arith::number_to_integer(number)
            .ok_or_else(|| bad_argument(n, func, "number has no integer representation")),
        None => Err(type_error(args, n, func, "number")),
    }
}

fn opt_integer(args: &[Value], n: usize, func: &str, default: i64) -> Result<i64> {
    match args.get(n - 1) {
        None | Some(Value::Nil) => Ok(default),
        Some(_) => check_integer(args, n, func),
    }
}

fn check_string(args: &[Value], n: usize, func: &str) -> Result<LuaString> {
    match args.get(n - 1) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(num)) => Ok(LuaString::from(num.to_string())),
        _ => Err(type_error(args, n, func, "string")),
    }
}

// ─── Errors ─────────────────────────────────────────────────────────────────

fn lua_assert(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    let condition = check_any(&args, 1, "assert")?;
    if condition.is_truthy() {
        return Ok(args);
    }
    // A caller-supplied message is raised as is, without a position.
    match args.get(1) {
        Some(message) => Err(LuaError::Runtime(RuntimeError::with_level(message.clone(), 0))),
        None => Err(LuaError::runtime("assertion failed!")),
    }
}

/// `error(value [, level])`. Level 1 (default) points at the caller of
/// `error`, 2 at its caller, 0 adds no position.
fn lua_error(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    let value = multires::nth(&args, 0);
    let level = opt_integer(&args, 2, "error", 1)?;
    debug!("error() raised at level {}", level);
    Err(LuaError::Runtime(RuntimeError::with_level(
        value,
        level.max(0) as usize,
    )))
}

fn lua_pcall(interp: &mut Interpreter, mut args: Vec<Value>) -> Result<Vec<Value>> {
    let func = check_any(&args, 1, "pcall")?;
    let rest = args.split_off(1);
    match interp.call(&func, rest) {
        Ok(mut results) => {
            results.insert(0, Value::Boolean(true));
            Ok(results)
        }
        Err(e) if e.is_catchable() => {
            debug!("pcall caught: {}", e);
            Ok(vec![Value::Boolean(false), e.to_value()])
        }
        Err(e) => Err(e),
    }
}

/// Like `pcall`, but the error value is passed through `handler` first.
fn lua_xpcall(interp: &mut Interpreter, mut args: Vec<Value>) -> Result<Vec<Value>> {
    let handler = check_any(&args, 2, "xpcall")?;
    let rest = args.split_off(2);
    let func = multires::nth(&args, 0);

    match interp.call(&func, rest) {
        Ok(mut results) => {
            results.insert(0, Value::Boolean(true));
            Ok(results)
        }
        Err(e) if e.is_catchable() => {
            let handled = match interp.call(&handler, vec![e.to_value()]) {
                Ok(results) => multires::first(results),
                Err(inner) if inner.is_catchable() => inner.to_value(),
                Err(inner) => return Err(inner),
            };
            Ok(vec![Value::Boolean(false), handled])
        }
        Err(e) => Err(e),
    }
}

// ─── Metatables ─────────────────────────────────────────────────────────────

fn lua_getmetatable(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    let value = check_any(&args, 1, "getmetatable")?;
    let result = match value.metatable() {
        Some(mt) => protected_field(&mt).unwrap_or(Value::Table(mt)),
        None => Value::Nil,
    };
    Ok(vec![result])
}

fn lua_setmetatable(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    let table = check_table(&args, 1, "setmetatable")?;
    let metatable = match args.get(1) {
        Some(Value::Table(mt)) => Some(mt.clone()),
        Some(Value::Nil) => None,
        _ => return Err(type_error(&args, 2, "setmetatable", "nil or table")),
    };

    if let Some(current) = table.metatable() {
        if protected_field(&current).is_some() {
            return Err(LuaError::runtime("cannot change a protected metatable"));
        }
    }

    table.borrow_mut().set_metatable(metatable);
    Ok(vec![Value::Table(table)])
}

// ─── Raw access ─────────────────────────────────────────────────────────────

fn lua_rawequal(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    let a = check_any(&args, 1, "rawequal")?;
    let b = check_any(&args, 2, "rawequal")?;
    Ok(vec![Value::Boolean(a.raw_equals(&b))])
}

fn lua_rawget(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    let table = check_table(&args, 1, "rawget")?;
    let key = check_any(&args, 2, "rawget")?;
    let value = table.borrow().get(&key);
    Ok(vec![value])
}

fn lua_rawset(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    let table = check_table(&args, 1, "rawset")?;
    let key = check_any(&args, 2, "rawset")?;
    let value = check_any(&args, 3, "rawset")?;
    table.borrow_mut().put(key, value)?;
    Ok(vec![Value::Table(table)])
}

fn lua_rawlen(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    let len = match args.first() {
        Some(Value::Table(t)) => t.borrow().len(),
        Some(Value::String(s)) => s.len() as i64,
        _ => return Err(bad_argument(1, "rawlen", "table or string expected")),
    };
    Ok(vec![Value::integer(len)])
}

// ─── Iteration ──────────────────────────────────────────────────────────────

fn lua_next(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    let table = check_table(&args, 1, "next")?;
    let key = multires::nth(&args, 1);
    let entry = table.borrow().next(&key)?;
    Ok(match entry {
        Some((k, v)) => vec![k, v],
        None => vec![Value::Nil],
    })
}

/// `pairs(t)`: `__pairs(t)` when present, else `next, t, nil`.
fn lua_pairs(interp: &mut Interpreter, args: Vec<Value>, next: &FunctionRef) -> Result<Vec<Value>> {
    let value = check_any(&args, 1, "pairs")?;

    let handler = get_metamethod(&value, metamethod::PAIRS);
    if !handler.is_nil() {
        let results = interp.call(&handler, vec![value])?;
        return Ok(multires::adjust(results, 3));
    }

    if !matches!(value, Value::Table(_)) {
        return Err(type_error(&args, 1, "pairs", "table"));
    }
    Ok(vec![Value::Function(next.clone()), value, Value::Nil])
}

fn lua_ipairs_step(interp: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    let i = check_integer(&args, 2, "ipairs")?.wrapping_add(1);
    let value = interp.get_index(&multires::nth(&args, 0), &Value::integer(i))?;
    Ok(if value.is_nil() {
        vec![Value::Nil]
    } else {
        vec![Value::integer(i), value]
    })
}

fn lua_select(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    let count = args.len().saturating_sub(1) as i64;

    if let Some(Value::String(s)) = args.first() {
        if s.as_bytes() == b"#" {
            return Ok(vec![Value::integer(count)]);
        }
    }

    let n = check_integer(&args, 1, "select")?;
    let top = count + 1;
    let n = if n < 0 {
        top.saturating_add(n)
    } else if n > top {
        top
    } else {
        n
    };
    if n < 1 {
        return Err(bad_argument(1, "select", "index out of range"));
    }
    Ok(args[n as usize..].to_vec())
}

// ─── Conversions ────────────────────────────────────────────────────────────

fn lua_type(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    let value = check_any(&args, 1, "type")?;
    Ok(vec![Value::from(value.type_name())])
}

fn lua_tostring(interp: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    let value = check_any(&args, 1, "tostring")?;
    Ok(vec![Value::String(interp.tostring(&value)?)])
}

fn lua_tonumber(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    match args.get(1) {
        None | Some(Value::Nil) => {
            let value = check_any(&args, 1, "tonumber")?;
            let result = match &value {
                Value::Number(_) => value.clone(),
                Value::String(s) => str_to_number(s.as_bytes())
                    .map(Value::Number)
                    .unwrap_or_default(),
                _ => Value::Nil,
            };
            Ok(vec![result])
        }
        Some(_) => {
            let base = check_integer(&args, 2, "tonumber")?;
            let text = match args.first() {
                Some(Value::String(s)) => s.clone(),
                _ => return Err(type_error(&args, 1, "tonumber", "string")),
            };
            if !(2..=36).contains(&base) {
                return Err(bad_argument(2, "tonumber", "base out of range"));
            }
            let result = parse_in_base(text.as_bytes(), base as u32)
                .map(Value::integer)
                .unwrap_or_default();
            Ok(vec![result])
        }
    }
}

/// Integer numeral in `base`, surrounded by optional whitespace and
/// preceded by an optional `-`. Overflow wraps around.
fn parse_in_base(text: &[u8], base: u32) -> Option<i64> {
    let start = text.iter().position(|&b| !is_lua_space(b))?;
    let end = text.iter().rposition(|&b| !is_lua_space(b))? + 1;
    let body = &text[start..end];

    let (negative, digits) = match body.first() {
        Some(b'-') => (true, &body[1..]),
        _ => (false, body),
    };
    if digits.is_empty() {
        return None;
    }

    let mut n: i64 = 0;
    for &b in digits {
        let digit = (b as char).to_digit(base)?;
        n = n.wrapping_mul(base as i64).wrapping_add(digit as i64);
    }
    Some(if negative { n.wrapping_neg() } else { n })
}

// ─── Output ─────────────────────────────────────────────────────────────────

fn lua_print(interp: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    let mut line = Vec::new();
    for (i, value) in args.iter().enumerate() {
        if i > 0 {
            line.push(b'\t');
        }
        line.extend_from_slice(interp.tostring(value)?.as_bytes());
    }
    line.push(b'\n');

    let out = interp.output();
    out.write_all(&line)?;
    out.flush()?;
    Ok(Vec::new())
}

/// `warn(msg, ...)`. Messages `@on` and `@off` toggle output, which starts
/// off.
fn lua_warn(interp: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    check_string(&args, 1, "warn")?;
    let mut message = Vec::new();
    for n in 1..=args.len() {
        message.extend_from_slice(check_string(&args, n, "warn")?.as_bytes());
    }

    match message.as_slice() {
        b"@on" => interp.warnings_on = true,
        b"@off" => interp.warnings_on = false,
        [b'@', ..] => {}
        text if interp.warnings_on => {
            let mut stderr = io::stderr();
            writeln!(stderr, "Lua warning: {}", String::from_utf8_lossy(text))?;
        }
        _ => {}
    }
    Ok(Vec::new())
}

// ─── Chunks and memory ──────────────────────────────────────────────────────

/// `load(chunk [, chunkname [, mode [, env]]])`. On a syntax error returns
/// `nil` plus the message instead of raising.
fn lua_load(interp: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    let source: Vec<u8> = match args.first() {
        Some(Value::String(s)) => s.as_bytes().to_vec(),
        Some(Value::Function(_)) => {
            let reader = multires::nth(&args, 0);
            let mut buf = Vec::new();
            loop {
                match multires::first(interp.call(&reader, Vec::new())?) {
                    Value::String(piece) if !piece.is_empty() => buf.extend_from_slice(piece.as_bytes()),
                    Value::Nil | Value::String(_) => break,
                    _ => {
                        return Ok(vec![
                            Value::Nil,
                            Value::from("reader function must return a string"),
                        ])
                    }
                }
            }
            buf
        }
        _ => return Err(type_error(&args, 1, "load", "string")),
    };

    let chunk_name = match args.get(1) {
        Some(Value::String(name)) => chunk_id(&name.to_str_lossy()),
        _ => match args.first() {
            Some(Value::String(s)) => chunk_id(&s.to_str_lossy()),
            _ => chunk_id("=(load)"),
        },
    };

    let scope = match args.get(3) {
        Some(Value::Table(env)) => Scope::new_root(env.clone()),
        _ => interp.root_scope().clone(),
    };

    match interp.load_in(&source, &chunk_name, scope) {
        Ok(func) => Ok(vec![Value::Function(func)]),
        Err(e) => {
            debug!("load failed: {}", e);
            Ok(vec![Value::Nil, Value::from(positioned(&chunk_name, &e))])
        }
    }
}

/// Static errors rendered `chunk:line: message`, the form `load` reports.
fn positioned(chunk_name: &str, error: &LuaError) -> String {
    match error {
        LuaError::Lex { message, line }
        | LuaError::Parse { message, line }
        | LuaError::Resolve { message, line } => format!("{}:{}: {}", chunk_name, line, message),
        other => other.to_string(),
    }
}

fn unpositioned(message: String) -> LuaError {
    LuaError::Runtime(RuntimeError::with_level(Value::from(message), 0))
}

/// Run a file, or stdin without a name, unprotected. Returns whatever the
/// chunk returns.
fn lua_dofile(interp: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    let (mut source, chunk_name) = match args.first() {
        None | Some(Value::Nil) => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .map_err(|e| unpositioned(format!("cannot read stdin: {}", e)))?;
            (buf, "stdin".to_string())
        }
        Some(_) => {
            let name = check_string(&args, 1, "dofile")?.to_str_lossy().into_owned();
            let buf = fs::read(&name)
                .map_err(|e| unpositioned(format!("cannot open {}: {}", name, e)))?;
            (buf, name)
        }
    };
    info!("dofile '{}' ({} bytes)", chunk_name, source.len());

    // A leading `#` line is skipped; its newline stays so line numbers hold.
    if source.first() == Some(&b'#') {
        let end = memchr::memchr(b'\n', &source).unwrap_or(source.len());
        source.drain(..end);
    }

    let func = interp
        .load(&source, &chunk_name)
        .map_err(|e| unpositioned(positioned(&chunk_name, &e)))?;
    interp.call_function(&func, Vec::new())
}

/// Display name of a chunk: `=name` and `@file` verbatim, source text as
/// `[string "first line..."]`.
fn chunk_id(name: &str) -> String {
    if let Some(rest) = name.strip_prefix('=').or_else(|| name.strip_prefix('@')) {
        return rest.to_string();
    }

    const MAX_SOURCE: usize = 40;
    let first_line = name.lines().next().unwrap_or("");
    let shown: String = first_line.chars().take(MAX_SOURCE).collect();
    if shown.len() < name.len() {
        format!("[string \"{}...\"]", shown)
    } else {
        format!("[string \"{}\"]", shown)
    }
}

/// Memory is reference counted, so there is nothing to drive; the options
/// are accepted for compatibility.
fn lua_collectgarbage(_: &mut Interpreter, args: Vec<Value>) -> Result<Vec<Value>> {
    let option = match args.first() {
        None | Some(Value::Nil) => LuaString::from("collect"),
        Some(_) => check_string(&args, 1, "collectgarbage")?,
    };

    let result = match option.as_bytes() {
        b"collect" | b"step" | b"incremental" | b"generational" => Value::integer(0),
        b"count" => Value::Number(Number::Float(0.0)),
        b"isrunning" => Value::Boolean(true),
        b"stop" | b"restart" => Value::integer(0),
        other => {
            return Err(bad_argument(
                1,
                "collectgarbage",
                format!("invalid option '{}'", String::from_utf8_lossy(other)),
            ))
        }
    };
    Ok(vec![result])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integers_in_other_bases() {
        assert_eq!(parse_in_base(b"ff", 16), Some(255));
        assert_eq!(parse_in_base(b"  -101 ", 2), Some(-5));
        assert_eq!(parse_in_base(b"z", 36), Some(35));
        assert_eq!(parse_in_base(b"8", 8), None);
        assert_eq!(parse_in_base(b"", 10), None);
        assert_eq!(parse_in_base(b"-", 10), None);
    }

    #[test]
    fn chunk_ids() {
        assert_eq!(chunk_id("=stdin"), "stdin");
        assert_eq!(chunk_id("@main.lua"), "main.lua");
        assert_eq!(chunk_id("return 1"), "[string \"return 1\"]");
        assert_eq!(chunk_id("x = 1\ny = 2"), "[string \"x = 1...\"]");
    }
}
