//! Centralised error hierarchy for the **ay interpreter**.
//!
//! All subsystems (scanner, parser, resolver, evaluator, native library, CLI)
//! convert their failure modes into one of the variants defined here. Static
//! failures carry a line number; runtime failures carry an arbitrary Lua
//! [`Value`] so that `error({code = 1})` survives a round trip through
//! `pcall` untouched.
//!
//! Control flow (`break`, `return`, `goto`) is **not** expressed here; it
//! travels as [`crate::interpreter::Signal`] values.
//!
//! The module **does not** print diagnostics itself.

use std::fmt;
use std::io;

use log::info;
use thiserror::Error;

use crate::arith::ArithError;
use crate::table::TableError;
use crate::value::{LuaString, Value};

/// Canonical error type used throughout the interpreter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LuaError {
    /// Lexical (scanner) error with source line information.
    #[error("[line {line}] Error: {message}")]
    Lex {
        /// Human‑readable description.
        message: String,

        /// 1‑based line where the error occurred.
        line: usize,
    },

    /// Syntactic (parser) error.
    #[error("[line {line}] Error: {message}")]
    Parse { message: String, line: usize },

    /// Static check failure (`break` outside a loop, missing label, ...).
    #[error("[line {line}] Error: {message}")]
    Resolve { message: String, line: usize },

    /// Recoverable runtime error; the only variant `pcall` catches.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Runaway recursion. Reported, never caught by `pcall`.
    #[error("stack overflow (more than {depth} nested calls)")]
    StackOverflow { depth: usize },

    /// Wrapper around `std::io::Error` (transparent).  Enables `?` on I/O ops.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl LuaError {
    /// Helper constructor for the **scanner**.
    pub fn lex<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Lex error: line={}, msg={}", line, message);

        LuaError::Lex { message, line }
    }

    /// Helper constructor for the **parser**.
    pub fn parse<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Parse error: line={}, msg={}", line, message);

        LuaError::Parse { message, line }
    }

    /// Helper constructor for the **resolver**.
    pub fn resolve<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Resolve error: line={}, msg={}", line, message);

        LuaError::Resolve { message, line }
    }

    /// Runtime error with a string payload and the default level of 1.
    pub fn runtime<S: Into<String>>(msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Runtime error: msg={}", message);

        LuaError::Runtime(RuntimeError::new(Value::from(message.as_str())))
    }

    /// True for the errors a protected call converts into `(false, value)`.
    pub fn is_catchable(&self) -> bool {
        matches!(self, LuaError::Runtime(_))
    }

    /// The error as a Lua value, as seen by `pcall`, `xpcall` and `__close`.
    pub fn to_value(&self) -> Value {
        match self {
            LuaError::Runtime(e) => e.value.clone(),
            other => Value::from(other.to_string().as_str()),
        }
    }
}

impl From<TableError> for LuaError {
    fn from(e: TableError) -> Self {
        LuaError::runtime(e.to_string())
    }
}

impl From<ArithError> for LuaError {
    fn from(e: ArithError) -> Self {
        LuaError::runtime(e.to_string())
    }
}

/// A raised Lua error: an arbitrary value plus bookkeeping for positions and
/// the traceback.
#[derive(Debug, Clone)]
pub struct RuntimeError {
    /// The error object (commonly a string).
    pub value: Value,

    /// Pending position annotation: 1 = where the raising native was called,
    /// 2 = where the function that called it was called, ... 0 = none.
    pub level: usize,

    /// One entry per unwound call frame, innermost first.
    pub traceback: Vec<String>,
}

impl RuntimeError {
    pub fn new(value: Value) -> Self {
        Self::with_level(value, 1)
    }

    pub fn with_level(value: Value, level: usize) -> Self {
        Self {
            value,
            level,
            traceback: Vec::new(),
        }
    }

    /// An error whose message already carries its position.
    pub fn positioned(message: String) -> Self {
        Self::with_level(Value::from(message.as_str()), 0)
    }

    /// Prefix `chunk:line: ` to a string payload and clear the pending level.
    pub fn annotate(&mut self, chunk: &str, line: usize) {
        if let Value::String(s) = &self.value {
            let mut text = format!("{}:{}: ", chunk, line).into_bytes();
            text.extend_from_slice(s.as_bytes());
            self.value = Value::String(LuaString::from(text));
        }
        self.level = 0;
    }

    /// Multi-line report used by the CLI for uncaught errors.
    pub fn report(&self) -> String {
        let mut out = self.to_string();
        if !self.traceback.is_empty() {
            out.push_str("\nstack traceback:");
            for entry in &self.traceback {
                out.push_str("\n\t");
                out.push_str(entry);
            }
        }
        out
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Value::String(s) => write!(f, "{}", s),
            Value::Number(n) => write!(f, "{}", n),
            other => write!(f, "(error object is a {} value)", other.type_name()),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Crate‑wide `Result` alias.
pub type Result<T> = std::result::Result<T, LuaError>;
