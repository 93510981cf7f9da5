pub mod arith;
pub mod ast;
pub mod config;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod library;
pub mod metamethod;
pub mod multires;
pub mod numeral;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod stack;
pub mod table;
pub mod token;
pub mod value;

pub use config::InterpreterConfig;
pub use environment::{Scope, Variable};
pub use error::{LuaError, Result, RuntimeError};
pub use interpreter::Interpreter;
pub use value::{LuaString, Number, TableRef, Value};
