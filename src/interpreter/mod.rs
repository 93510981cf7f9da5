//! Tree-walking evaluator.
//!
//! The [`Interpreter`] owns the global table and the call machinery. Work is
//! split across submodules:
//!
//! * `statements`: block execution, control signals, loops, goto and
//!   to-be-closed variables.
//! * `expressions`: expression evaluation and multi-result lists.
//! * `dispatch`: metamethod-aware indexing, arithmetic, comparison,
//!   concatenation, length, calls and display.
//!
//! Runtime errors travel as [`LuaError::Runtime`]; `break`, `return` and
//! `goto` travel as [`Signal`] values and never cross a function boundary.

mod dispatch;
mod expressions;
mod statements;

use std::io::{self, Write};
use std::rc::Rc;

use log::{debug, info};

use crate::ast::{Block, Chunk, FuncBody, ReturnStatement};
use crate::config::InterpreterConfig;
use crate::environment::{Scope, Variable};
use crate::error::{LuaError, Result, RuntimeError};
use crate::library;
use crate::multires;
use crate::parser::{self, Parser};
use crate::resolver;
use crate::scanner::Scanner;
use crate::stack::ensure_sufficient_stack;
use crate::value::{Function, FunctionRef, LuaFunction, LuaString, TableRef, Value};

pub(crate) use dispatch::no_info;

/// Outcome of executing a statement or block.
#[derive(Debug, Clone)]
pub enum Signal {
    Normal,
    Break,
    Return(Vec<Value>),
    Goto(LuaString),
}

pub struct Interpreter {
    globals: TableRef,
    root: Scope,
    config: InterpreterConfig,
    call_depth: usize,

    /// Chunk of the running Lua function, used in error positions.
    current_chunk: Rc<str>,

    output: Box<dyn Write>,
    pub(crate) warnings_on: bool,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Interpreter with the default configuration and the basic library.
    pub fn new() -> Self {
        Self::with_config(InterpreterConfig::default())
    }

    pub fn with_config(config: InterpreterConfig) -> Self {
        info!("Initializing Interpreter (chunk '{}')", config.chunk_name);

        let globals = TableRef::new();
        let root = Scope::new_root(globals.clone());
        let current_chunk = Rc::from(config.chunk_name.as_str());

        let mut interpreter = Self {
            globals,
            root,
            config,
            call_depth: 0,
            current_chunk,
            output: Box::new(io::stdout()),
            warnings_on: false,
        };
        library::open_base(&mut interpreter);
        interpreter
    }

    /// Send `print` output to `output` instead of stdout.
    pub fn with_output(mut self, output: Box<dyn Write>) -> Self {
        self.output = output;
        self
    }

    pub fn globals(&self) -> &TableRef {
        &self.globals
    }

    /// Scope whose lookups fall through to the global table.
    pub fn root_scope(&self) -> &Scope {
        &self.root
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub(crate) fn output(&mut self) -> &mut dyn Write {
        self.output.as_mut()
    }

    /// Bind a native function as a global.
    pub fn register<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&mut Interpreter, Vec<Value>) -> Result<Vec<Value>> + 'static,
    {
        debug!("Registering native function '{}'", name);
        self.globals
            .borrow_mut()
            .set_str(name, Value::Function(FunctionRef::native(name, func)));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entry points
    // ─────────────────────────────────────────────────────────────────────────

    /// Parse and check `source`, returning the main function of the chunk.
    /// The function closes over the global scope.
    pub fn load<S: AsRef<[u8]> + ?Sized>(&self, source: &S, chunk_name: &str) -> Result<FunctionRef> {
        self.load_in(source, chunk_name, self.root.clone())
    }

    /// [`load`](Self::load) with free names resolved through `scope`.
    pub fn load_in<S: AsRef<[u8]> + ?Sized>(
        &self,
        source: &S,
        chunk_name: &str,
        scope: Scope,
    ) -> Result<FunctionRef> {
        debug!("Loading chunk '{}'", chunk_name);
        let chunk = parser::parse_chunk(source, chunk_name)?;
        resolver::resolve(&chunk)?;
        Ok(FunctionRef::lua(Rc::new(main_body(chunk)), scope))
    }

    /// Run `source` as a chunk whose free names resolve through `scope`.
    pub fn execute<S: AsRef<[u8]> + ?Sized>(&mut self, source: &S, scope: &Scope) -> Result<Vec<Value>> {
        info!("Executing chunk '{}'", self.config.chunk_name);

        let chunk = parser::parse_chunk(source, &self.config.chunk_name)?;
        resolver::resolve(&chunk)?;
        let main = FunctionRef::lua(Rc::new(main_body(chunk)), scope.clone());
        self.call_function(&main, Vec::new())
    }

    /// Evaluate `source` as an expression list, returning every value.
    pub fn evaluate_expression<S: AsRef<[u8]> + ?Sized>(&mut self, source: &S, scope: &Scope) -> Result<Vec<Value>> {
        info!("Evaluating expression in chunk '{}'", self.config.chunk_name);

        let tokens = Scanner::from_bytes(source.as_ref()).collect::<Result<Vec<_>>>()?;
        let values = Parser::new(&tokens, &self.config.chunk_name).parse_expression_list()?;
        let line = values.first().and_then(|e| e.line()).unwrap_or(1);
        let chunk = Chunk {
            name: Rc::from(self.config.chunk_name.as_str()),
            block: Block {
                statements: Vec::new(),
                ret: Some(ReturnStatement { values, line }),
            },
        };
        resolver::resolve(&chunk)?;
        let main = FunctionRef::lua(Rc::new(main_body(chunk)), scope.clone());
        self.call_function(&main, Vec::new())
    }

    /// [`execute`](Self::execute) against the global scope.
    pub fn exec<S: AsRef<[u8]> + ?Sized>(&mut self, source: &S) -> Result<Vec<Value>> {
        let root = self.root.clone();
        self.execute(source, &root)
    }

    /// [`evaluate_expression`](Self::evaluate_expression) against the global scope.
    pub fn eval_source<S: AsRef<[u8]> + ?Sized>(&mut self, source: &S) -> Result<Vec<Value>> {
        let root = self.root.clone();
        self.evaluate_expression(source, &root)
    }

    /// Run `block` in `scope`, closing its to-be-closed variables on exit.
    pub fn evaluate_block(&mut self, block: &Block, scope: &Scope) -> Result<Signal> {
        self.exec_block(block, scope.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Call protocol
    // ─────────────────────────────────────────────────────────────────────────

    /// Call `func` from host code.
    pub fn call_function(&mut self, func: &FunctionRef, args: Vec<Value>) -> Result<Vec<Value>> {
        self.invoke(func, args, None)
    }

    /// Call any value, honouring `__call`. Used by natives such as `pcall`.
    pub fn call(&mut self, callee: &Value, args: Vec<Value>) -> Result<Vec<Value>> {
        self.call_value(callee.clone(), args, None, &no_info)
    }

    /// One activation. `call_line` is the line of the call expression in the
    /// caller, `None` for calls made by host code.
    pub(crate) fn invoke(
        &mut self,
        func: &FunctionRef,
        args: Vec<Value>,
        call_line: Option<usize>,
    ) -> Result<Vec<Value>> {
        if self.call_depth >= self.config.max_call_depth {
            info!("Call depth limit {} reached", self.config.max_call_depth);
            return Err(LuaError::StackOverflow {
                depth: self.config.max_call_depth,
            });
        }

        self.call_depth += 1;
        let caller_chunk = self.current_chunk.clone();

        let result = ensure_sufficient_stack(|| match func.function() {
            Function::Native(native) => {
                debug!("Calling native function '{}'", native.name);
                (native.func)(self, args)
            }
            Function::Lua(lua) => self.call_lua(lua, args),
        });

        self.call_depth -= 1;
        self.current_chunk = caller_chunk;

        result.map_err(|e| self.unwind(e, func, call_line))
    }

    fn call_lua(&mut self, func: &LuaFunction, mut args: Vec<Value>) -> Result<Vec<Value>> {
        let body = &func.body;
        debug!(
            "Calling function '{}' with {} argument(s)",
            body.name.as_deref().unwrap_or("?"),
            args.len()
        );

        let varargs = if body.variadic && args.len() > body.params.len() {
            args.split_off(body.params.len())
        } else {
            Vec::new()
        };
        let args = multires::adjust(args, body.params.len());

        let scope = func.scope.push_function(varargs);
        for (param, value) in body.params.iter().zip(args) {
            scope.put_local(param.clone(), Variable::new(value))?;
        }

        self.current_chunk = body.chunk.clone();
        match self.exec_block(&body.body, scope)? {
            Signal::Return(values) => Ok(values),
            Signal::Normal | Signal::Break => Ok(Vec::new()),
            Signal::Goto(label) => Err(self.raise(
                Some(body.line),
                format!("no visible label '{}' for goto", label),
            )),
        }
    }

    /// Settle the pending position of an error leaving a call and record the
    /// frame in its traceback.
    fn unwind(&self, mut error: LuaError, func: &FunctionRef, call_line: Option<usize>) -> LuaError {
        if let LuaError::Runtime(e) = &mut error {
            match (e.level, call_line) {
                (0, _) => {}
                (1, Some(line)) => e.annotate(&self.current_chunk, line),
                (1, None) => e.level = 0,
                _ => e.level -= 1,
            }
            let place = match call_line {
                Some(line) => format!("{}:{}: ", self.current_chunk, line),
                None => String::new(),
            };
            e.traceback.push(format!("{}in {}", place, frame_label(func)));
        }
        error
    }

    /// Runtime error raised by the interpreter itself. With a line, the
    /// message is positioned in the running chunk; without one it is left
    /// for the enclosing call to annotate.
    pub(crate) fn raise<S: Into<String>>(&self, line: Option<usize>, message: S) -> LuaError {
        match line {
            Some(line) => {
                let text = format!("{}:{}: {}", self.current_chunk, line, message.into());
                debug!("Raising runtime error: {}", text);
                LuaError::Runtime(RuntimeError::positioned(text))
            }
            None => LuaError::runtime(message),
        }
    }
}

/// Wrap a chunk as the body of its vararg main function.
fn main_body(chunk: Chunk) -> FuncBody {
    FuncBody {
        params: Vec::new(),
        variadic: true,
        body: chunk.block,
        line: 0,
        name: None,
        chunk: chunk.name,
    }
}

fn frame_label(func: &FunctionRef) -> String {
    match func.function() {
        Function::Native(native) => format!("function '{}'", native.name),
        Function::Lua(lua) => match &lua.body.name {
            Some(name) => format!("function '{}'", name),
            None if lua.body.line == 0 => "main chunk".to_string(),
            None => format!("function <{}:{}>", lua.body.chunk, lua.body.line),
        },
    }
}
