#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use ay::{Interpreter, LuaError};

/// In-memory `print` sink that the test keeps a handle to.
#[derive(Clone, Default)]
pub struct SharedOutput(Rc<RefCell<Vec<u8>>>);

impl SharedOutput {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn interpreter() -> (Interpreter, SharedOutput) {
    let output = SharedOutput::default();
    let interpreter = Interpreter::new().with_output(Box::new(output.clone()));
    (interpreter, output)
}

/// Run `source` and return everything it printed.
pub fn run(source: &str) -> String {
    let (mut interpreter, output) = interpreter();
    if let Err(e) = interpreter.exec(source) {
        panic!("script failed: {}\n--- source ---\n{}", e, source);
    }
    output.contents()
}

/// Run `source`, which must fail, and return the error.
pub fn run_err(source: &str) -> LuaError {
    let (mut interpreter, _) = interpreter();
    match interpreter.exec(source) {
        Ok(values) => panic!("expected an error, got {:?}\n--- source ---\n{}", values, source),
        Err(e) => e,
    }
}

/// Message of the runtime error raised by `source`.
pub fn error_message(source: &str) -> String {
    match run_err(source) {
        LuaError::Runtime(e) => e.to_string(),
        other => panic!("expected a runtime error, got {:?}", other),
    }
}
