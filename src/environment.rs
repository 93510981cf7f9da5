//! Lexical scope chain.
//!
//! A [`Scope`] is a shared handle to one frame of local bindings. Frames link
//! to their parent; lookups that fall off the root end in the global table.
//! Closures keep the frame they were created in alive, so two closures made
//! in the same frame share its bindings.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::trace;

use crate::error::{LuaError, Result};
use crate::value::{LuaString, TableRef, Value};

#[derive(Debug, Clone)]
pub struct Variable {
    pub value: Value,
    pub is_const: bool,
    pub to_be_closed: bool,
}

impl Variable {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            is_const: false,
            to_be_closed: false,
        }
    }

    pub fn constant(value: Value) -> Self {
        Self {
            value,
            is_const: true,
            to_be_closed: false,
        }
    }

    /// `<close>` locals are implicitly constant.
    pub fn to_be_closed(value: Value) -> Self {
        Self {
            value,
            is_const: true,
            to_be_closed: true,
        }
    }
}

struct Frame {
    parent: Option<Scope>,
    globals: TableRef,
    locals: RefCell<HashMap<LuaString, Variable>>,

    /// `Some` for function frames: the call's extra arguments.
    varargs: Option<Rc<[Value]>>,

    /// Set once a closure holds this frame (or a descendant).
    captured: Cell<bool>,
}

#[derive(Clone)]
pub struct Scope(Rc<Frame>);

impl Scope {
    /// Chunk-level frame over `globals`.
    pub fn new_root(globals: TableRef) -> Self {
        Scope(Rc::new(Frame {
            parent: None,
            globals,
            locals: RefCell::new(HashMap::new()),
            varargs: Some(Rc::from(Vec::new())),
            captured: Cell::new(false),
        }))
    }

    fn child(&self, varargs: Option<Rc<[Value]>>) -> Scope {
        Scope(Rc::new(Frame {
            parent: Some(self.clone()),
            globals: self.0.globals.clone(),
            locals: RefCell::new(HashMap::new()),
            varargs,
            captured: Cell::new(false),
        }))
    }

    /// Nested block frame.
    pub fn push(&self) -> Scope {
        self.child(None)
    }

    /// Frame for a function activation; `varargs` is what `...` yields.
    pub fn push_function(&self, varargs: Vec<Value>) -> Scope {
        self.child(Some(Rc::from(varargs)))
    }

    pub fn globals(&self) -> &TableRef {
        &self.0.globals
    }

    fn frames(&self) -> impl Iterator<Item = &Scope> {
        std::iter::successors(Some(self), |s| s.0.parent.as_ref())
    }

    /// True if some frame in the chain binds `name` locally.
    pub fn has(&self, name: &[u8]) -> bool {
        self.frames().any(|s| s.owns(name))
    }

    /// True if this very frame binds `name`.
    pub fn owns(&self, name: &[u8]) -> bool {
        self.0.locals.borrow().contains_key(name)
    }

    /// Innermost local binding of `name`.
    pub fn lookup_local(&self, name: &[u8]) -> Option<Variable> {
        self.frames()
            .find_map(|s| s.0.locals.borrow().get(name).cloned())
    }

    /// `"local"` for a binding of the current function, `"upvalue"` for one
    /// reached across a function frame, `None` for globals.
    pub fn binding_kind(&self, name: &[u8]) -> Option<&'static str> {
        let mut crossed = false;
        for scope in self.frames() {
            if scope.owns(name) {
                return Some(if crossed { "upvalue" } else { "local" });
            }
            if scope.0.varargs.is_some() {
                crossed = true;
            }
        }
        None
    }

    /// Local binding, else raw global, else `nil`.
    pub fn get(&self, name: &[u8]) -> Value {
        match self.lookup_local(name) {
            Some(var) => var.value,
            None => self.0.globals.borrow().get(&Value::from(LuaString::from(name))),
        }
    }

    /// Bind `name` in this frame.
    pub fn put_local(&self, name: LuaString, variable: Variable) -> Result<()> {
        trace!("put_local {}", name);

        let mut locals = self.0.locals.borrow_mut();
        if let Some(existing) = locals.get(&name) {
            if existing.is_const {
                return Err(const_error(&name));
            }
        }
        locals.insert(name, variable);
        Ok(())
    }

    /// Rebind `name` in the frame that owns it. Returns `false` when no frame
    /// does, leaving the global assignment to the caller.
    pub fn assign_local(&self, name: &[u8], value: Value) -> Result<bool> {
        for scope in self.frames() {
            let mut locals = scope.0.locals.borrow_mut();
            if let Some(var) = locals.get_mut(name) {
                if var.is_const {
                    return Err(const_error(&LuaString::from(name)));
                }
                var.value = value;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Rebind `name` where it lives, or store it raw in the global table.
    pub fn put_nonlocal(&self, name: LuaString, value: Value) -> Result<()> {
        if self.assign_local(name.as_bytes(), value.clone())? {
            return Ok(());
        }

        trace!("global {} = {}", name, value);
        self.0
            .globals
            .borrow_mut()
            .put(Value::String(name), value)
            .map_err(LuaError::from)
    }

    /// `...` of the nearest enclosing function frame.
    pub fn varargs(&self) -> Vec<Value> {
        self.frames()
            .find_map(|s| s.0.varargs.as_ref())
            .map(|v| v.to_vec())
            .unwrap_or_default()
    }

    /// Record that a closure now references this frame and its ancestors.
    pub fn mark_captured(&self) {
        for scope in self.frames() {
            if scope.0.captured.replace(true) {
                break;
            }
        }
    }

    pub fn is_captured(&self) -> bool {
        self.0.captured.get()
    }
}

fn const_error(name: &LuaString) -> LuaError {
    LuaError::runtime(format!("attempt to assign to const variable '{}'", name))
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let locals = self.0.locals.borrow();
        let mut names: Vec<_> = locals.keys().map(|k| k.to_string()).collect();
        names.sort();
        f.debug_struct("Scope")
            .field("locals", &names)
            .field("depth", &(self.frames().count() - 1))
            .finish()
    }
}
