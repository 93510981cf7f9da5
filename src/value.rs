//! Runtime value model.
//!
//! [`Value`] is a closed tagged union. Scalars (`nil`, booleans, numbers,
//! strings) compare by value; tables, functions, userdata and threads are
//! shared handles compared by identity. Handles are reference counted, so a
//! table that contains itself is legal: it simply never gets freed.

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use bytes::Bytes;
use serde::{Serialize, Serializer};

use crate::ast::FuncBody;
use crate::environment::Scope;
use crate::error::Result;
use crate::interpreter::Interpreter;
use crate::numeral::format_float;
use crate::table::Table;

// ─── Numbers ────────────────────────────────────────────────────────────────

/// Lua number: 64-bit integer or double.
///
/// Equality is mathematical (`1 == 1.0`), the subtype only matters for
/// display and for arithmetic result types.
#[derive(Debug, Clone, Copy, Serialize)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    pub fn to_float(self) -> f64 {
        match self {
            Number::Integer(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Number::Integer(_))
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        crate::arith::num_eq(*self, *other)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(i) => {
                let mut buf = itoa::Buffer::new();
                f.write_str(buf.format(*i))
            }
            Number::Float(x) => f.write_str(&format_float(*x)),
        }
    }
}

// ─── Strings ────────────────────────────────────────────────────────────────

/// Immutable byte string. Cheap to clone, compared and hashed byte-wise.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct LuaString(Bytes);

impl LuaString {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Permissive decoding, invalid sequences become U+FFFD.
    pub fn to_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn concat(&self, other: &[u8]) -> LuaString {
        let mut buf = Vec::with_capacity(self.len() + other.len());
        buf.extend_from_slice(&self.0);
        buf.extend_from_slice(other);
        LuaString::from(buf)
    }
}

impl Hash for LuaString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state)
    }
}

impl std::borrow::Borrow<[u8]> for LuaString {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for LuaString {
    fn from(s: &str) -> Self {
        LuaString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for LuaString {
    fn from(s: String) -> Self {
        LuaString(Bytes::from(s.into_bytes()))
    }
}

impl From<Vec<u8>> for LuaString {
    fn from(v: Vec<u8>) -> Self {
        LuaString(Bytes::from(v))
    }
}

impl From<&[u8]> for LuaString {
    fn from(v: &[u8]) -> Self {
        LuaString(Bytes::copy_from_slice(v))
    }
}

impl fmt::Display for LuaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str_lossy())
    }
}

impl fmt::Debug for LuaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_str_lossy())
    }
}

impl Serialize for LuaString {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_str_lossy())
    }
}

// ─── Shared handles ─────────────────────────────────────────────────────────

/// Shared, mutable table handle.
#[derive(Clone, Default)]
pub struct TableRef(Rc<RefCell<Table>>);

impl TableRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: Table) -> Self {
        TableRef(Rc::new(RefCell::new(table)))
    }

    pub fn borrow(&self) -> Ref<'_, Table> {
        RefCell::borrow(&self.0)
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Table> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &TableRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }

    pub fn metatable(&self) -> Option<TableRef> {
        RefCell::borrow(&self.0).metatable()
    }
}

impl PartialEq for TableRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for TableRef {}

impl Hash for TableRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_ptr().hash(state)
    }
}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut visiting = Vec::new();
        write_table(self, f, &mut visiting)
    }
}

/// Signature of host functions callable from Lua.
pub type NativeFn = dyn Fn(&mut Interpreter, Vec<Value>) -> Result<Vec<Value>>;

/// Interpreted function: a body plus the scope it closes over.
pub struct LuaFunction {
    pub body: Rc<FuncBody>,
    pub scope: Scope,
}

pub struct NativeFunction {
    pub name: String,
    pub func: Box<NativeFn>,
}

pub enum Function {
    Lua(LuaFunction),
    Native(NativeFunction),
}

impl Function {
    pub fn name(&self) -> Option<&str> {
        match self {
            Function::Lua(f) => f.body.name.as_deref(),
            Function::Native(f) => Some(&f.name),
        }
    }
}

#[derive(Clone)]
pub struct FunctionRef(Rc<Function>);

impl FunctionRef {
    pub fn lua(body: Rc<FuncBody>, scope: Scope) -> Self {
        FunctionRef(Rc::new(Function::Lua(LuaFunction { body, scope })))
    }

    pub fn native<F>(name: &str, func: F) -> Self
    where
        F: Fn(&mut Interpreter, Vec<Value>) -> Result<Vec<Value>> + 'static,
    {
        FunctionRef(Rc::new(Function::Native(NativeFunction {
            name: name.to_string(),
            func: Box::new(func),
        })))
    }

    pub fn function(&self) -> &Function {
        &self.0
    }

    pub fn ptr_eq(&self, other: &FunctionRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for FunctionRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for FunctionRef {}

impl Hash for FunctionRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_ptr().hash(state)
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.name() {
            Some(name) => write!(f, "function {} ({:p})", name, self.as_ptr()),
            None => write!(f, "function ({:p})", self.as_ptr()),
        }
    }
}

/// Opaque host object with an optional metatable.
pub struct UserData {
    pub metatable: RefCell<Option<TableRef>>,
    pub payload: Box<dyn Any>,
}

#[derive(Clone)]
pub struct UserDataRef(Rc<UserData>);

impl UserDataRef {
    pub fn new(payload: Box<dyn Any>) -> Self {
        UserDataRef(Rc::new(UserData {
            metatable: RefCell::new(None),
            payload,
        }))
    }

    pub fn data(&self) -> &UserData {
        &self.0
    }

    pub fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for UserDataRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for UserDataRef {}

impl Hash for UserDataRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_ptr().hash(state)
    }
}

impl fmt::Debug for UserDataRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "userdata ({:p})", self.as_ptr())
    }
}

/// Coroutine placeholder. Only identity is observable.
#[derive(Default)]
pub struct Thread;

#[derive(Clone, Default)]
pub struct ThreadRef(Rc<Thread>);

impl ThreadRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for ThreadRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ThreadRef {}

impl Hash for ThreadRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_ptr().hash(state)
    }
}

impl fmt::Debug for ThreadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread ({:p})", self.as_ptr())
    }
}

// ─── Value ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Number(Number),
    String(LuaString),
    Table(TableRef),
    Function(FunctionRef),
    UserData(UserDataRef),
    Thread(ThreadRef),
}

impl Value {
    pub fn integer(i: i64) -> Self {
        Value::Number(Number::Integer(i))
    }

    pub fn float(f: f64) -> Self {
        Value::Number(Number::Float(f))
    }

    pub fn table(table: TableRef) -> Self {
        Value::Table(table)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// `nil` and `false` are falsy, everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::UserData(_) => "userdata",
            Value::Thread(_) => "thread",
        }
    }

    /// Primitive equality: by value for scalars, by identity for objects.
    /// Never consults `__eq`.
    pub fn raw_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::UserData(a), Value::UserData(b)) => a == b,
            (Value::Thread(a), Value::Thread(b)) => a == b,
            _ => false,
        }
    }

    /// Metatable attached to this value, if the kind supports one.
    pub fn metatable(&self) -> Option<TableRef> {
        match self {
            Value::Table(t) => t.metatable(),
            Value::UserData(u) => u.data().metatable.borrow().clone(),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_lua_string(&self) -> Option<&LuaString> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Address of the shared object behind a reference value.
    pub fn object_ptr(&self) -> Option<*const ()> {
        match self {
            Value::Table(t) => Some(t.as_ptr()),
            Value::Function(f) => Some(f.as_ptr()),
            Value::UserData(u) => Some(u.as_ptr()),
            Value::Thread(t) => Some(t.as_ptr()),
            _ => None,
        }
    }

    /// Debug rendering that shows table contents, e.g. `{1: "a", x: {}}`.
    /// A table reached again while it is being rendered prints as
    /// `<cycle table: 0x...>`.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        let mut visiting = Vec::new();
        // Writing into a String cannot fail.
        let _ = write_repr(self, &mut out, &mut visiting);
        out
    }
}

fn write_repr(value: &Value, out: &mut dyn fmt::Write, visiting: &mut Vec<*const ()>) -> fmt::Result {
    match value {
        Value::String(s) => write!(out, "{:?}", s),
        Value::Table(t) => write_table(t, out, visiting),
        other => write!(out, "{}", other),
    }
}

fn write_table(table: &TableRef, out: &mut dyn fmt::Write, visiting: &mut Vec<*const ()>) -> fmt::Result {
    let ptr = table.as_ptr();
    if visiting.contains(&ptr) {
        return write!(out, "<cycle table: {:p}>", ptr);
    }

    let entries: Vec<(Value, Value)> = match table.0.try_borrow() {
        Ok(t) => t.iter().collect(),
        Err(_) => return write!(out, "<busy table: {:p}>", ptr),
    };

    visiting.push(ptr);
    out.write_char('{')?;
    for (i, (key, val)) in entries.iter().enumerate() {
        if i > 0 {
            out.write_str(", ")?;
        }
        match key {
            Value::String(s) => write!(out, "{}", s)?,
            other => write_repr(other, out, visiting)?,
        }
        out.write_str(": ")?;
        write_repr(val, out, visiting)?;
    }
    out.write_char('}')?;
    visiting.pop();

    Ok(())
}

/// Plain display, no metamethods: `nil`, `true`, `42`, `4.0`, raw string
/// bytes, `table: 0x...`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            other => match other.object_ptr() {
                Some(ptr) => write!(f, "{}: {:p}", other.type_name(), ptr),
                None => Ok(()),
            },
        }
    }
}

/// Raw equality; use the interpreter for `__eq`-aware comparison.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.raw_equals(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::float(f)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(LuaString::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(LuaString::from(s))
    }
}

impl From<LuaString> for Value {
    fn from(s: LuaString) -> Self {
        Value::String(s)
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::Table(t)
    }
}

impl From<FunctionRef> for Value {
    fn from(f: FunctionRef) -> Self {
        Value::Function(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_compare_across_subtypes() {
        assert_eq!(Value::integer(1), Value::float(1.0));
        assert_ne!(Value::float(f64::NAN), Value::float(f64::NAN));
        assert_ne!(Value::integer(1), Value::from("1"));
    }

    #[test]
    fn tables_compare_by_identity() {
        let a = TableRef::new();
        let b = TableRef::new();
        assert_ne!(Value::from(a.clone()), Value::from(b));
        assert_eq!(Value::from(a.clone()), Value::from(a));
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::Nil.to_string(), "nil");
        assert_eq!(Value::from(false).to_string(), "false");
        assert_eq!(Value::integer(-7).to_string(), "-7");
        assert_eq!(Value::float(4.0).to_string(), "4.0");
        assert_eq!(Value::from("hi").to_string(), "hi");
        assert!(Value::from(TableRef::new()).to_string().starts_with("table: 0x"));
    }

    #[test]
    fn self_containing_table_renders() {
        let t = TableRef::new();
        t.borrow_mut().set_str("me", Value::from(t.clone()));
        let text = Value::from(t.clone()).repr();
        assert!(text.starts_with("{me: <cycle table: 0x"), "{}", text);
        assert!(format!("{:?}", t).contains("<cycle"));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::from(false).is_truthy());
        assert!(Value::integer(0).is_truthy());
        assert!(Value::from("").is_truthy());
    }
}
