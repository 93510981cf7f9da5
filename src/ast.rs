//! Syntax tree consumed by the interpreter.
//!
//! Node shapes follow the Lua grammar closely: a chunk is a block, a block
//! is a statement list with an optional trailing `return`. Every node that
//! can fail at runtime carries the source line used in error positions.
//! The whole tree serialises to JSON for the `parse` command.

use std::rc::Rc;

use serde::{Serialize, Serializer};

use crate::arith::ArithOp;
use crate::stack::ensure_sufficient_stack;
use crate::value::{LuaString, Number};

#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub name: Rc<str>,
    pub block: Block,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub ret: Option<ReturnStatement>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReturnStatement {
    pub values: Vec<Expr>,
    pub line: usize,
}

/// `name <attrib>` in a `local` statement. The attribute is kept verbatim;
/// the resolver rejects anything but `const` and `close`.
#[derive(Debug, Clone, Serialize)]
pub struct AttribName {
    pub name: LuaString,
    pub attrib: Option<LuaString>,
}

impl AttribName {
    pub fn is_const(&self) -> bool {
        matches!(&self.attrib, Some(a) if a.as_bytes() == b"const" || a.as_bytes() == b"close")
    }

    pub fn is_close(&self) -> bool {
        matches!(&self.attrib, Some(a) if a.as_bytes() == b"close")
    }
}

/// `a.b.c:m` in `function a.b.c:m() end`.
#[derive(Debug, Clone, Serialize)]
pub struct FuncName {
    pub names: Vec<LuaString>,
    pub method: Option<LuaString>,
}

/// Parameter list and body shared by every closure created from it.
#[derive(Debug, Clone, Serialize)]
pub struct FuncBody {
    pub params: Vec<LuaString>,
    pub variadic: bool,
    pub body: Block,
    pub line: usize,

    /// Name used in tracebacks, when the definition site gives one.
    pub name: Option<String>,

    /// Chunk the function was defined in, for error positions.
    pub chunk: Rc<str>,
}

#[derive(Debug, Clone, Serialize)]
pub enum Stmt {
    Assignment {
        targets: Vec<Expr>,
        values: Vec<Expr>,
        line: usize,
    },

    LocalAssignment {
        names: Vec<AttribName>,
        values: Vec<Expr>,
        line: usize,
    },

    If {
        branches: Vec<(Expr, Block)>,
        else_block: Option<Block>,
        line: usize,
    },

    While {
        condition: Expr,
        body: Block,
        line: usize,
    },

    Repeat {
        body: Block,
        condition: Expr,
        line: usize,
    },

    /// Numeric `for`.
    For {
        var: LuaString,
        start: Expr,
        stop: Expr,
        step: Option<Expr>,
        body: Block,
        line: usize,
    },

    /// Generic `for ... in`.
    ForIn {
        names: Vec<LuaString>,
        exprs: Vec<Expr>,
        body: Block,
        line: usize,
    },

    Do(Block),

    FunctionDecl {
        name: FuncName,
        body: Rc<FuncBody>,
        line: usize,
    },

    LocalFunctionDecl {
        name: LuaString,
        body: Rc<FuncBody>,
        line: usize,
    },

    Break {
        line: usize,
    },

    Goto {
        label: LuaString,
        line: usize,
    },

    Label {
        name: LuaString,
        line: usize,
    },

    ExpressionStatement(Expr),
}

#[derive(Debug, Clone, Serialize)]
pub enum Field {
    /// `{ v }`
    Positional(Expr),

    /// `{ k = v }` and `{ [k] = v }`
    Keyed { key: Expr, value: Expr },
}

#[derive(Debug, Clone, Serialize)]
pub enum Expr {
    Nil,
    True,
    False,
    Number(Number),
    String(LuaString),
    Vararg,

    FunctionDef(Rc<FuncBody>),

    TableConstructor {
        fields: Vec<Field>,
        line: usize,
    },

    BinaryOp {
        op: BinaryOperator,
        #[serde(serialize_with = "nested")]
        lhs: Box<Expr>,
        #[serde(serialize_with = "nested")]
        rhs: Box<Expr>,
        line: usize,
    },

    UnaryOp {
        op: UnaryOperator,
        #[serde(serialize_with = "nested")]
        operand: Box<Expr>,
        line: usize,
    },

    VarName {
        name: LuaString,
        line: usize,
    },

    VarIndex {
        #[serde(serialize_with = "nested")]
        base: Box<Expr>,
        #[serde(serialize_with = "nested")]
        index: Box<Expr>,
        line: usize,
    },

    FunctionCall {
        #[serde(serialize_with = "nested")]
        callee: Box<Expr>,
        args: Vec<Expr>,
        line: usize,
    },

    MethodCall {
        #[serde(serialize_with = "nested")]
        object: Box<Expr>,
        method: LuaString,
        args: Vec<Expr>,
        line: usize,
    },

    /// `( e )`, which truncates a multi-result to one value.
    Paren(#[serde(serialize_with = "nested")] Box<Expr>),
}

impl Expr {
    /// Calls and `...` may produce any number of values.
    pub fn is_multi(&self) -> bool {
        matches!(
            self,
            Expr::FunctionCall { .. } | Expr::MethodCall { .. } | Expr::Vararg
        )
    }

    /// Source line, where the node records one.
    pub fn line(&self) -> Option<usize> {
        match self {
            Expr::TableConstructor { line, .. }
            | Expr::BinaryOp { line, .. }
            | Expr::UnaryOp { line, .. }
            | Expr::VarName { line, .. }
            | Expr::VarIndex { line, .. }
            | Expr::FunctionCall { line, .. }
            | Expr::MethodCall { line, .. } => Some(*line),
            Expr::FunctionDef(body) => Some(body.line),
            Expr::Paren(inner) => inner.line(),
            _ => None,
        }
    }

    /// Move this node's direct subexpressions into `out`, leaving `Nil`.
    fn take_children(&mut self, out: &mut Vec<Expr>) {
        match self {
            Expr::BinaryOp { lhs, rhs, .. } => {
                out.push(std::mem::replace(&mut **lhs, Expr::Nil));
                out.push(std::mem::replace(&mut **rhs, Expr::Nil));
            }
            Expr::UnaryOp { operand: inner, .. } | Expr::Paren(inner) => {
                out.push(std::mem::replace(&mut **inner, Expr::Nil));
            }
            Expr::VarIndex { base, index, .. } => {
                out.push(std::mem::replace(&mut **base, Expr::Nil));
                out.push(std::mem::replace(&mut **index, Expr::Nil));
            }
            Expr::FunctionCall { callee: head, args, .. }
            | Expr::MethodCall { object: head, args, .. } => {
                out.push(std::mem::replace(&mut **head, Expr::Nil));
                out.append(args);
            }
            Expr::TableConstructor { fields, .. } => {
                for field in fields.drain(..) {
                    match field {
                        Field::Positional(value) => out.push(value),
                        Field::Keyed { key, value } => {
                            out.push(key);
                            out.push(value);
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

/// Operator chains such as `1 + 1 + ... + 1` nest one box per operator, so
/// the tree is torn down with an explicit worklist instead of recursion.
impl Drop for Expr {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.take_children(&mut pending);
        while let Some(mut expr) = pending.pop() {
            expr.take_children(&mut pending);
        }
    }
}

#[allow(clippy::borrowed_box)]
fn nested<S: Serializer>(expr: &Box<Expr>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    ensure_sufficient_stack(|| expr.serialize(serializer))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
}

impl BinaryOperator {
    pub fn arith_op(self) -> Option<ArithOp> {
        Some(match self {
            BinaryOperator::Add => ArithOp::Add,
            BinaryOperator::Sub => ArithOp::Sub,
            BinaryOperator::Mul => ArithOp::Mul,
            BinaryOperator::Div => ArithOp::Div,
            BinaryOperator::IDiv => ArithOp::IDiv,
            BinaryOperator::Mod => ArithOp::Mod,
            BinaryOperator::Pow => ArithOp::Pow,
            BinaryOperator::BAnd => ArithOp::BAnd,
            BinaryOperator::BOr => ArithOp::BOr,
            BinaryOperator::BXor => ArithOp::BXor,
            BinaryOperator::Shl => ArithOp::Shl,
            BinaryOperator::Shr => ArithOp::Shr,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::IDiv => "//",
            BinaryOperator::Mod => "%",
            BinaryOperator::Pow => "^",
            BinaryOperator::Concat => "..",
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "~=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::BAnd => "&",
            BinaryOperator::BOr => "|",
            BinaryOperator::BXor => "~",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Shr => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOperator {
    Neg,
    Not,
    Len,
    BNot,
}
