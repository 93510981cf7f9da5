//! Static resolver pass for the **ay** interpreter.
//!
//! One walk over the tree, before anything runs, rejects programs that Lua
//! refuses at compile time:
//! 1. `break` outside a loop, `...` outside a vararg function.
//! 2. `goto` with no visible label, a label defined twice where it is
//!    visible, and forward jumps into the scope of a local.
//! 3. Assignment to a `<const>`/`<close>` local, unknown attributes, and more
//!    than one `<close>` variable in a single `local` statement.
//!
//! The bookkeeping mirrors the reference compiler: every function keeps a
//! stack of active local names, a list of visible labels and a list of
//! pending (forward) gotos. When a block closes its labels disappear and its
//! pending gotos move out to the enclosing block.

use crate::ast::{AttribName, Block, Chunk, Expr, Field, FuncBody, Stmt};
use crate::error::{LuaError, Result};
use crate::stack::ensure_sufficient_stack;
use crate::value::LuaString;
use log::{debug, info};

struct Label<'a> {
    name: &'a LuaString,
    line: usize,
}

struct PendingGoto<'a> {
    name: &'a LuaString,
    line: usize,
    /// Active locals at the jump, lowered as the goto leaves blocks.
    nactvar: usize,
}

struct BlockState {
    first_label: usize,
    first_goto: usize,
    nactvar: usize,
    is_loop: bool,
}

struct FunctionState<'a> {
    variadic: bool,
    active: Vec<(&'a LuaString, bool)>, // (name, is_const)
    labels: Vec<Label<'a>>,
    gotos: Vec<PendingGoto<'a>>,
    blocks: Vec<BlockState>,
}

impl<'a> FunctionState<'a> {
    fn new(variadic: bool) -> Self {
        Self {
            variadic,
            active: Vec::new(),
            labels: Vec::new(),
            gotos: Vec::new(),
            blocks: Vec::new(),
        }
    }
}

/// Check `chunk` for the static errors listed in the module docs.
pub fn resolve(chunk: &Chunk) -> Result<()> {
    Resolver::new().resolve(chunk)
}

pub struct Resolver<'a> {
    functions: Vec<FunctionState<'a>>,

    /// Last line seen, for errors on nodes that carry none.
    line: usize,
}

impl<'a> Default for Resolver<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Resolver<'a> {
    pub fn new() -> Self {
        info!("Resolver instantiated");

        Resolver {
            functions: Vec::new(),
            line: 1,
        }
    }

    /// Walk the main chunk, which behaves like a vararg function.
    pub fn resolve(&mut self, chunk: &'a Chunk) -> Result<()> {
        info!(
            "Beginning resolve pass over {} statement(s)",
            chunk.block.statements.len()
        );

        self.functions.push(FunctionState::new(true));
        self.resolve_body(&chunk.block, &[])?;
        self.functions.pop();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scopes
    // ─────────────────────────────────────────────────────────────────────────

    fn function(&mut self) -> &mut FunctionState<'a> {
        // The stack is never empty while walking.
        let last = self.functions.len() - 1;
        &mut self.functions[last]
    }

    fn begin_block(&mut self, is_loop: bool) {
        let f = self.function();
        let state = BlockState {
            first_label: f.labels.len(),
            first_goto: f.gotos.len(),
            nactvar: f.active.len(),
            is_loop,
        };
        f.blocks.push(state);
    }

    fn end_block(&mut self) {
        let f = self.function();
        if let Some(block) = f.blocks.pop() {
            f.active.truncate(block.nactvar);
            f.labels.truncate(block.first_label);
            for goto in f.gotos[block.first_goto..].iter_mut() {
                goto.nactvar = goto.nactvar.min(block.nactvar);
            }
        }
    }

    fn declare(&mut self, name: &'a LuaString, is_const: bool) {
        self.function().active.push((name, is_const));
    }

    /// Function body: parameters plus statements, then unresolved gotos.
    fn resolve_body(&mut self, body: &'a Block, params: &'a [LuaString]) -> Result<()> {
        self.begin_block(false);
        for param in params {
            self.declare(param, false);
        }
        self.resolve_statements(body, false)?;
        self.end_block();

        if let Some(goto) = self.function().gotos.first() {
            return Err(LuaError::resolve(
                goto.line,
                format!(
                    "no visible label '{}' for goto at line {}",
                    goto.name, goto.line
                ),
            ));
        }
        Ok(())
    }

    fn resolve_block(&mut self, block: &'a Block, is_loop: bool) -> Result<()> {
        self.begin_block(is_loop);
        self.resolve_statements(block, false)?;
        self.end_block();
        Ok(())
    }

    fn resolve_statements(&mut self, block: &'a Block, in_repeat: bool) -> Result<()> {
        for (i, stmt) in block.statements.iter().enumerate() {
            if let Stmt::Label { name, line } = stmt {
                // A label followed only by labels closes the block, so the
                // block's locals count as already out of scope there.
                let last = !in_repeat
                    && block.ret.is_none()
                    && block.statements[i + 1..]
                        .iter()
                        .all(|s| matches!(s, Stmt::Label { .. }));
                self.create_label(name, *line, last)?;
            } else {
                self.resolve_stmt(stmt)?;
            }
        }

        if let Some(ret) = &block.ret {
            for value in &ret.values {
                self.resolve_expr(value)?;
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Labels and gotos
    // ─────────────────────────────────────────────────────────────────────────

    fn create_label(&mut self, name: &'a LuaString, line: usize, last: bool) -> Result<()> {
        let f = self.function();

        if let Some(existing) = f.labels.iter().find(|l| l.name == name) {
            return Err(LuaError::resolve(
                line,
                format!("label '{}' already defined on line {}", name, existing.line),
            ));
        }

        let block = f.blocks.last();
        let first_goto = block.map_or(0, |b| b.first_goto);
        let nactvar = match (last, block) {
            (true, Some(b)) => b.nactvar,
            _ => f.active.len(),
        };

        let mut i = first_goto;
        while i < f.gotos.len() {
            if f.gotos[i].name == name {
                let goto = f.gotos.remove(i);
                if goto.nactvar < nactvar {
                    let local = f.active[goto.nactvar].0;
                    return Err(LuaError::resolve(
                        goto.line,
                        format!(
                            "<goto {}> at line {} jumps into the scope of local '{}'",
                            name, goto.line, local
                        ),
                    ));
                }
            } else {
                i += 1;
            }
        }

        f.labels.push(Label { name, line });
        Ok(())
    }

    fn goto(&mut self, name: &'a LuaString, line: usize) {
        let f = self.function();

        // Backward jumps to a visible label are always fine.
        if f.labels.iter().any(|l| l.name == name) {
            return;
        }
        let nactvar = f.active.len();
        f.gotos.push(PendingGoto {
            name,
            line,
            nactvar,
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statement resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_stmt(&mut self, stmt: &'a Stmt) -> Result<()> {
        debug!("Resolving stmt at {:p}", stmt);

        match stmt {
            Stmt::Assignment {
                targets,
                values,
                line,
            } => {
                for target in targets {
                    if let Expr::VarName { name, .. } = target {
                        self.check_assignable(name, *line)?;
                    }
                    self.resolve_expr(target)?;
                }
                for value in values {
                    self.resolve_expr(value)?;
                }
            }

            Stmt::LocalAssignment {
                names,
                values,
                line,
            } => {
                for value in values {
                    self.resolve_expr(value)?;
                }
                self.check_attributes(names, *line)?;
                for attrib in names {
                    self.declare(&attrib.name, attrib.is_const());
                }
            }

            Stmt::If {
                branches,
                else_block,
                ..
            } => {
                for (condition, block) in branches {
                    self.resolve_expr(condition)?;
                    self.resolve_block(block, false)?;
                }
                if let Some(block) = else_block {
                    self.resolve_block(block, false)?;
                }
            }

            Stmt::While {
                condition, body, ..
            } => {
                self.resolve_expr(condition)?;
                self.resolve_block(body, true)?;
            }

            Stmt::Repeat {
                body, condition, ..
            } => {
                // The condition sees the body's locals.
                self.begin_block(true);
                self.resolve_statements(body, true)?;
                self.resolve_expr(condition)?;
                self.end_block();
            }

            Stmt::For {
                var,
                start,
                stop,
                step,
                body,
                ..
            } => {
                self.resolve_expr(start)?;
                self.resolve_expr(stop)?;
                if let Some(step) = step {
                    self.resolve_expr(step)?;
                }
                self.begin_block(true);
                self.declare(var, false);
                self.resolve_statements(body, false)?;
                self.end_block();
            }

            Stmt::ForIn {
                names, exprs, body, ..
            } => {
                for expr in exprs {
                    self.resolve_expr(expr)?;
                }
                self.begin_block(true);
                for name in names {
                    self.declare(name, false);
                }
                self.resolve_statements(body, false)?;
                self.end_block();
            }

            Stmt::Do(block) => self.resolve_block(block, false)?,

            Stmt::FunctionDecl { name, body, line } => {
                if name.names.len() == 1 && name.method.is_none() {
                    self.check_assignable(&name.names[0], *line)?;
                }
                self.resolve_function(body)?;
            }

            Stmt::LocalFunctionDecl { name, body, .. } => {
                // Visible inside its own body, so it can recurse.
                self.declare(name, false);
                self.resolve_function(body)?;
            }

            Stmt::Break { line } => {
                let in_loop = self.function().blocks.iter().any(|b| b.is_loop);
                if !in_loop {
                    return Err(LuaError::resolve(
                        *line,
                        format!("break outside a loop at line {}", line),
                    ));
                }
            }

            Stmt::Goto { label, line } => self.goto(label, *line),

            // Handled by `resolve_statements`, which knows the position.
            Stmt::Label { .. } => {}

            Stmt::ExpressionStatement(expr) => self.resolve_expr(expr)?,
        }

        Ok(())
    }

    fn check_attributes(&self, names: &[AttribName], line: usize) -> Result<()> {
        let mut closes = 0;
        for attrib in names {
            if let Some(a) = &attrib.attrib {
                match a.as_bytes() {
                    b"const" => {}
                    b"close" => closes += 1,
                    _ => {
                        return Err(LuaError::resolve(
                            line,
                            format!("unknown attribute '{}'", a),
                        ))
                    }
                }
            }
        }
        if closes > 1 {
            return Err(LuaError::resolve(
                line,
                "multiple to-be-closed variables in local list",
            ));
        }
        Ok(())
    }

    /// Reject assignment when `name` resolves to a constant local, searching
    /// the current function and then enclosing ones (upvalues).
    fn check_assignable(&self, name: &LuaString, line: usize) -> Result<()> {
        for f in self.functions.iter().rev() {
            if let Some((_, is_const)) = f.active.iter().rev().find(|(n, _)| *n == name) {
                if *is_const {
                    return Err(LuaError::resolve(
                        line,
                        format!("attempt to assign to const variable '{}'", name),
                    ));
                }
                return Ok(());
            }
        }
        Ok(())
    }

    fn resolve_function(&mut self, body: &'a FuncBody) -> Result<()> {
        self.functions.push(FunctionState::new(body.variadic));
        let result = self.resolve_body(&body.body, &body.params);
        self.functions.pop();
        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expression resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &'a Expr) -> Result<()> {
        ensure_sufficient_stack(|| self.resolve_expr_inner(expr))
    }

    fn resolve_expr_inner(&mut self, expr: &'a Expr) -> Result<()> {
        if let Some(line) = expr.line() {
            self.line = line;
        }

        match expr {
            Expr::Nil
            | Expr::True
            | Expr::False
            | Expr::Number(_)
            | Expr::String(_)
            | Expr::VarName { .. } => {}

            Expr::Vararg => {
                if !self.function().variadic {
                    return Err(LuaError::resolve(
                        self.line,
                        "cannot use '...' outside a vararg function near '...'",
                    ));
                }
            }

            Expr::FunctionDef(body) => self.resolve_function(body)?,

            Expr::TableConstructor { fields, .. } => {
                for field in fields {
                    match field {
                        Field::Positional(value) => self.resolve_expr(value)?,
                        Field::Keyed { key, value } => {
                            self.resolve_expr(key)?;
                            self.resolve_expr(value)?;
                        }
                    }
                }
            }

            Expr::BinaryOp { lhs, rhs, .. } => {
                self.resolve_expr(lhs)?;
                self.resolve_expr(rhs)?;
            }

            Expr::UnaryOp { operand, .. } => self.resolve_expr(operand)?,

            Expr::VarIndex { base, index, .. } => {
                self.resolve_expr(base)?;
                self.resolve_expr(index)?;
            }

            Expr::FunctionCall { callee, args, .. } => {
                self.resolve_expr(callee)?;
                for arg in args {
                    self.resolve_expr(arg)?;
                }
            }

            Expr::MethodCall { object, args, .. } => {
                self.resolve_expr(object)?;
                for arg in args {
                    self.resolve_expr(arg)?;
                }
            }

            Expr::Paren(inner) => self.resolve_expr(inner)?,
        }

        Ok(())
    }
}
