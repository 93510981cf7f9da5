//! Statement execution.
//!
//! Every executor returns a [`Signal`]; loops absorb `Break`, function calls
//! absorb `Return`, and a block that does not contain the target of a `Goto`
//! hands it to the enclosing block. To-be-closed values are released in
//! reverse order whenever their block is left, however it is left.

use log::{debug, trace};

use crate::arith;
use crate::ast::{AttribName, Block, Expr, FuncName, Stmt};
use crate::environment::{Scope, Variable};
use crate::error::Result;
use crate::metamethod::{self, get_metamethod};
use crate::multires;
use crate::value::{LuaString, Number, Value};

use super::expressions::variable_info;
use super::{Interpreter, Signal};

/// Mutable state of one running block.
struct BlockState {
    /// Innermost frame; `local` statements may replace it with a child.
    scope: Scope,

    /// Pending `<close>` values with the line of their declaration.
    to_close: Vec<(Value, usize)>,
}

impl BlockState {
    fn new(scope: Scope) -> Self {
        Self {
            scope,
            to_close: Vec::new(),
        }
    }

    /// Start a fresh frame when the current one already binds one of `names`
    /// or is held by a closure, so earlier closures keep their bindings.
    fn open_local_frame<'n>(&mut self, mut names: impl Iterator<Item = &'n LuaString>) {
        if self.scope.is_captured() || names.any(|n| self.scope.owns(n.as_bytes())) {
            self.scope = self.scope.push();
        }
    }
}

/// Assignment target with its subexpressions already evaluated.
enum Place<'a> {
    Name(&'a LuaString),
    Field { obj: Value, key: Value, base: &'a Expr },
}

impl Interpreter {
    /// Run `block` directly in `scope`.
    pub(crate) fn exec_block(&mut self, block: &Block, scope: Scope) -> Result<Signal> {
        let mut state = BlockState::new(scope);
        let result = self.run_block(block, &mut state);
        self.close_variables(state.to_close, result)
    }

    /// Close `pending` newest first. An error from a handler replaces the
    /// block's outcome and is passed to the remaining handlers.
    fn close_variables(&mut self, pending: Vec<(Value, usize)>, result: Result<Signal>) -> Result<Signal> {
        let mut result = result;
        for (value, line) in pending.into_iter().rev() {
            let err = match &result {
                Ok(_) => Value::Nil,
                Err(e) if e.is_catchable() => e.to_value(),
                Err(_) => continue,
            };
            if let Err(e) = self.close_value(value, err, Some(line)) {
                result = Err(e);
            }
        }
        result
    }

    fn run_block(&mut self, block: &Block, state: &mut BlockState) -> Result<Signal> {
        let statements = &block.statements;

        // Labels reached so far: the scope and close-list length in effect
        // at the label, restored when a goto jumps back to it.
        let mut labels: Vec<(LuaString, Scope, usize)> = Vec::new();

        let mut pc = 0;
        while pc < statements.len() {
            let stmt = &statements[pc];
            pc += 1;

            if let Stmt::Label { name, .. } = stmt {
                labels.retain(|(n, ..)| n != name);
                labels.push((name.clone(), state.scope.clone(), state.to_close.len()));
                state.scope = state.scope.push();
                continue;
            }

            match self.exec_statement(stmt, state)? {
                Signal::Normal => {}
                Signal::Goto(label) => {
                    let Some(target) = find_label(statements, &label) else {
                        return Ok(Signal::Goto(label));
                    };
                    debug!("goto {} (statement {})", label, target);

                    if let Some((_, scope, closed)) = labels.iter().find(|(n, ..)| *n == label) {
                        let scope = scope.clone();
                        let pending = state.to_close.split_off(*closed);
                        self.close_variables(pending, Ok(Signal::Normal))?;
                        state.scope = scope;
                    }
                    pc = target;
                }
                other => return Ok(other),
            }
        }

        match &block.ret {
            Some(ret) => {
                let values = self.eval_list(&ret.values, &state.scope)?;
                Ok(Signal::Return(values))
            }
            None => Ok(Signal::Normal),
        }
    }

    fn exec_statement(&mut self, stmt: &Stmt, state: &mut BlockState) -> Result<Signal> {
        trace!("Executing statement: {}", statement_kind(stmt));

        match stmt {
            Stmt::ExpressionStatement(expr) => {
                self.eval_multi(expr, &state.scope)?;
            }

            Stmt::LocalAssignment {
                names,
                values,
                line,
            } => self.exec_local(names, values, *line, state)?,

            Stmt::Assignment {
                targets,
                values,
                line,
            } => self.exec_assignment(targets, values, *line, &state.scope)?,

            Stmt::If {
                branches,
                else_block,
                ..
            } => {
                for (condition, block) in branches {
                    if self.eval(condition, &state.scope)?.is_truthy() {
                        return self.exec_block(block, state.scope.push());
                    }
                }
                if let Some(block) = else_block {
                    return self.exec_block(block, state.scope.push());
                }
            }

            Stmt::While {
                condition, body, ..
            } => {
                while self.eval(condition, &state.scope)?.is_truthy() {
                    if let Some(signal) = self.loop_iteration(body, state.scope.push())? {
                        return Ok(signal);
                    }
                }
            }

            Stmt::Repeat {
                body, condition, ..
            } => loop {
                // The condition runs inside the body's scope.
                let mut inner = BlockState::new(state.scope.push());
                let result = match self.run_block(body, &mut inner) {
                    Ok(Signal::Normal) => self.eval(condition, &inner.scope).map(|v| {
                        if v.is_truthy() {
                            Signal::Break
                        } else {
                            Signal::Normal
                        }
                    }),
                    other => other,
                };
                match self.close_variables(inner.to_close, result)? {
                    Signal::Normal => {}
                    Signal::Break => break,
                    other => return Ok(other),
                }
            },

            Stmt::For {
                var,
                start,
                stop,
                step,
                body,
                line,
            } => {
                return self.exec_numeric_for(var, start, stop, step.as_ref(), body, *line, &state.scope)
            }

            Stmt::ForIn {
                names,
                exprs,
                body,
                line,
            } => return self.exec_generic_for(names, exprs, body, *line, &state.scope),

            Stmt::Do(block) => return self.exec_block(block, state.scope.push()),

            Stmt::FunctionDecl { name, body, line } => {
                let closure = self.make_closure(body, &state.scope);
                self.assign_function(name, closure, *line, &state.scope)?;
            }

            Stmt::LocalFunctionDecl { name, body, .. } => {
                // Bound before the closure is made so the body can recurse.
                state.open_local_frame(std::iter::once(name));
                state.scope.put_local(name.clone(), Variable::new(Value::Nil))?;
                let closure = self.make_closure(body, &state.scope);
                state.scope.assign_local(name.as_bytes(), closure)?;
            }

            Stmt::Break { .. } => return Ok(Signal::Break),

            Stmt::Goto { label, .. } => return Ok(Signal::Goto(label.clone())),

            // Executed by `run_block`, which tracks label positions.
            Stmt::Label { .. } => {}
        }

        Ok(Signal::Normal)
    }

    /// Body of one loop iteration. `None` means keep looping; `Some` carries
    /// the signal the loop statement itself yields.
    fn loop_iteration(&mut self, body: &Block, frame: Scope) -> Result<Option<Signal>> {
        Ok(match self.exec_block(body, frame)? {
            Signal::Normal => None,
            Signal::Break => Some(Signal::Normal),
            other => Some(other),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Declarations and assignment
    // ─────────────────────────────────────────────────────────────────────────

    fn exec_local(
        &mut self,
        names: &[AttribName],
        values: &[Expr],
        line: usize,
        state: &mut BlockState,
    ) -> Result<()> {
        let values = self.eval_list(values, &state.scope)?;
        let values = multires::adjust(values, names.len());

        state.open_local_frame(names.iter().map(|a| &a.name));

        for (attrib, value) in names.iter().zip(values) {
            let variable = if attrib.is_close() {
                if value.is_truthy() && get_metamethod(&value, metamethod::CLOSE).is_nil() {
                    return Err(self.raise(
                        Some(line),
                        format!("variable '{}' got a non-closable value", attrib.name),
                    ));
                }
                state.to_close.push((value.clone(), line));
                Variable::to_be_closed(value)
            } else if attrib.is_const() {
                Variable::constant(value)
            } else {
                Variable::new(value)
            };
            state.scope.put_local(attrib.name.clone(), variable)?;
        }
        Ok(())
    }

    /// Targets' table and key expressions are evaluated first, then the
    /// right-hand side, and only then is anything stored.
    fn exec_assignment(&mut self, targets: &[Expr], values: &[Expr], line: usize, scope: &Scope) -> Result<()> {
        let mut places = Vec::with_capacity(targets.len());
        for target in targets {
            places.push(match target {
                Expr::VarName { name, .. } => Place::Name(name),
                Expr::VarIndex { base, index, .. } => Place::Field {
                    obj: self.eval(base, scope)?,
                    key: self.eval(index, scope)?,
                    base,
                },
                _ => return Err(self.raise(Some(line), "cannot assign to this expression")),
            });
        }

        let values = multires::adjust(self.eval_list(values, scope)?, targets.len());

        for (place, value) in places.into_iter().zip(values) {
            match place {
                Place::Name(name) => self.write_variable(name, value, line, scope)?,
                Place::Field { obj, key, base } => {
                    self.set_index(obj, key, value, Some(line), &|_: usize| variable_info(base, scope))?
                }
            }
        }
        Ok(())
    }

    /// `function a.b.c:m() end` stores into `a.b.c["m"]`; a plain name is an
    /// ordinary variable assignment.
    fn assign_function(&mut self, name: &FuncName, closure: Value, line: usize, scope: &Scope) -> Result<()> {
        let Some((first, rest)) = name.names.split_first() else {
            return Ok(());
        };
        let (path, key) = match (&name.method, rest.split_last()) {
            (Some(method), _) => (rest, method),
            (None, Some((last, path))) => (path, last),
            (None, None) => return self.write_variable(first, closure, line, scope),
        };

        let mut obj = self.read_variable(first, line, scope)?;
        let mut described = first;
        let mut is_local = scope.binding_kind(first.as_bytes());
        for field in path {
            let info = describe_function_path(described, is_local);
            obj = self.index(obj, Value::String(field.clone()), Some(line), &|_: usize| info.clone())?;
            described = field;
            is_local = Some("field");
        }
        let info = describe_function_path(described, is_local);
        self.set_index(obj, Value::String(key.clone()), closure, Some(line), &|_: usize| info.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loops
    // ─────────────────────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn exec_numeric_for(
        &mut self,
        var: &LuaString,
        start: &Expr,
        stop: &Expr,
        step: Option<&Expr>,
        body: &Block,
        line: usize,
        scope: &Scope,
    ) -> Result<Signal> {
        let start = self.eval(start, scope)?;
        let stop = self.eval(stop, scope)?;
        let step = match step {
            Some(expr) => self.eval(expr, scope)?,
            None => Value::integer(1),
        };

        let limit = self.for_number(&stop, "limit", line)?;

        if let (Value::Number(Number::Integer(init)), Value::Number(Number::Integer(step))) = (&start, &step) {
            let (init, step) = (*init, *step);
            if step == 0 {
                return Err(self.raise(Some(line), "'for' step is zero"));
            }
            let Some(limit) = for_limit(init, limit, step) else {
                return Ok(Signal::Normal);
            };

            // Iterations left after the first; counting avoids overflowing
            // the control variable at the ends of the integer range.
            let mut remaining = if step > 0 {
                (limit as u64).wrapping_sub(init as u64) / step as u64
            } else {
                (init as u64).wrapping_sub(limit as u64) / ((-(step + 1)) as u64 + 1)
            };

            let mut i = init;
            loop {
                let frame = scope.push();
                frame.put_local(var.clone(), Variable::new(Value::integer(i)))?;
                if let Some(signal) = self.loop_iteration(body, frame)? {
                    return Ok(signal);
                }
                if remaining == 0 {
                    break;
                }
                remaining -= 1;
                i = i.wrapping_add(step);
            }
            return Ok(Signal::Normal);
        }

        let step = self.for_number(&step, "step", line)?.to_float();
        let init = self.for_number(&start, "initial value", line)?.to_float();
        let limit = limit.to_float();
        if step == 0.0 {
            return Err(self.raise(Some(line), "'for' step is zero"));
        }

        let mut i = init;
        while if step > 0.0 { i <= limit } else { i >= limit } {
            let frame = scope.push();
            frame.put_local(var.clone(), Variable::new(Value::float(i)))?;
            if let Some(signal) = self.loop_iteration(body, frame)? {
                return Ok(signal);
            }
            i += step;
        }
        Ok(Signal::Normal)
    }

    fn for_number(&self, value: &Value, what: &str, line: usize) -> Result<Number> {
        arith::to_number(value)
            .ok_or_else(|| self.raise(Some(line), format!("'for' {} must be a number", what)))
    }

    /// Generic `for`: the explist is adjusted to iterator, state, control
    /// and closing value; the closing value is closed when the loop ends.
    fn exec_generic_for(
        &mut self,
        names: &[LuaString],
        exprs: &[Expr],
        body: &Block,
        line: usize,
        scope: &Scope,
    ) -> Result<Signal> {
        let values = multires::adjust(self.eval_list(exprs, scope)?, 4);
        let mut values = values.into_iter();
        let iterator = values.next().unwrap_or_default();
        let state = values.next().unwrap_or_default();
        let control = values.next().unwrap_or_default();
        let closing = values.next().unwrap_or_default();

        if closing.is_truthy() && get_metamethod(&closing, metamethod::CLOSE).is_nil() {
            return Err(self.raise(
                Some(line),
                "variable '(for state)' got a non-closable value",
            ));
        }

        let result = self.generic_for_loop(names, iterator, state, control, body, line, scope);
        self.close_variables(vec![(closing, line)], result)
    }

    #[allow(clippy::too_many_arguments)]
    fn generic_for_loop(
        &mut self,
        names: &[LuaString],
        iterator: Value,
        state: Value,
        control: Value,
        body: &Block,
        line: usize,
        scope: &Scope,
    ) -> Result<Signal> {
        let mut control = control;
        loop {
            let results = self.call_value(
                iterator.clone(),
                vec![state.clone(), control.clone()],
                Some(line),
                &|_: usize| " (for iterator 'for iterator')".to_string(),
            )?;
            let results = multires::adjust(results, names.len());
            let first = multires::nth(&results, 0);
            if first.is_nil() {
                return Ok(Signal::Normal);
            }
            control = first;

            let frame = scope.push();
            for (name, value) in names.iter().zip(results) {
                frame.put_local(name.clone(), Variable::new(value))?;
            }
            if let Some(signal) = self.loop_iteration(body, frame)? {
                return Ok(signal);
            }
        }
    }
}

fn find_label(statements: &[Stmt], label: &LuaString) -> Option<usize> {
    statements
        .iter()
        .position(|s| matches!(s, Stmt::Label { name, .. } if name == label))
}

/// Integer loop limit, or `None` when the loop must not run at all. Float
/// limits are floored (ceiled for negative steps) and clipped to the
/// integer range.
fn for_limit(init: i64, limit: Number, step: i64) -> Option<i64> {
    let limit = match limit {
        Number::Integer(l) => l,
        Number::Float(f) => {
            let rounded = if step < 0 { f.ceil() } else { f.floor() };
            match arith::float_to_integer(rounded) {
                Some(l) => l,
                None if f.is_nan() => return None,
                None if f > 0.0 => {
                    if step < 0 {
                        return None;
                    }
                    i64::MAX
                }
                None => {
                    if step > 0 {
                        return None;
                    }
                    i64::MIN
                }
            }
        }
    };

    let skip = if step > 0 { init > limit } else { init < limit };
    if skip {
        None
    } else {
        Some(limit)
    }
}

fn describe_function_path(name: &LuaString, kind: Option<&str>) -> String {
    format!(" ({} '{}')", kind.unwrap_or("global"), name)
}

fn statement_kind(stmt: &Stmt) -> &'static str {
    match stmt {
        Stmt::Assignment { .. } => "assignment",
        Stmt::LocalAssignment { .. } => "local",
        Stmt::If { .. } => "if",
        Stmt::While { .. } => "while",
        Stmt::Repeat { .. } => "repeat",
        Stmt::For { .. } => "for",
        Stmt::ForIn { .. } => "for-in",
        Stmt::Do(_) => "do",
        Stmt::FunctionDecl { .. } => "function",
        Stmt::LocalFunctionDecl { .. } => "local function",
        Stmt::Break { .. } => "break",
        Stmt::Goto { .. } => "goto",
        Stmt::Label { .. } => "label",
        Stmt::ExpressionStatement(_) => "call",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_clip_to_integer_range() {
        assert_eq!(for_limit(1, Number::Integer(3), 1), Some(3));
        assert_eq!(for_limit(1, Number::Float(3.7), 1), Some(3));
        assert_eq!(for_limit(1, Number::Float(-3.7), -1), Some(-3));
        assert_eq!(for_limit(1, Number::Float(1e300), 1), Some(i64::MAX));
        assert_eq!(for_limit(1, Number::Float(1e300), -1), None);
        assert_eq!(for_limit(1, Number::Float(f64::NAN), 1), None);
        assert_eq!(for_limit(5, Number::Integer(1), 1), None);
    }
}
