//! Expression evaluation.
//!
//! [`Interpreter::eval`] always yields exactly one value; calls and `...`
//! yield their full result lists through [`Interpreter::eval_multi`], and
//! [`Interpreter::eval_list`] expands only the last expression of a list.

use std::rc::Rc;

use log::trace;

use crate::arith::ArithOp;
use crate::ast::{BinaryOperator, Expr, Field, FuncBody, UnaryOperator};
use crate::environment::Scope;
use crate::error::Result;
use crate::multires;
use crate::stack::ensure_sufficient_stack;
use crate::value::{FunctionRef, LuaString, TableRef, Value};

use super::{no_info, Interpreter};

/// Lua-style description of the variable an expression reads, used in
/// error messages: `" (global 'x')"`, `" (field 'y')"`, ...
pub(crate) fn variable_info(expr: &Expr, scope: &Scope) -> String {
    match expr {
        Expr::VarName { name, .. } => {
            let kind = scope.binding_kind(name.as_bytes()).unwrap_or("global");
            format!(" ({} '{}')", kind, name)
        }
        Expr::VarIndex { index, .. } => match index.as_ref() {
            Expr::String(key) => format!(" (field '{}')", key),
            _ => String::new(),
        },
        Expr::String(s) => format!(" (constant '{}')", s),
        _ => String::new(),
    }
}

impl Interpreter {
    /// Evaluate to a single value, truncating multi-results.
    pub(crate) fn eval(&mut self, expr: &Expr, scope: &Scope) -> Result<Value> {
        ensure_sufficient_stack(|| self.eval_expr(expr, scope))
    }

    fn eval_expr(&mut self, expr: &Expr, scope: &Scope) -> Result<Value> {
        trace!("Evaluating expression at line {:?}", expr.line());

        match expr {
            Expr::Nil => Ok(Value::Nil),
            Expr::True => Ok(Value::Boolean(true)),
            Expr::False => Ok(Value::Boolean(false)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::String(s) => Ok(Value::String(s.clone())),
            Expr::Vararg => Ok(multires::first(scope.varargs())),

            Expr::FunctionDef(body) => Ok(self.make_closure(body, scope)),

            Expr::TableConstructor { fields, line } => self.eval_table(fields, *line, scope),

            Expr::BinaryOp { op, lhs, rhs, line } => self.eval_binary(*op, lhs, rhs, *line, scope),

            Expr::UnaryOp { op, operand, line } => {
                let value = self.eval(operand, scope)?;
                let info = |_: usize| variable_info(operand, scope);
                let line = Some(*line);
                match op {
                    UnaryOperator::Not => Ok(Value::Boolean(!value.is_truthy())),
                    UnaryOperator::Neg => self.arith_values(ArithOp::Unm, value.clone(), value, line, &info),
                    UnaryOperator::BNot => {
                        self.arith_values(ArithOp::BNot, value.clone(), value, line, &info)
                    }
                    UnaryOperator::Len => self.length(value, line, &info),
                }
            }

            Expr::VarName { name, line } => self.read_variable(name, *line, scope),

            Expr::VarIndex { base, index, line } => {
                let obj = self.eval(base, scope)?;
                let key = self.eval(index, scope)?;
                self.index(obj, key, Some(*line), &|_: usize| variable_info(base, scope))
            }

            Expr::FunctionCall { .. } | Expr::MethodCall { .. } => {
                Ok(multires::first(self.eval_multi(expr, scope)?))
            }

            Expr::Paren(inner) => self.eval(inner, scope),
        }
    }

    /// Evaluate keeping every result of a call or `...`.
    pub(crate) fn eval_multi(&mut self, expr: &Expr, scope: &Scope) -> Result<Vec<Value>> {
        match expr {
            Expr::FunctionCall { callee, args, line } => {
                let func = self.eval(callee, scope)?;
                let args = self.eval_list(args, scope)?;
                self.call_value(func, args, Some(*line), &|_: usize| variable_info(callee, scope))
            }

            Expr::MethodCall {
                object,
                method,
                args,
                line,
            } => {
                let obj = self.eval(object, scope)?;
                let func = self.index(
                    obj.clone(),
                    Value::String(method.clone()),
                    Some(*line),
                    &|_: usize| variable_info(object, scope),
                )?;

                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(obj);
                full.extend(self.eval_list(args, scope)?);
                self.call_value(func, full, Some(*line), &|_: usize| {
                    format!(" (method '{}')", method)
                })
            }

            Expr::Vararg => Ok(scope.varargs()),

            other => Ok(vec![self.eval(other, scope)?]),
        }
    }

    /// Evaluate left to right; only the last expression may expand.
    pub(crate) fn eval_list(&mut self, exprs: &[Expr], scope: &Scope) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(exprs.len());
        if let Some((last, init)) = exprs.split_last() {
            for expr in init {
                values.push(self.eval(expr, scope)?);
            }
            if last.is_multi() {
                values.extend(self.eval_multi(last, scope)?);
            } else {
                values.push(self.eval(last, scope)?);
            }
        }
        Ok(values)
    }

    pub(crate) fn make_closure(&self, body: &Rc<FuncBody>, scope: &Scope) -> Value {
        scope.mark_captured();
        Value::Function(FunctionRef::lua(body.clone(), scope.clone()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Variables
    // ─────────────────────────────────────────────────────────────────────────

    /// Local binding, else `_G[name]` with `__index` honoured.
    pub(crate) fn read_variable(&mut self, name: &LuaString, line: usize, scope: &Scope) -> Result<Value> {
        match scope.lookup_local(name.as_bytes()) {
            Some(variable) => Ok(variable.value),
            None => {
                let globals = Value::Table(scope.globals().clone());
                self.index(globals, Value::String(name.clone()), Some(line), &no_info)
            }
        }
    }

    /// Rebind the owning local, else `_G[name] = value` with `__newindex`.
    pub(crate) fn write_variable(
        &mut self,
        name: &LuaString,
        value: Value,
        line: usize,
        scope: &Scope,
    ) -> Result<()> {
        let assigned = scope
            .assign_local(name.as_bytes(), value.clone())
            .map_err(|_| {
                self.raise(
                    Some(line),
                    format!("attempt to assign to const variable '{}'", name),
                )
            })?;
        if assigned {
            return Ok(());
        }

        let globals = Value::Table(scope.globals().clone());
        self.set_index(globals, Value::String(name.clone()), value, Some(line), &no_info)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operators and constructors
    // ─────────────────────────────────────────────────────────────────────────

    fn eval_binary(
        &mut self,
        op: BinaryOperator,
        lhs: &Expr,
        rhs: &Expr,
        line: usize,
        scope: &Scope,
    ) -> Result<Value> {
        match op {
            BinaryOperator::And => {
                let left = self.eval(lhs, scope)?;
                return if left.is_truthy() { self.eval(rhs, scope) } else { Ok(left) };
            }
            BinaryOperator::Or => {
                let left = self.eval(lhs, scope)?;
                return if left.is_truthy() { Ok(left) } else { self.eval(rhs, scope) };
            }
            _ => {}
        }

        let a = self.eval(lhs, scope)?;
        let b = self.eval(rhs, scope)?;
        let line = Some(line);
        let info = |i: usize| variable_info(if i == 0 { lhs } else { rhs }, scope);

        let result = match op {
            BinaryOperator::Eq => Value::Boolean(self.values_equal(&a, &b, line)?),
            BinaryOperator::Ne => Value::Boolean(!self.values_equal(&a, &b, line)?),
            BinaryOperator::Lt => Value::Boolean(self.less_than(&a, &b, line)?),
            BinaryOperator::Le => Value::Boolean(self.less_equal(&a, &b, line)?),
            BinaryOperator::Gt => Value::Boolean(self.less_than(&b, &a, line)?),
            BinaryOperator::Ge => Value::Boolean(self.less_equal(&b, &a, line)?),
            BinaryOperator::Concat => self.concat_values(a, b, line, &info)?,
            other => match other.arith_op() {
                Some(aop) => self.arith_values(aop, a, b, line, &info)?,
                None => {
                    return Err(self.raise(
                        line,
                        format!("unexpected operator '{}'", other.symbol()),
                    ))
                }
            },
        };
        Ok(result)
    }

    /// `{ ... }`. Positional items are stored after keyed ones, so
    /// `{[1] = "k", "p"}` keeps `"p"`.
    fn eval_table(&mut self, fields: &[Field], line: usize, scope: &Scope) -> Result<Value> {
        let table = TableRef::new();
        let mut positional = Vec::new();

        for (i, field) in fields.iter().enumerate() {
            match field {
                Field::Positional(expr) if i + 1 == fields.len() && expr.is_multi() => {
                    positional.extend(self.eval_multi(expr, scope)?);
                }
                Field::Positional(expr) => positional.push(self.eval(expr, scope)?),
                Field::Keyed { key, value } => {
                    let key = self.eval(key, scope)?;
                    let value = self.eval(value, scope)?;
                    let stored = table.borrow_mut().put(key, value);
                    stored.map_err(|e| self.raise(Some(line), e.to_string()))?;
                }
            }
        }

        let mut t = table.borrow_mut();
        for (i, value) in positional.into_iter().enumerate() {
            t.set_int(i as i64 + 1, value);
        }
        drop(t);

        Ok(Value::Table(table))
    }
}
