/*!
Recursive-descent parser for Lua 5.4.

Statements are parsed by straightforward recursive descent; expressions use
precedence climbing with Lua's left/right priority table, which gives the
right associativity of `..` and `^` for free.

### Logging Policy

| Location                     | Level  | Purpose                                   |
|------------------------------|--------|-------------------------------------------|
| `Parser::new`, `parse_chunk` | `info` | Lifecycle milestones.                     |
| `statement`                  | `debug`| High‑level descent into grammar branches. |
| Error paths (`consume`, etc.)| `debug`| Context before returning structured error.|

--------------------------------------------------------------------------------
Grammar (EBNF, condensed from the Lua 5.4 reference manual)
--------------------------------------------------------

```text
chunk      → block EOF ;
block      → stat* retstat? ;
stat       → ";" | varlist "=" explist | functioncall | label | "break"
           | "goto" NAME | "do" block "end" | "while" exp "do" block "end"
           | "repeat" block "until" exp
           | "if" exp "then" block ("elseif" exp "then" block)* ("else" block)? "end"
           | "for" NAME "=" exp "," exp ("," exp)? "do" block "end"
           | "for" namelist "in" explist "do" block "end"
           | "function" funcname funcbody | "local" "function" NAME funcbody
           | "local" attnamelist ("=" explist)? ;
attnamelist→ NAME attrib ("," NAME attrib)* ;
attrib     → ("<" NAME ">")? ;
retstat    → "return" explist? ";"? ;
label      → "::" NAME "::" ;
funcname   → NAME ("." NAME)* (":" NAME)? ;
exp        → unop exp | simpleexp (binop exp)* ;
simpleexp  → NUMBER | STRING | "nil" | "true" | "false" | "..."
           | constructor | "function" funcbody | suffixedexp ;
suffixedexp→ primaryexp ( "." NAME | "[" exp "]" | ":" NAME args | args )* ;
primaryexp → NAME | "(" exp ")" ;
args       → "(" explist? ")" | constructor | STRING ;
funcbody   → "(" parlist? ")" block "end" ;
constructor→ "{" (field (fieldsep field)* fieldsep?)? "}" ;
field      → "[" exp "]" "=" exp | NAME "=" exp | exp ;
```
*/

use std::rc::Rc;

use crate::ast::{
    AttribName, BinaryOperator, Block, Chunk, Expr, Field, FuncBody, FuncName, ReturnStatement,
    Stmt, UnaryOperator,
};
use crate::error::{LuaError, Result};
use crate::scanner::Scanner;
use crate::token::{Token, TokenType};
use crate::value::LuaString;

use log::{debug, info};

/// Nesting of blocks and expressions allowed before giving up.
const MAX_SYNTAX_LEVELS: usize = 200;

/// Priority of unary operators: binds tighter than everything but `^`.
const UNARY_PRIORITY: u8 = 12;

static EOF_TOKEN: Token<'static> = Token {
    token_type: TokenType::EOF,
    lexeme: "",
    line: 0,
};

/// Scan and parse `source` into a chunk named `chunk_name`.
pub fn parse_chunk<S: AsRef<[u8]> + ?Sized>(source: &S, chunk_name: &str) -> Result<Chunk> {
    info!("Parsing chunk '{}'", chunk_name);

    let tokens = Scanner::from_bytes(source.as_ref()).collect::<Result<Vec<_>>>()?;
    Parser::new(&tokens, chunk_name).parse()
}

/// Parser over an immutable slice of tokens ending in `EOF`.
pub struct Parser<'a> {
    tokens: &'a [Token<'a>],
    current: usize,
    chunk: Rc<str>,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token<'a>], chunk_name: &str) -> Self {
        info!("Parser created with {} tokens", tokens.len());

        Self {
            tokens,
            current: 0,
            chunk: Rc::from(chunk_name),
            depth: 0,
        }
    }

    // ───────────────────────── public API ─────────────────────────

    /// Parse an entire chunk.
    pub fn parse(&mut self) -> Result<Chunk> {
        info!("Beginning parse phase");

        let block = self.block()?;
        if !self.is_at_end() {
            return Err(self.error_near("'<eof>' expected"));
        }

        Ok(Chunk {
            name: self.chunk.clone(),
            block,
        })
    }

    /// Parse a comma-separated expression list that must span the input.
    pub fn parse_expression_list(&mut self) -> Result<Vec<Expr>> {
        let exprs = self.expression_list()?;
        if !self.is_at_end() {
            return Err(self.error_near("'<eof>' expected"));
        }
        Ok(exprs)
    }

    // ──────────────────────── blocks & statements ───────────────────

    fn block_follow(&self) -> bool {
        matches!(
            self.peek().token_type,
            TokenType::EOF
                | TokenType::END
                | TokenType::ELSE
                | TokenType::ELSEIF
                | TokenType::UNTIL
        )
    }

    fn block(&mut self) -> Result<Block> {
        self.enter_level()?;

        let mut block = Block::default();
        while !self.block_follow() {
            if self.check(TokenType::RETURN) {
                block.ret = Some(self.return_statement()?);
                break;
            }
            if let Some(stmt) = self.statement()? {
                block.statements.push(stmt);
            }
        }

        self.leave_level();
        Ok(block)
    }

    fn return_statement(&mut self) -> Result<ReturnStatement> {
        let line = self.advance().line;

        let values = if self.block_follow() || self.check(TokenType::SEMICOLON) {
            Vec::new()
        } else {
            self.expression_list()?
        };
        self.matches(TokenType::SEMICOLON);

        if !self.block_follow() {
            return Err(self.error_near("'<eof>' expected"));
        }

        Ok(ReturnStatement { values, line })
    }

    /// One statement; `None` for an empty `;`.
    fn statement(&mut self) -> Result<Option<Stmt>> {
        let token = self.peek();
        let line = token.line;

        debug!("Entering statement at line {} ({})", line, token.token_type.name());

        let stmt = match token.token_type {
            TokenType::SEMICOLON => {
                self.advance();
                return Ok(None);
            }
            TokenType::IF => self.if_statement()?,
            TokenType::WHILE => {
                self.advance();
                let condition = self.expression()?;
                self.consume(TokenType::DO, "'do' expected")?;
                let body = self.block()?;
                self.consume_closing(TokenType::END, "end", TokenType::WHILE, line)?;
                Stmt::While {
                    condition,
                    body,
                    line,
                }
            }
            TokenType::DO => {
                self.advance();
                let body = self.block()?;
                self.consume_closing(TokenType::END, "end", TokenType::DO, line)?;
                Stmt::Do(body)
            }
            TokenType::FOR => self.for_statement()?,
            TokenType::REPEAT => {
                self.advance();
                let body = self.block()?;
                self.consume_closing(TokenType::UNTIL, "until", TokenType::REPEAT, line)?;
                let condition = self.expression()?;
                Stmt::Repeat {
                    body,
                    condition,
                    line,
                }
            }
            TokenType::FUNCTION => self.function_statement()?,
            TokenType::LOCAL => {
                self.advance();
                if self.matches(TokenType::FUNCTION) {
                    let name = self.name()?;
                    let body = self.function_body(line, Some(name.to_string()), false)?;
                    Stmt::LocalFunctionDecl { name, body, line }
                } else {
                    self.local_statement(line)?
                }
            }
            TokenType::DOUBLE_COLON => {
                self.advance();
                let name = self.name()?;
                self.consume(TokenType::DOUBLE_COLON, "'::' expected")?;
                Stmt::Label { name, line }
            }
            TokenType::BREAK => {
                self.advance();
                Stmt::Break { line }
            }
            TokenType::GOTO => {
                self.advance();
                let label = self.name()?;
                Stmt::Goto { label, line }
            }
            _ => self.expression_statement()?,
        };

        Ok(Some(stmt))
    }

    fn if_statement(&mut self) -> Result<Stmt> {
        let line = self.advance().line;

        let mut branches = Vec::new();
        let condition = self.expression()?;
        self.consume(TokenType::THEN, "'then' expected")?;
        branches.push((condition, self.block()?));

        let mut else_block = None;
        loop {
            if self.matches(TokenType::ELSEIF) {
                let condition = self.expression()?;
                self.consume(TokenType::THEN, "'then' expected")?;
                branches.push((condition, self.block()?));
            } else if self.matches(TokenType::ELSE) {
                else_block = Some(self.block()?);
                self.consume_closing(TokenType::END, "end", TokenType::IF, line)?;
                break;
            } else {
                self.consume_closing(TokenType::END, "end", TokenType::IF, line)?;
                break;
            }
        }

        Ok(Stmt::If {
            branches,
            else_block,
            line,
        })
    }

    fn for_statement(&mut self) -> Result<Stmt> {
        let line = self.advance().line;
        let first = self.name()?;

        if self.matches(TokenType::EQUAL) {
            let start = self.expression()?;
            self.consume(TokenType::COMMA, "',' expected")?;
            let stop = self.expression()?;
            let step = if self.matches(TokenType::COMMA) {
                Some(self.expression()?)
            } else {
                None
            };
            self.consume(TokenType::DO, "'do' expected")?;
            let body = self.block()?;
            self.consume_closing(TokenType::END, "end", TokenType::FOR, line)?;

            return Ok(Stmt::For {
                var: first,
                start,
                stop,
                step,
                body,
                line,
            });
        }

        if !self.check(TokenType::COMMA) && !self.check(TokenType::IN) {
            return Err(self.error_near("'=' or 'in' expected"));
        }

        let mut names = vec![first];
        while self.matches(TokenType::COMMA) {
            names.push(self.name()?);
        }
        self.consume(TokenType::IN, "'in' expected")?;
        let exprs = self.expression_list()?;
        self.consume(TokenType::DO, "'do' expected")?;
        let body = self.block()?;
        self.consume_closing(TokenType::END, "end", TokenType::FOR, line)?;

        Ok(Stmt::ForIn {
            names,
            exprs,
            body,
            line,
        })
    }

    fn function_statement(&mut self) -> Result<Stmt> {
        let line = self.advance().line;

        let mut names = vec![self.name()?];
        while self.matches(TokenType::DOT) {
            names.push(self.name()?);
        }
        let method = if self.matches(TokenType::COLON) {
            Some(self.name()?)
        } else {
            None
        };

        let mut full = names
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(".");
        if let Some(m) = &method {
            full.push(':');
            full.push_str(&m.to_string());
        }

        let body = self.function_body(line, Some(full), method.is_some())?;
        Ok(Stmt::FunctionDecl {
            name: FuncName { names, method },
            body,
            line,
        })
    }

    fn local_statement(&mut self, line: usize) -> Result<Stmt> {
        let mut names = Vec::new();
        loop {
            let name = self.name()?;
            let attrib = if self.matches(TokenType::LESS) {
                let attrib = self.name()?;
                self.consume(TokenType::GREATER, "'>' expected")?;
                Some(attrib)
            } else {
                None
            };
            names.push(AttribName { name, attrib });

            if !self.matches(TokenType::COMMA) {
                break;
            }
        }

        let values = if self.matches(TokenType::EQUAL) {
            self.expression_list()?
        } else {
            Vec::new()
        };

        Ok(Stmt::LocalAssignment {
            names,
            values,
            line,
        })
    }

    fn expression_statement(&mut self) -> Result<Stmt> {
        let line = self.peek().line;
        let first = self.suffixed_expression()?;

        if self.check(TokenType::EQUAL) || self.check(TokenType::COMMA) {
            let mut targets = vec![first];
            while self.matches(TokenType::COMMA) {
                targets.push(self.suffixed_expression()?);
            }
            if targets
                .iter()
                .any(|t| !matches!(t, Expr::VarName { .. } | Expr::VarIndex { .. }))
            {
                return Err(self.error_near("syntax error"));
            }
            self.consume(TokenType::EQUAL, "'=' expected")?;
            let values = self.expression_list()?;

            return Ok(Stmt::Assignment {
                targets,
                values,
                line,
            });
        }

        match first {
            Expr::FunctionCall { .. } | Expr::MethodCall { .. } => {
                Ok(Stmt::ExpressionStatement(first))
            }
            _ => Err(self.error_near("syntax error")),
        }
    }

    /// Parameter list and body after the function name. `method` adds the
    /// implicit `self` parameter.
    fn function_body(&mut self, line: usize, name: Option<String>, method: bool) -> Result<Rc<FuncBody>> {
        self.consume(TokenType::LEFT_PAREN, "'(' expected")?;

        let mut params = Vec::new();
        if method {
            params.push(LuaString::from("self"));
        }
        let mut variadic = false;

        if !self.check(TokenType::RIGHT_PAREN) {
            loop {
                if self.matches(TokenType::DOT_DOT_DOT) {
                    variadic = true;
                    break;
                }
                if !self.check(TokenType::IDENTIFIER) {
                    return Err(self.error_near("<name> expected"));
                }
                params.push(self.name()?);
                if !self.matches(TokenType::COMMA) {
                    break;
                }
            }
        }
        self.consume(TokenType::RIGHT_PAREN, "')' expected")?;

        let body = self.block()?;
        self.consume_closing(TokenType::END, "end", TokenType::FUNCTION, line)?;

        Ok(Rc::new(FuncBody {
            params,
            variadic,
            body,
            line,
            name,
            chunk: self.chunk.clone(),
        }))
    }

    // ─────────────────────── expression rules ─────────────────────

    fn expression_list(&mut self) -> Result<Vec<Expr>> {
        let mut exprs = vec![self.expression()?];
        while self.matches(TokenType::COMMA) {
            exprs.push(self.expression()?);
        }
        Ok(exprs)
    }

    fn expression(&mut self) -> Result<Expr> {
        self.sub_expression(0)
    }

    /// Precedence climbing: parse operators whose left priority exceeds
    /// `limit`.
    fn sub_expression(&mut self, limit: u8) -> Result<Expr> {
        self.enter_level()?;

        let mut expr = match unary_operator(&self.peek().token_type) {
            Some(op) => {
                let line = self.advance().line;
                let operand = self.sub_expression(UNARY_PRIORITY)?;
                Expr::UnaryOp {
                    op,
                    operand: Box::new(operand),
                    line,
                }
            }
            None => self.simple_expression()?,
        };

        while let Some((op, left, right)) = binary_operator(&self.peek().token_type) {
            if left <= limit {
                break;
            }
            let line = self.advance().line;
            let rhs = self.sub_expression(right)?;
            expr = Expr::BinaryOp {
                op,
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
                line,
            };
        }

        self.leave_level();
        Ok(expr)
    }

    fn simple_expression(&mut self) -> Result<Expr> {
        let token = self.peek();

        let expr = match &token.token_type {
            TokenType::NUMBER(n) => Expr::Number(*n),
            TokenType::STRING(s) => Expr::String(s.clone()),
            TokenType::NIL => Expr::Nil,
            TokenType::TRUE => Expr::True,
            TokenType::FALSE => Expr::False,
            TokenType::DOT_DOT_DOT => Expr::Vararg,
            TokenType::LEFT_BRACE => return self.table_constructor(),
            TokenType::FUNCTION => {
                let line = self.advance().line;
                return Ok(Expr::FunctionDef(self.function_body(line, None, false)?));
            }
            _ => return self.suffixed_expression(),
        };

        self.advance();
        Ok(expr)
    }

    fn primary_expression(&mut self) -> Result<Expr> {
        let token = self.peek();

        match token.token_type {
            TokenType::IDENTIFIER => {
                let line = token.line;
                let name = self.name()?;
                Ok(Expr::VarName { name, line })
            }
            TokenType::LEFT_PAREN => {
                let line = self.advance().line;
                let inner = self.expression()?;
                self.consume_closing(TokenType::RIGHT_PAREN, ")", TokenType::LEFT_PAREN, line)?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            _ => Err(self.error_near("unexpected symbol")),
        }
    }

    fn suffixed_expression(&mut self) -> Result<Expr> {
        let mut expr = self.primary_expression()?;

        loop {
            let line = self.peek().line;
            expr = match self.peek().token_type {
                TokenType::DOT => {
                    self.advance();
                    let key = self.name()?;
                    Expr::VarIndex {
                        base: Box::new(expr),
                        index: Box::new(Expr::String(key)),
                        line,
                    }
                }
                TokenType::LEFT_BRACKET => {
                    self.advance();
                    let index = self.expression()?;
                    self.consume(TokenType::RIGHT_BRACKET, "']' expected")?;
                    Expr::VarIndex {
                        base: Box::new(expr),
                        index: Box::new(index),
                        line,
                    }
                }
                TokenType::COLON => {
                    self.advance();
                    let method = self.name()?;
                    let args = self.call_arguments()?;
                    Expr::MethodCall {
                        object: Box::new(expr),
                        method,
                        args,
                        line,
                    }
                }
                TokenType::LEFT_PAREN | TokenType::STRING(_) | TokenType::LEFT_BRACE => {
                    let args = self.call_arguments()?;
                    Expr::FunctionCall {
                        callee: Box::new(expr),
                        args,
                        line,
                    }
                }
                _ => return Ok(expr),
            };
        }
    }

    fn call_arguments(&mut self) -> Result<Vec<Expr>> {
        let token = self.peek();

        match &token.token_type {
            TokenType::STRING(s) => {
                let arg = Expr::String(s.clone());
                self.advance();
                Ok(vec![arg])
            }
            TokenType::LEFT_BRACE => Ok(vec![self.table_constructor()?]),
            TokenType::LEFT_PAREN => {
                let line = self.advance().line;
                let args = if self.check(TokenType::RIGHT_PAREN) {
                    Vec::new()
                } else {
                    self.expression_list()?
                };
                self.consume_closing(TokenType::RIGHT_PAREN, ")", TokenType::LEFT_PAREN, line)?;
                Ok(args)
            }
            _ => Err(self.error_near("function arguments expected")),
        }
    }

    fn table_constructor(&mut self) -> Result<Expr> {
        let line = self.consume(TokenType::LEFT_BRACE, "'{' expected")?.line;

        let mut fields = Vec::new();
        while !self.check(TokenType::RIGHT_BRACE) {
            let field = match self.peek().token_type {
                TokenType::IDENTIFIER if self.peek_next_is(TokenType::EQUAL) => {
                    let key = self.name()?;
                    self.advance();
                    Field::Keyed {
                        key: Expr::String(key),
                        value: self.expression()?,
                    }
                }
                TokenType::LEFT_BRACKET => {
                    self.advance();
                    let key = self.expression()?;
                    self.consume(TokenType::RIGHT_BRACKET, "']' expected")?;
                    self.consume(TokenType::EQUAL, "'=' expected")?;
                    Field::Keyed {
                        key,
                        value: self.expression()?,
                    }
                }
                _ => Field::Positional(self.expression()?),
            };
            fields.push(field);

            if !self.matches(TokenType::COMMA) && !self.matches(TokenType::SEMICOLON) {
                break;
            }
        }
        self.consume_closing(TokenType::RIGHT_BRACE, "}", TokenType::LEFT_BRACE, line)?;

        Ok(Expr::TableConstructor { fields, line })
    }

    // ────────────────────── utility helpers ───────────────────────

    fn enter_level(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_SYNTAX_LEVELS {
            return Err(LuaError::parse(
                self.peek().line,
                "chunk has too many syntax levels",
            ));
        }
        Ok(())
    }

    fn leave_level(&mut self) {
        self.depth -= 1;
    }

    fn name(&mut self) -> Result<LuaString> {
        let token = self.consume(TokenType::IDENTIFIER, "<name> expected")?;
        Ok(LuaString::from(token.lexeme))
    }

    /// `message near 'lexeme'`, the way Lua words syntax errors.
    fn error_near(&self, message: &str) -> LuaError {
        let token = self.peek();
        let near = match &token.token_type {
            TokenType::EOF => "<eof>".to_string(),
            _ => token.lexeme.to_string(),
        };

        debug!("Parse error at line {}: {} near {}", token.line, message, near);

        LuaError::parse(token.line, format!("{} near '{}'", message, near))
    }

    /// Consume a closing token, mentioning the opener when it is on an
    /// earlier line: `'end' expected (to close 'if' at line 3) near '<eof>'`.
    fn consume_closing(
        &mut self,
        what: TokenType,
        what_text: &str,
        opener: TokenType,
        line: usize,
    ) -> Result<&'a Token<'a>> {
        if self.check(what) {
            return Ok(self.advance());
        }

        let opener_text = match opener {
            TokenType::LEFT_PAREN => "(".to_string(),
            TokenType::LEFT_BRACE => "{".to_string(),
            other => other.name().to_ascii_lowercase(),
        };
        let message = if self.peek().line == line {
            format!("'{}' expected", what_text)
        } else {
            format!(
                "'{}' expected (to close '{}' at line {})",
                what_text, opener_text, line
            )
        };
        Err(self.error_near(&message))
    }

    #[inline(always)]
    fn matches(&mut self, ttype: TokenType) -> bool {
        if self.check(ttype) {
            self.advance();

            return true;
        }

        false
    }

    #[inline(always)]
    fn consume(&mut self, ttype: TokenType, message: &str) -> Result<&'a Token<'a>> {
        if self.check(ttype) {
            return Ok(self.advance());
        }

        Err(self.error_near(message))
    }

    #[inline(always)]
    fn check(&self, ttype: TokenType) -> bool {
        self.peek().token_type == ttype
    }

    fn peek_next_is(&self, ttype: TokenType) -> bool {
        self.tokens
            .get(self.current + 1)
            .map_or(false, |t| t.token_type == ttype)
    }

    #[inline(always)]
    fn advance(&mut self) -> &'a Token<'a> {
        let token = self.peek();
        if !self.is_at_end() {
            self.current += 1;
        }

        token
    }

    #[inline(always)]
    fn is_at_end(&self) -> bool {
        matches!(self.peek().token_type, TokenType::EOF)
    }

    #[inline(always)]
    fn peek(&self) -> &'a Token<'a> {
        self.tokens.get(self.current).unwrap_or(&EOF_TOKEN)
    }
}

fn unary_operator(tt: &TokenType) -> Option<UnaryOperator> {
    Some(match tt {
        TokenType::MINUS => UnaryOperator::Neg,
        TokenType::NOT => UnaryOperator::Not,
        TokenType::HASH => UnaryOperator::Len,
        TokenType::TILDE => UnaryOperator::BNot,
        _ => return None,
    })
}

/// Operator with its left and right priorities.
fn binary_operator(tt: &TokenType) -> Option<(BinaryOperator, u8, u8)> {
    Some(match tt {
        TokenType::OR => (BinaryOperator::Or, 1, 1),
        TokenType::AND => (BinaryOperator::And, 2, 2),
        TokenType::LESS => (BinaryOperator::Lt, 3, 3),
        TokenType::GREATER => (BinaryOperator::Gt, 3, 3),
        TokenType::LESS_EQUAL => (BinaryOperator::Le, 3, 3),
        TokenType::GREATER_EQUAL => (BinaryOperator::Ge, 3, 3),
        TokenType::TILDE_EQUAL => (BinaryOperator::Ne, 3, 3),
        TokenType::EQUAL_EQUAL => (BinaryOperator::Eq, 3, 3),
        TokenType::PIPE => (BinaryOperator::BOr, 4, 4),
        TokenType::TILDE => (BinaryOperator::BXor, 5, 5),
        TokenType::AMPERSAND => (BinaryOperator::BAnd, 6, 6),
        TokenType::LESS_LESS => (BinaryOperator::Shl, 7, 7),
        TokenType::GREATER_GREATER => (BinaryOperator::Shr, 7, 7),
        TokenType::DOT_DOT => (BinaryOperator::Concat, 9, 8),
        TokenType::PLUS => (BinaryOperator::Add, 10, 10),
        TokenType::MINUS => (BinaryOperator::Sub, 10, 10),
        TokenType::STAR => (BinaryOperator::Mul, 11, 11),
        TokenType::SLASH => (BinaryOperator::Div, 11, 11),
        TokenType::DOUBLE_SLASH => (BinaryOperator::IDiv, 11, 11),
        TokenType::PERCENT => (BinaryOperator::Mod, 11, 11),
        TokenType::CARET => (BinaryOperator::Pow, 14, 13),
        _ => return None,
    })
}
