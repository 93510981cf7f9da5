use log::info;
use serde::Serialize;
use std::fmt;
use std::mem;

use crate::value::{LuaString, Number};

/// The different kinds of tokens recognized by the Lua scanner.
///
/// Variants without data represent punctuators and keywords.
/// `STRING` and `NUMBER` carry their decoded literal values.
/// `IDENTIFIER` is used for names.
/// `EOF` marks the end of input.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Serialize)]
pub enum TokenType {
    /// '('
    LEFT_PAREN,

    /// ')'
    RIGHT_PAREN,

    /// '{'
    LEFT_BRACE,

    /// '}'
    RIGHT_BRACE,

    /// '['
    LEFT_BRACKET,

    /// ']'
    RIGHT_BRACKET,

    /// ','
    COMMA,

    /// '.'
    DOT,

    /// '..'
    DOT_DOT,

    /// '...'
    DOT_DOT_DOT,

    /// ':'
    COLON,

    /// '::'
    DOUBLE_COLON,

    /// ';'
    SEMICOLON,

    /// '+'
    PLUS,

    /// '-'
    MINUS,

    /// '*'
    STAR,

    /// '/'
    SLASH,

    /// '//'
    DOUBLE_SLASH,

    /// '%'
    PERCENT,

    /// '^'
    CARET,

    /// '#'
    HASH,

    /// '&'
    AMPERSAND,

    /// '~'
    TILDE,

    /// '|'
    PIPE,

    /// '<<'
    LESS_LESS,

    /// '>>'
    GREATER_GREATER,

    /// '='
    EQUAL,

    /// '=='
    EQUAL_EQUAL,

    /// '~='
    TILDE_EQUAL,

    /// '<'
    LESS,

    /// '<='
    LESS_EQUAL,

    /// '>'
    GREATER,

    /// '>='
    GREATER_EQUAL,

    /// A name that is not a keyword
    IDENTIFIER,

    /// A string literal, escapes already decoded
    STRING(LuaString),

    /// A numeric literal
    NUMBER(Number),

    AND,
    BREAK,
    DO,
    ELSE,
    ELSEIF,
    END,
    FALSE,
    FOR,
    FUNCTION,
    GOTO,
    IF,
    IN,
    LOCAL,
    NIL,
    NOT,
    OR,
    REPEAT,
    RETURN,
    THEN,
    TRUE,
    UNTIL,
    WHILE,

    /// End‑of‑file marker
    EOF,
}

impl TokenType {
    /// Variant name without payload, as printed by `tokenize`.
    pub fn name(&self) -> &'static str {
        match self {
            TokenType::LEFT_PAREN => "LEFT_PAREN",
            TokenType::RIGHT_PAREN => "RIGHT_PAREN",
            TokenType::LEFT_BRACE => "LEFT_BRACE",
            TokenType::RIGHT_BRACE => "RIGHT_BRACE",
            TokenType::LEFT_BRACKET => "LEFT_BRACKET",
            TokenType::RIGHT_BRACKET => "RIGHT_BRACKET",
            TokenType::COMMA => "COMMA",
            TokenType::DOT => "DOT",
            TokenType::DOT_DOT => "DOT_DOT",
            TokenType::DOT_DOT_DOT => "DOT_DOT_DOT",
            TokenType::COLON => "COLON",
            TokenType::DOUBLE_COLON => "DOUBLE_COLON",
            TokenType::SEMICOLON => "SEMICOLON",
            TokenType::PLUS => "PLUS",
            TokenType::MINUS => "MINUS",
            TokenType::STAR => "STAR",
            TokenType::SLASH => "SLASH",
            TokenType::DOUBLE_SLASH => "DOUBLE_SLASH",
            TokenType::PERCENT => "PERCENT",
            TokenType::CARET => "CARET",
            TokenType::HASH => "HASH",
            TokenType::AMPERSAND => "AMPERSAND",
            TokenType::TILDE => "TILDE",
            TokenType::PIPE => "PIPE",
            TokenType::LESS_LESS => "LESS_LESS",
            TokenType::GREATER_GREATER => "GREATER_GREATER",
            TokenType::EQUAL => "EQUAL",
            TokenType::EQUAL_EQUAL => "EQUAL_EQUAL",
            TokenType::TILDE_EQUAL => "TILDE_EQUAL",
            TokenType::LESS => "LESS",
            TokenType::LESS_EQUAL => "LESS_EQUAL",
            TokenType::GREATER => "GREATER",
            TokenType::GREATER_EQUAL => "GREATER_EQUAL",
            TokenType::IDENTIFIER => "IDENTIFIER",
            TokenType::STRING(_) => "STRING",
            TokenType::NUMBER(_) => "NUMBER",
            TokenType::AND => "AND",
            TokenType::BREAK => "BREAK",
            TokenType::DO => "DO",
            TokenType::ELSE => "ELSE",
            TokenType::ELSEIF => "ELSEIF",
            TokenType::END => "END",
            TokenType::FALSE => "FALSE",
            TokenType::FOR => "FOR",
            TokenType::FUNCTION => "FUNCTION",
            TokenType::GOTO => "GOTO",
            TokenType::IF => "IF",
            TokenType::IN => "IN",
            TokenType::LOCAL => "LOCAL",
            TokenType::NIL => "NIL",
            TokenType::NOT => "NOT",
            TokenType::OR => "OR",
            TokenType::REPEAT => "REPEAT",
            TokenType::RETURN => "RETURN",
            TokenType::THEN => "THEN",
            TokenType::TRUE => "TRUE",
            TokenType::UNTIL => "UNTIL",
            TokenType::WHILE => "WHILE",
            TokenType::EOF => "EOF",
        }
    }
}

impl PartialEq for TokenType {
    /// Two TokenTypes are equal if they share the same variant
    /// (ignoring any inner data).
    fn eq(&self, other: &Self) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }
}

/// A scanned token, including its type, the original lexeme,
/// and the line number where it was found.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Token<'a> {
    /// The category of this token.
    pub token_type: TokenType,

    /// The exact substring from the source that produced this token.
    pub lexeme: &'a str,

    /// 1‑based line number in the source.
    pub line: usize,
}

impl<'a> Token<'a> {
    pub fn new(token_type: TokenType, lexeme: &'a str, line: usize) -> Self {
        info!(
            "Creating new token: type={:?}, lexeme={}, line={}",
            token_type, lexeme, line
        );

        Self {
            token_type,
            lexeme,
            line,
        }
    }
}

impl<'a> fmt::Display for Token<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = self.token_type.name();

        match &self.token_type {
            TokenType::STRING(s) => write!(f, "{} {} {}", variant, self.lexeme, s),
            TokenType::NUMBER(n) => write!(f, "{} {} {}", variant, self.lexeme, n),
            _ => write!(f, "{} {} null", variant, self.lexeme),
        }
    }
}
