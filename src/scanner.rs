//! Module `scanner` implements a one‑pass, streaming lexer for Lua 5.4.
//!
//! It transforms the source text into a sequence of `Token<'a>`s, skipping
//! whitespace and comments, and emitting exactly one `EOF` token at the end.
//! Designed as a `FusedIterator`, it can be chained safely with other iterator
//! adapters.
//!
//! # Public API
//!
//! - `Scanner::new(src: &'a str) -> Scanner<'a>`
//!   Create a new lexer over the source text.
//!
//! - `Scanner::from_bytes(src: &'a [u8]) -> Scanner<'a>`
//!   Same, over raw bytes. Lua strings are byte strings, so literals may hold
//!   bytes that are not UTF-8.
//!
//! - `impl Iterator for Scanner<'a>`
//!   Yields `Result<Token<'a>, LuaError>` on each `.next()`. After an error the
//!   scanner resumes at the byte following the offending input.
//!
//! # Token Recognition
//!
//! - Punctuators, including the multi-byte `//`, `..`, `...`, `::`, `<<`,
//!   `>>`, `==`, `~=`, `<=`, `>=`.
//! - Short strings (`"..."`, `'...'`) with every Lua escape: `\a \b \f \n \r
//!   \t \v \\ \" \'`, an escaped newline, `\z`, `\xXX`, `\ddd` and `\u{XXX}`.
//! - Long strings `[==[ ... ]==]`; a newline right after the opening bracket
//!   is dropped.
//! - Comments: `--` to end of line (bulk-skipped with `memchr`) and long
//!   comments `--[==[ ... ]==]`.
//! - Numerals are read greedily the way the reference lexer does (hex
//!   digits, `.`, exponent markers with an optional sign) and then validated
//!   by [`crate::numeral::parse_numeral`].
//! - Names are resolved against a perfect‑hash `KEYWORDS` map.

use crate::error::{LuaError, Result};
use crate::numeral::parse_numeral;
use crate::token::{Token, TokenType};
use crate::value::LuaString;
use log::{debug, info};
use memchr::memchr;
use phf::phf_map;
use std::iter::FusedIterator;

// ─────────────────────────────────────────────────────────────────────────────
// Static keyword map (compile‑time perfect hash)
// ─────────────────────────────────────────────────────────────────────────────

static KEYWORDS: phf::Map<&'static [u8], TokenType> = phf_map! {
    b"and"      => TokenType::AND,
    b"break"    => TokenType::BREAK,
    b"do"       => TokenType::DO,
    b"else"     => TokenType::ELSE,
    b"elseif"   => TokenType::ELSEIF,
    b"end"      => TokenType::END,
    b"false"    => TokenType::FALSE,
    b"for"      => TokenType::FOR,
    b"function" => TokenType::FUNCTION,
    b"goto"     => TokenType::GOTO,
    b"if"       => TokenType::IF,
    b"in"       => TokenType::IN,
    b"local"    => TokenType::LOCAL,
    b"nil"      => TokenType::NIL,
    b"not"      => TokenType::NOT,
    b"or"       => TokenType::OR,
    b"repeat"   => TokenType::REPEAT,
    b"return"   => TokenType::RETURN,
    b"then"     => TokenType::THEN,
    b"true"     => TokenType::TRUE,
    b"until"    => TokenType::UNTIL,
    b"while"    => TokenType::WHILE,
};

/// Single pass lexer. The lifetime `'a` ties every emitted token’s `lexeme`
/// slice back to the original source.
pub struct Scanner<'a> {
    src: &'a [u8],              // entire source
    start: usize,               // index of the *first* byte of the current lexeme
    curr: usize,                // index *one past* the last byte examined
    line: usize,                // 1‑based line counter
    pending: Option<TokenType>, // recognised token kind waiting to be emitted
}

impl<'a> Scanner<'a> {
    #[inline]
    pub fn new(text: &'a str) -> Self {
        Self::from_bytes(text.as_bytes())
    }

    pub fn from_bytes(src: &'a [u8]) -> Self {
        info!("Scanner created over {} bytes", src.len());

        Self {
            src,
            start: 0,
            curr: 0,
            line: 1,
            pending: None,
        }
    }

    // ───────────────────────────── primitive helpers ────────────────────────

    #[inline(always)]
    const fn len(&self) -> usize {
        self.src.len()
    }

    #[inline(always)]
    fn is_at_end(&self) -> bool {
        self.curr >= self.len()
    }

    /// Advance one byte and return it. Callers guard with [`Self::is_at_end`].
    #[inline(always)]
    fn advance(&mut self) -> u8 {
        let b = self.src[self.curr];
        self.curr += 1;
        b
    }

    /// Current byte, `0` past EOF.
    #[inline(always)]
    fn peek(&self) -> u8 {
        if self.is_at_end() {
            0
        } else {
            self.src[self.curr]
        }
    }

    #[inline(always)]
    fn peek_next(&self) -> u8 {
        if self.curr + 1 >= self.len() {
            0
        } else {
            self.src[self.curr + 1]
        }
    }

    #[inline(always)]
    fn match_byte(&mut self, expected: u8) -> bool {
        if !self.is_at_end() && self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Consume a line break (`\n`, `\r`, `\r\n` or `\n\r`) at `curr`.
    fn newline(&mut self) {
        let first = self.advance();
        let second = self.peek();
        if (second == b'\n' || second == b'\r') && second != first {
            self.advance();
        }
        self.line += 1;
    }

    fn error<S: Into<String>>(&self, msg: S) -> LuaError {
        LuaError::lex(self.line, msg)
    }

    // ───────────────────────────── core lexing ─────────────────────────────

    /// Scan a *single* token starting at `self.curr`. Whitespace and comments
    /// return `Ok(())` with `pending = None`.
    fn scan_token(&mut self) -> Result<()> {
        let b = self.peek();

        if b == b'\n' || b == b'\r' {
            self.newline();
            return Ok(());
        }

        self.advance();

        let tt = match b {
            b' ' | b'\t' | b'\x0b' | b'\x0c' => return Ok(()),

            b'-' => {
                if self.match_byte(b'-') {
                    return self.skip_comment();
                }
                TokenType::MINUS
            }

            b'(' => TokenType::LEFT_PAREN,
            b')' => TokenType::RIGHT_PAREN,
            b'{' => TokenType::LEFT_BRACE,
            b'}' => TokenType::RIGHT_BRACE,
            b']' => TokenType::RIGHT_BRACKET,
            b';' => TokenType::SEMICOLON,
            b',' => TokenType::COMMA,
            b'+' => TokenType::PLUS,
            b'*' => TokenType::STAR,
            b'%' => TokenType::PERCENT,
            b'^' => TokenType::CARET,
            b'#' => TokenType::HASH,
            b'&' => TokenType::AMPERSAND,
            b'|' => TokenType::PIPE,

            b'[' => {
                if self.peek() == b'[' || self.peek() == b'=' {
                    return self.long_string_token();
                }
                TokenType::LEFT_BRACKET
            }

            b'/' if self.match_byte(b'/') => TokenType::DOUBLE_SLASH,
            b'/' => TokenType::SLASH,
            b':' if self.match_byte(b':') => TokenType::DOUBLE_COLON,
            b':' => TokenType::COLON,
            b'=' if self.match_byte(b'=') => TokenType::EQUAL_EQUAL,
            b'=' => TokenType::EQUAL,
            b'~' if self.match_byte(b'=') => TokenType::TILDE_EQUAL,
            b'~' => TokenType::TILDE,

            b'<' => {
                if self.match_byte(b'<') {
                    TokenType::LESS_LESS
                } else if self.match_byte(b'=') {
                    TokenType::LESS_EQUAL
                } else {
                    TokenType::LESS
                }
            }

            b'>' => {
                if self.match_byte(b'>') {
                    TokenType::GREATER_GREATER
                } else if self.match_byte(b'=') {
                    TokenType::GREATER_EQUAL
                } else {
                    TokenType::GREATER
                }
            }

            b'.' => {
                if self.match_byte(b'.') {
                    if self.match_byte(b'.') {
                        TokenType::DOT_DOT_DOT
                    } else {
                        TokenType::DOT_DOT
                    }
                } else if self.peek().is_ascii_digit() {
                    return self.number();
                } else {
                    TokenType::DOT
                }
            }

            b'"' | b'\'' => return self.short_string(b),

            b'0'..=b'9' => return self.number(),

            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                self.identifier();
                return Ok(());
            }

            _ => {
                let shown = if b.is_ascii_graphic() {
                    format!("'{}'", b as char)
                } else {
                    format!("'<\\{}>'", b)
                };
                return Err(self.error(format!("unexpected symbol near {}", shown)));
            }
        };

        self.pending = Some(tt);
        Ok(())
    }

    /// After `--`: a long comment if a long bracket follows, else to EOL.
    fn skip_comment(&mut self) -> Result<()> {
        if self.peek() == b'[' {
            let save = self.curr;
            self.advance();
            if let Some(level) = self.bracket_level() {
                self.long_bracket_body(level)
                    .map_err(|_| self.error("unfinished long comment"))?;
                return Ok(());
            }
            self.curr = save;
        }

        // Fast‑forward to the next line break; the main loop counts it.
        match memchr(b'\n', &self.src[self.curr..]) {
            Some(pos) => self.curr += pos,
            None => self.curr = self.len(),
        }
        Ok(())
    }

    /// With `curr` just past a `[`, count `=` signs and consume the second
    /// `[`. Returns `None` (consuming nothing useful) if it is not a long
    /// bracket opener.
    fn bracket_level(&mut self) -> Option<usize> {
        let mut level = 0;
        while self.peek() == b'=' {
            self.advance();
            level += 1;
        }
        if self.match_byte(b'[') {
            Some(level)
        } else {
            None
        }
    }

    /// Read up to the matching closing bracket; returns the raw contents.
    fn long_bracket_body(&mut self, level: usize) -> std::result::Result<Vec<u8>, ()> {
        if self.peek() == b'\n' || self.peek() == b'\r' {
            self.newline();
        }

        let mut out = Vec::new();
        loop {
            if self.is_at_end() {
                return Err(());
            }
            match self.peek() {
                b']' => {
                    let save = self.curr;
                    self.advance();
                    let mut eq = 0;
                    while self.peek() == b'=' {
                        self.advance();
                        eq += 1;
                    }
                    if eq == level && self.match_byte(b']') {
                        return Ok(out);
                    }
                    out.extend_from_slice(&self.src[save..self.curr]);
                }
                b'\n' | b'\r' => {
                    self.newline();
                    out.push(b'\n');
                }
                _ => out.push(self.advance()),
            }
        }
    }

    fn long_string_token(&mut self) -> Result<()> {
        let Some(level) = self.bracket_level() else {
            return Err(self.error("invalid long string delimiter"));
        };
        let body = self
            .long_bracket_body(level)
            .map_err(|_| self.error("unfinished long string"))?;

        self.pending = Some(TokenType::STRING(LuaString::from(body)));
        Ok(())
    }

    /// Short string delimited by `quote`, which is already consumed.
    fn short_string(&mut self, quote: u8) -> Result<()> {
        let mut out: Vec<u8> = Vec::new();

        loop {
            if self.is_at_end() {
                return Err(self.error("unfinished string"));
            }
            let c = self.peek();
            if c == quote {
                self.advance();
                break;
            }
            match c {
                b'\n' | b'\r' => return Err(self.error("unfinished string")),
                b'\\' => {
                    self.advance();
                    self.escape(&mut out)?;
                }
                _ => out.push(self.advance()),
            }
        }

        self.pending = Some(TokenType::STRING(LuaString::from(out)));
        Ok(())
    }

    /// Decode one escape sequence; the backslash is already consumed.
    fn escape(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if self.is_at_end() {
            return Err(self.error("unfinished string"));
        }

        let c = self.peek();
        let simple = match c {
            b'a' => Some(0x07),
            b'b' => Some(0x08),
            b'f' => Some(0x0c),
            b'n' => Some(b'\n'),
            b'r' => Some(b'\r'),
            b't' => Some(b'\t'),
            b'v' => Some(0x0b),
            b'\\' => Some(b'\\'),
            b'"' => Some(b'"'),
            b'\'' => Some(b'\''),
            _ => None,
        };
        if let Some(byte) = simple {
            self.advance();
            out.push(byte);
            return Ok(());
        }

        match c {
            b'\n' | b'\r' => {
                self.newline();
                out.push(b'\n');
            }
            b'z' => {
                self.advance();
                loop {
                    match self.peek() {
                        b'\n' | b'\r' => self.newline(),
                        b' ' | b'\t' | b'\x0b' | b'\x0c' => {
                            self.advance();
                        }
                        _ => break,
                    }
                }
            }
            b'x' => {
                self.advance();
                let mut value = 0u32;
                for _ in 0..2 {
                    let d = (self.peek() as char)
                        .to_digit(16)
                        .ok_or_else(|| self.error("hexadecimal digit expected"))?;
                    self.advance();
                    value = value * 16 + d;
                }
                out.push(value as u8);
            }
            b'u' => {
                self.advance();
                if !self.match_byte(b'{') {
                    return Err(self.error("missing '{' in \\u{xxxx}"));
                }
                let mut value: u32 = 0;
                let mut digits = 0;
                while let Some(d) = (self.peek() as char).to_digit(16) {
                    self.advance();
                    digits += 1;
                    value = value
                        .checked_mul(16)
                        .and_then(|v| v.checked_add(d))
                        .filter(|v| *v <= 0x7FFF_FFFF)
                        .ok_or_else(|| self.error("UTF-8 value too large"))?;
                }
                if digits == 0 {
                    return Err(self.error("hexadecimal digit expected"));
                }
                if !self.match_byte(b'}') {
                    return Err(self.error("missing '}' in \\u{xxxx}"));
                }
                utf8_encode(value, out);
            }
            b'0'..=b'9' => {
                let mut value: u32 = 0;
                for _ in 0..3 {
                    if !self.peek().is_ascii_digit() {
                        break;
                    }
                    value = value * 10 + (self.advance() - b'0') as u32;
                }
                if value > 255 {
                    return Err(self.error("decimal escape too large"));
                }
                out.push(value as u8);
            }
            _ => return Err(self.error("invalid escape sequence")),
        }
        Ok(())
    }

    /// Greedy numeral read, then validation. `start` is at the first byte.
    fn number(&mut self) -> Result<()> {
        self.curr = self.start;

        let mut exponent = [b'e', b'E'];
        if self.peek() == b'0' && matches!(self.peek_next(), b'x' | b'X') {
            self.curr += 2;
            exponent = [b'p', b'P'];
        }

        loop {
            let c = self.peek();
            if exponent.contains(&c) {
                self.advance();
                if matches!(self.peek(), b'+' | b'-') {
                    self.advance();
                }
            } else if c.is_ascii_hexdigit() || c == b'.' {
                self.advance();
            } else {
                break;
            }
        }
        // A numeral touching a letter is malformed.
        if self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
            self.advance();
        }

        let lexeme = self.lexeme();
        match parse_numeral(lexeme) {
            Some(n) => {
                self.pending = Some(TokenType::NUMBER(n));
                Ok(())
            }
            None => Err(self.error(format!("malformed number near '{}'", lexeme))),
        }
    }

    fn identifier(&mut self) {
        while {
            let c: u8 = self.peek();
            c.is_ascii_alphanumeric() || c == b'_'
        } {
            self.advance();
        }

        let slice: &[u8] = &self.src[self.start..self.curr];

        let tt: TokenType = KEYWORDS
            .get(slice)
            .cloned()
            .unwrap_or(TokenType::IDENTIFIER);

        self.pending = Some(tt);
    }

    /// Source text of the current lexeme. Empty for a string literal that
    /// holds bytes outside UTF-8; its value travels in the token type.
    fn lexeme(&self) -> &'a str {
        let src: &'a [u8] = self.src;
        std::str::from_utf8(&src[self.start..self.curr]).unwrap_or("")
    }
}

/// Extended UTF-8 (up to six bytes), as Lua's `\u{...}` allows.
fn utf8_encode(mut x: u32, out: &mut Vec<u8>) {
    if x < 0x80 {
        out.push(x as u8);
        return;
    }

    let mut buf = [0u8; 6];
    let mut n = 1;
    let mut mfb: u32 = 0x3f; // largest value that fits in the first byte
    loop {
        buf[6 - n] = 0x80 | (x & 0x3f) as u8;
        n += 1;
        x >>= 6;
        mfb >>= 1;
        if x <= mfb {
            break;
        }
    }
    buf[6 - n] = ((!mfb << 1) | x) as u8;
    out.extend_from_slice(&buf[6 - n..]);
}

// ───────────────────────── Iterator implementation ─────────────────────────

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.curr <= self.len() {
            // 1. EOF guard – emit exactly one EOF then terminate.
            if self.curr == self.len() {
                self.curr += 1;
                return Some(Ok(Token::new(TokenType::EOF, "", self.line)));
            }

            // 2. Reset per‑token state.
            self.start = self.curr;
            self.pending = None;

            // 3. Attempt to scan a token.
            if let Err(e) = self.scan_token() {
                return Some(Err(e));
            }

            // 4. If a real token was recognised, build and return it.
            if let Some(tt) = self.pending.take() {
                debug!("Scanned token ({:?}) on line {}", tt, self.line);

                return Some(Ok(Token::new(tt, self.lexeme(), self.line)));
            }
        }

        None
    }
}

impl<'a> FusedIterator for Scanner<'a> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_escape_encoding() {
        let mut out = Vec::new();
        utf8_encode(0xE9, &mut out);
        assert_eq!(out, "é".as_bytes());

        out.clear();
        utf8_encode(0x20AC, &mut out);
        assert_eq!(out, "€".as_bytes());

        out.clear();
        utf8_encode(0x1F600, &mut out);
        assert_eq!(out, "😀".as_bytes());

        out.clear();
        utf8_encode(0x7FFF_FFFF, &mut out);
        assert_eq!(out, vec![0xFD, 0xBF, 0xBF, 0xBF, 0xBF, 0xBF]);
    }
}
