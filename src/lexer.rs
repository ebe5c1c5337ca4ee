//! Tokenizer for C declaration text.
//!
//! The lexer is a lazy, finite iterator over `Result<Token, LexError>`. It strips
//! whitespace and comments, tracks line/column, and stops for good after the first
//! error. `#define FFI_SCOPE` / `#define FFI_LIB` lines are surfaced as directive
//! tokens; any other preprocessor line is rejected.

use crate::ast::NameId;
use crate::source::{SourceLoc, SourceSpan};
use log::trace;
use std::fmt;
use thiserror::Error;

#[cfg(test)]
mod tests_lexer;

/// C token kinds understood by the declaration parser
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenKind {
    // === LITERALS ===
    IntegerConstant(u64),
    FloatConstant(NameId),
    CharacterConstant(i64),
    StringLiteral(NameId),

    // === IDENTIFIERS ===
    Identifier(NameId),

    // === KEYWORDS ===
    // Storage class specifiers
    Typedef,
    Extern,
    Static,
    Auto,
    Register,
    ThreadLocal,

    // Type qualifiers
    Const,
    Volatile,
    Restrict,
    Atomic,

    // Function specifiers
    Inline,
    Noreturn,

    // Type specifiers
    Void,
    Bool,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Signed,
    Unsigned,
    Complex,
    Struct,
    Union,
    Enum,

    // Rejected constructs that still need a dedicated token
    Sizeof,
    Generic,
    Alignas,

    // Extensions
    Attribute,

    // === PUNCTUATORS ===
    Star,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Semicolon,
    Colon,
    Question,
    Ellipsis,
    Dot,
    Arrow,
    Assign,
    Plus,
    Minus,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    LeftShift,
    RightShift,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Equal,
    NotEqual,
    LogicAnd,
    LogicOr,
    Increment,
    Decrement,

    // === DIRECTIVES ===
    Directive(DirectiveKind, NameId),
}

/// Header directives the FFI layer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    /// `#define FFI_SCOPE "name"`
    Scope,
    /// `#define FFI_LIB "path"`
    Lib,
}

impl TokenKind {
    /// Check if the token is a storage class specifier
    pub fn is_storage_class_specifier(&self) -> bool {
        matches!(
            self,
            TokenKind::Typedef
                | TokenKind::Extern
                | TokenKind::Static
                | TokenKind::Auto
                | TokenKind::Register
                | TokenKind::ThreadLocal
        )
    }

    /// Check if the token is a keyword type specifier
    pub fn is_type_specifier(&self) -> bool {
        matches!(
            self,
            TokenKind::Void
                | TokenKind::Bool
                | TokenKind::Char
                | TokenKind::Short
                | TokenKind::Int
                | TokenKind::Long
                | TokenKind::Float
                | TokenKind::Double
                | TokenKind::Signed
                | TokenKind::Unsigned
                | TokenKind::Complex
                | TokenKind::Struct
                | TokenKind::Union
                | TokenKind::Enum
        )
    }

    /// Check if the token is a type qualifier
    pub fn is_type_qualifier(&self) -> bool {
        matches!(
            self,
            TokenKind::Const | TokenKind::Volatile | TokenKind::Restrict | TokenKind::Atomic
        )
    }

    /// Check if the token is a function specifier
    pub fn is_function_specifier(&self) -> bool {
        matches!(self, TokenKind::Inline | TokenKind::Noreturn)
    }

    /// Check if the token can start declaration specifiers, given whether an
    /// identifier at this position names a type.
    pub fn is_declaration_start(&self, is_typedef_name: bool) -> bool {
        self.is_storage_class_specifier()
            || self.is_type_specifier()
            || self.is_type_qualifier()
            || self.is_function_specifier()
            || matches!(self, TokenKind::Attribute | TokenKind::Alignas)
            || (matches!(self, TokenKind::Identifier(_)) && is_typedef_name)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::IntegerConstant(v) => return write!(f, "{v}"),
            TokenKind::FloatConstant(s) => return write!(f, "{s}"),
            TokenKind::CharacterConstant(v) => return write!(f, "character constant {v}"),
            TokenKind::StringLiteral(s) => return write!(f, "\"{s}\""),
            TokenKind::Identifier(s) => return write!(f, "{s}"),
            TokenKind::Directive(kind, value) => {
                let name = match kind {
                    DirectiveKind::Scope => "FFI_SCOPE",
                    DirectiveKind::Lib => "FFI_LIB",
                };
                return write!(f, "#define {name} \"{value}\"");
            }
            TokenKind::Typedef => "typedef",
            TokenKind::Extern => "extern",
            TokenKind::Static => "static",
            TokenKind::Auto => "auto",
            TokenKind::Register => "register",
            TokenKind::ThreadLocal => "_Thread_local",
            TokenKind::Const => "const",
            TokenKind::Volatile => "volatile",
            TokenKind::Restrict => "restrict",
            TokenKind::Atomic => "_Atomic",
            TokenKind::Inline => "inline",
            TokenKind::Noreturn => "_Noreturn",
            TokenKind::Void => "void",
            TokenKind::Bool => "_Bool",
            TokenKind::Char => "char",
            TokenKind::Short => "short",
            TokenKind::Int => "int",
            TokenKind::Long => "long",
            TokenKind::Float => "float",
            TokenKind::Double => "double",
            TokenKind::Signed => "signed",
            TokenKind::Unsigned => "unsigned",
            TokenKind::Complex => "_Complex",
            TokenKind::Struct => "struct",
            TokenKind::Union => "union",
            TokenKind::Enum => "enum",
            TokenKind::Sizeof => "sizeof",
            TokenKind::Generic => "_Generic",
            TokenKind::Alignas => "_Alignas",
            TokenKind::Attribute => "__attribute__",
            TokenKind::Star => "*",
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::LeftBrace => "{",
            TokenKind::RightBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::Question => "?",
            TokenKind::Ellipsis => "...",
            TokenKind::Dot => ".",
            TokenKind::Arrow => "->",
            TokenKind::Assign => "=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Amp => "&",
            TokenKind::Pipe => "|",
            TokenKind::Caret => "^",
            TokenKind::Tilde => "~",
            TokenKind::Bang => "!",
            TokenKind::LeftShift => "<<",
            TokenKind::RightShift => ">>",
            TokenKind::Less => "<",
            TokenKind::Greater => ">",
            TokenKind::LessEqual => "<=",
            TokenKind::GreaterEqual => ">=",
            TokenKind::Equal => "==",
            TokenKind::NotEqual => "!=",
            TokenKind::LogicAnd => "&&",
            TokenKind::LogicOr => "||",
            TokenKind::Increment => "++",
            TokenKind::Decrement => "--",
        };
        f.write_str(text)
    }
}

/// A lexed token. The lexeme is recovered from the unit text through `span`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: SourceSpan,
}

impl Token {
    pub fn new(kind: TokenKind, span: SourceSpan) -> Self {
        Token { kind, span }
    }

    /// Spelling of the token in `source`.
    pub fn lexeme<'s>(&self, source: &'s str) -> &'s str {
        self.span.slice(source)
    }
}

/// Lexical errors. Tokenization of the unit stops at the first one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("unterminated string literal")]
    UnterminatedString { span: SourceSpan },
    #[error("unterminated character constant")]
    UnterminatedChar { span: SourceSpan },
    #[error("unterminated comment")]
    UnterminatedComment { span: SourceSpan },
    #[error("invalid character '{ch}'")]
    InvalidCharacter { ch: char, span: SourceSpan },
    #[error("invalid integer constant '{text}'")]
    InvalidInteger { text: String, span: SourceSpan },
    #[error("unsupported preprocessor directive '{text}'")]
    UnsupportedDirective { text: String, span: SourceSpan },
}

impl LexError {
    pub fn span(&self) -> SourceSpan {
        match self {
            LexError::UnterminatedString { span }
            | LexError::UnterminatedChar { span }
            | LexError::UnterminatedComment { span }
            | LexError::InvalidCharacter { span, .. }
            | LexError::InvalidInteger { span, .. }
            | LexError::UnsupportedDirective { span, .. } => *span,
        }
    }
}

/// Tokenize a whole unit.
pub fn tokenize(text: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(text).collect()
}

/// Lazy tokenizer over one unit of text.
#[derive(Debug, Clone)]
pub struct Lexer<'src> {
    src: &'src str,
    pos: usize,
    line: u32,
    column: u32,
    at_line_start: bool,
    done: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str) -> Self {
        Lexer {
            src,
            pos: 0,
            line: 1,
            column: 1,
            at_line_start: true,
            done: false,
        }
    }

    /// Rewind to the beginning of the text.
    pub fn restart(&mut self) {
        *self = Lexer::new(self.src);
    }

    fn loc(&self) -> SourceLoc {
        SourceLoc::new(self.pos as u32, self.line, self.column)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
            self.at_line_start = true;
        } else {
            self.column += 1;
            if !c.is_whitespace() {
                self.at_line_start = false;
            }
        }
        Some(c)
    }

    fn span_from(&self, start: SourceLoc) -> SourceSpan {
        SourceSpan::new(start, self.loc())
    }

    /// Skip whitespace and comments.
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.loc();
                    let line_start = self.at_line_start;
                    let start_line = self.line;
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => {
                                return Err(LexError::UnterminatedComment {
                                    span: self.span_from(start),
                                });
                            }
                        }
                    }
                    // a comment counts as whitespace for directive detection
                    self.at_line_start = line_start || self.line != start_line;
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex_token(&mut self) -> Result<Option<Token>, LexError> {
        self.skip_trivia()?;
        let start = self.loc();
        let line_start = self.at_line_start;
        let Some(c) = self.bump() else {
            return Ok(None);
        };

        let kind = match c {
            '#' if line_start => return self.lex_directive(start).map(Some),
            c if c.is_ascii_alphabetic() || c == '_' => self.lex_word(start),
            c if c.is_ascii_digit() => self.lex_number(start)?,
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.lex_number(start)?,
            '\'' => self.lex_char(start)?,
            '"' => self.lex_string(start)?,
            _ => self.lex_punct(c, start)?,
        };

        let token = Token::new(kind, self.span_from(start));
        trace!("lexed {:?} at {}", token.kind, start);
        Ok(Some(token))
    }

    fn lex_word(&mut self, start: SourceLoc) -> TokenKind {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let word = &self.src[start.offset as usize..self.pos];
        keyword(word).unwrap_or_else(|| TokenKind::Identifier(NameId::new(word)))
    }

    fn lex_number(&mut self, start: SourceLoc) -> Result<TokenKind, LexError> {
        let mut is_float = self.src[start.offset as usize..].starts_with('.');
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.bump();
            } else if c == '.' {
                is_float = true;
                self.bump();
            } else if (c == '+' || c == '-')
                && is_float_exponent(&self.src[start.offset as usize..self.pos])
            {
                is_float = true;
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.src[start.offset as usize..self.pos];
        let span = self.span_from(start);

        let is_hex = text.starts_with("0x") || text.starts_with("0X");
        if is_float || (!is_hex && (text.contains('e') || text.contains('E'))) {
            return Ok(TokenKind::FloatConstant(NameId::new(text)));
        }

        parse_integer(text)
            .map(TokenKind::IntegerConstant)
            .ok_or_else(|| LexError::InvalidInteger {
                text: text.to_string(),
                span,
            })
    }

    fn lex_escape(&mut self, start: SourceLoc) -> Result<i64, LexError> {
        let unterminated = |lexer: &Self| LexError::UnterminatedChar {
            span: lexer.span_from(start),
        };
        let c = self.bump().ok_or_else(|| unterminated(self))?;
        let value = match c {
            'n' => 10,
            't' => 9,
            'r' => 13,
            'a' => 7,
            'b' => 8,
            'f' => 12,
            'v' => 11,
            '\\' => 92,
            '\'' => 39,
            '"' => 34,
            '?' => 63,
            'x' => {
                let mut value: i64 = 0;
                let mut digits = 0;
                while let Some(d) = self.peek().and_then(|c| c.to_digit(16)) {
                    self.bump();
                    value = value.wrapping_mul(16) + d as i64;
                    digits += 1;
                }
                if digits == 0 {
                    return Err(LexError::InvalidCharacter {
                        ch: 'x',
                        span: self.span_from(start),
                    });
                }
                value
            }
            '0'..='7' => {
                let mut value = c.to_digit(8).unwrap_or(0) as i64;
                for _ in 0..2 {
                    match self.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            self.bump();
                            value = value * 8 + d as i64;
                        }
                        None => break,
                    }
                }
                value
            }
            other => other as i64,
        };
        Ok(value)
    }

    fn lex_char(&mut self, start: SourceLoc) -> Result<TokenKind, LexError> {
        let value = match self.bump() {
            None | Some('\n') => {
                return Err(LexError::UnterminatedChar {
                    span: self.span_from(start),
                });
            }
            Some('\\') => self.lex_escape(start)?,
            Some(c) => c as i64,
        };
        match self.bump() {
            Some('\'') => Ok(TokenKind::CharacterConstant(value)),
            _ => Err(LexError::UnterminatedChar {
                span: self.span_from(start),
            }),
        }
    }

    fn lex_string(&mut self, start: SourceLoc) -> Result<TokenKind, LexError> {
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(LexError::UnterminatedString {
                        span: self.span_from(start),
                    });
                }
                Some('"') => break,
                Some('\\') => {
                    let escaped = self.lex_escape(start).map_err(|_| LexError::UnterminatedString {
                        span: self.span_from(start),
                    })?;
                    value.push(char::from_u32(escaped as u32).unwrap_or('\u{fffd}'));
                }
                Some(c) => value.push(c),
            }
        }
        Ok(TokenKind::StringLiteral(NameId::new(&value)))
    }

    fn lex_punct(&mut self, c: char, start: SourceLoc) -> Result<TokenKind, LexError> {
        let next = self.peek();
        let two = |lexer: &mut Self, kind: TokenKind| {
            lexer.bump();
            kind
        };
        let kind = match (c, next) {
            ('.', Some('.')) if self.peek_at(1) == Some('.') => {
                self.bump();
                self.bump();
                TokenKind::Ellipsis
            }
            ('<', Some('<')) => two(self, TokenKind::LeftShift),
            ('>', Some('>')) => two(self, TokenKind::RightShift),
            ('<', Some('=')) => two(self, TokenKind::LessEqual),
            ('>', Some('=')) => two(self, TokenKind::GreaterEqual),
            ('=', Some('=')) => two(self, TokenKind::Equal),
            ('!', Some('=')) => two(self, TokenKind::NotEqual),
            ('&', Some('&')) => two(self, TokenKind::LogicAnd),
            ('|', Some('|')) => two(self, TokenKind::LogicOr),
            ('+', Some('+')) => two(self, TokenKind::Increment),
            ('-', Some('-')) => two(self, TokenKind::Decrement),
            ('-', Some('>')) => two(self, TokenKind::Arrow),
            ('*', _) => TokenKind::Star,
            ('(', _) => TokenKind::LeftParen,
            (')', _) => TokenKind::RightParen,
            ('[', _) => TokenKind::LeftBracket,
            (']', _) => TokenKind::RightBracket,
            ('{', _) => TokenKind::LeftBrace,
            ('}', _) => TokenKind::RightBrace,
            (',', _) => TokenKind::Comma,
            (';', _) => TokenKind::Semicolon,
            (':', _) => TokenKind::Colon,
            ('?', _) => TokenKind::Question,
            ('.', _) => TokenKind::Dot,
            ('=', _) => TokenKind::Assign,
            ('+', _) => TokenKind::Plus,
            ('-', _) => TokenKind::Minus,
            ('/', _) => TokenKind::Slash,
            ('%', _) => TokenKind::Percent,
            ('&', _) => TokenKind::Amp,
            ('|', _) => TokenKind::Pipe,
            ('^', _) => TokenKind::Caret,
            ('~', _) => TokenKind::Tilde,
            ('!', _) => TokenKind::Bang,
            ('<', _) => TokenKind::Less,
            ('>', _) => TokenKind::Greater,
            (other, _) => {
                return Err(LexError::InvalidCharacter {
                    ch: other,
                    span: self.span_from(start),
                });
            }
        };
        Ok(kind)
    }

    /// Read a `#` line. Only `#define FFI_SCOPE "..."` and `#define FFI_LIB "..."`
    /// are accepted; `#pragma` and every other directive is an error.
    fn lex_directive(&mut self, start: SourceLoc) -> Result<Token, LexError> {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
        let span = self.span_from(start);
        let line = span.slice(self.src);
        let body = line[1..].trim();
        let unsupported = || LexError::UnsupportedDirective {
            text: line.trim().to_string(),
            span,
        };

        let mut words = body.splitn(3, char::is_whitespace);
        match (words.next(), words.next(), words.next()) {
            (Some("define"), Some(name @ ("FFI_SCOPE" | "FFI_LIB")), Some(value)) => {
                let value = value.trim();
                let unquoted = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .ok_or_else(unsupported)?;
                let kind = if name == "FFI_SCOPE" {
                    DirectiveKind::Scope
                } else {
                    DirectiveKind::Lib
                };
                Ok(Token::new(TokenKind::Directive(kind, NameId::new(unquoted)), span))
            }
            _ => Err(unsupported()),
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Err(e) = self.skip_trivia() {
            self.done = true;
            return Some(Err(e));
        }
        match self.lex_token() {
            Ok(Some(token)) => Some(Ok(token)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn is_float_exponent(text: &str) -> bool {
    let is_hex = text.starts_with("0x") || text.starts_with("0X");
    let last = text.chars().last();
    if is_hex {
        matches!(last, Some('p' | 'P'))
    } else {
        matches!(last, Some('e' | 'E'))
    }
}

/// Parse a C integer literal with optional `u`/`l` suffixes.
fn parse_integer(text: &str) -> Option<u64> {
    let digits = text.trim_end_matches(['u', 'U', 'l', 'L']);
    let suffix = &text[digits.len()..];
    let lower = suffix.to_ascii_lowercase();
    if !matches!(lower.as_str(), "" | "u" | "l" | "ul" | "lu" | "ll" | "ull" | "llu") {
        return None;
    }

    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        if hex.is_empty() {
            return None;
        }
        u64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        if bin.is_empty() {
            return None;
        }
        u64::from_str_radix(bin, 2).ok()
    } else if digits.len() > 1 && digits.starts_with('0') {
        u64::from_str_radix(&digits[1..], 8).ok()
    } else {
        digits.parse().ok()
    }
}

fn keyword(word: &str) -> Option<TokenKind> {
    let kind = match word {
        "typedef" => TokenKind::Typedef,
        "extern" => TokenKind::Extern,
        "static" => TokenKind::Static,
        "auto" => TokenKind::Auto,
        "register" => TokenKind::Register,
        "_Thread_local" | "__thread" => TokenKind::ThreadLocal,
        "const" | "__const" | "__const__" => TokenKind::Const,
        "volatile" | "__volatile" | "__volatile__" => TokenKind::Volatile,
        "restrict" | "__restrict" | "__restrict__" => TokenKind::Restrict,
        "_Atomic" => TokenKind::Atomic,
        "inline" | "__inline" | "__inline__" => TokenKind::Inline,
        "_Noreturn" => TokenKind::Noreturn,
        "void" => TokenKind::Void,
        "_Bool" | "bool" => TokenKind::Bool,
        "char" => TokenKind::Char,
        "short" => TokenKind::Short,
        "int" => TokenKind::Int,
        "long" => TokenKind::Long,
        "float" => TokenKind::Float,
        "double" => TokenKind::Double,
        "signed" | "__signed" | "__signed__" => TokenKind::Signed,
        "unsigned" => TokenKind::Unsigned,
        "_Complex" => TokenKind::Complex,
        "struct" => TokenKind::Struct,
        "union" => TokenKind::Union,
        "enum" => TokenKind::Enum,
        "sizeof" => TokenKind::Sizeof,
        "_Generic" => TokenKind::Generic,
        "_Alignas" | "alignas" => TokenKind::Alignas,
        "__attribute__" | "__attribute" => TokenKind::Attribute,
        _ => return None,
    };
    Some(kind)
}
