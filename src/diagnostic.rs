//! Error types and diagnostic collection.
//!
//! Each phase has its own `thiserror` enum. [`FfiError`] unifies them and maps every
//! error onto the coarse [`ErrorKind`] taxonomy callers dispatch on. A
//! [`DiagnosticEngine`] collects the errors of one unit; a failed unit surfaces all of
//! them at once as a [`UnitError`].

use std::fmt;

use crate::layout::LayoutError;
use crate::lexer::{LexError, TokenKind};
use crate::source::SourceSpan;

/// Diagnostic severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Note,
}

/// Coarse error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Lex,
    Syntax,
    UnresolvedType,
    UnsupportedConstruct,
    Conflict,
    LayoutConflict,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorKind::Lex => "lexical error",
            ErrorKind::Syntax => "syntax error",
            ErrorKind::UnresolvedType => "unresolved type",
            ErrorKind::UnsupportedConstruct => "unsupported construct",
            ErrorKind::Conflict => "conflict",
            ErrorKind::LayoutConflict => "layout conflict",
        };
        f.write_str(text)
    }
}

/// Individual diagnostic with rich context
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub kind: Option<ErrorKind>,
    pub message: String,
    pub span: SourceSpan,
    pub related: Vec<SourceSpan>, // Related locations
}

/// Parse errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("expected {expected}, found '{found}'")]
    UnexpectedToken {
        expected: String,
        found: TokenKind,
        span: SourceSpan,
    },

    #[error("unexpected end of input")]
    UnexpectedEof { span: SourceSpan },

    #[error("invalid type specifier combination: {message}")]
    InvalidTypeCombination { message: String, span: SourceSpan },

    #[error("{message}")]
    DeclarationNotAllowed { message: String, span: SourceSpan },

    #[error("{construct} is not supported")]
    Unsupported { construct: String, span: SourceSpan },

    #[error("declaration requires a name")]
    MissingDeclaratorName { span: SourceSpan },

    /// Error inside `{ ... }`; the unit cannot be resynchronized
    #[error("malformed {what} body: {source}")]
    MalformedBody {
        what: &'static str,
        source: Box<ParseError>,
        span: SourceSpan,
    },
}

impl ParseError {
    pub fn span(&self) -> SourceSpan {
        match self {
            ParseError::UnexpectedToken { span, .. }
            | ParseError::UnexpectedEof { span }
            | ParseError::InvalidTypeCombination { span, .. }
            | ParseError::DeclarationNotAllowed { span, .. }
            | ParseError::Unsupported { span, .. }
            | ParseError::MissingDeclaratorName { span } => *span,
            ParseError::MalformedBody { source, .. } => source.span(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::Unsupported { .. } => ErrorKind::UnsupportedConstruct,
            ParseError::MalformedBody { source, .. } => source.kind(),
            _ => ErrorKind::Syntax,
        }
    }

    /// Whether parsing must stop for the whole unit
    pub fn is_fatal(&self) -> bool {
        matches!(self, ParseError::MalformedBody { .. })
    }
}

/// Semantic errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SemanticError {
    #[error("unknown type name '{name}'")]
    UnknownTypeName { name: String, span: SourceSpan },

    #[error("incomplete type '{name}' used by value")]
    IncompleteType { name: String, span: SourceSpan },

    #[error("use of undeclared identifier '{name}' in constant expression")]
    UndeclaredConstant { name: String, span: SourceSpan },

    #[error("{message}")]
    UnsupportedConstruct { message: String, span: SourceSpan },

    #[error("field '{field}' of '{record}' contains the record itself by value")]
    SelfReference {
        record: String,
        field: String,
        span: SourceSpan,
    },

    #[error("conflicting definition of '{name}': {detail}")]
    Conflict {
        name: String,
        detail: String,
        first: SourceSpan,
        second: SourceSpan,
    },

    #[error("duplicate member '{name}'")]
    DuplicateMember {
        name: String,
        first: SourceSpan,
        second: SourceSpan,
    },

    #[error("enumerator '{name}' value {value} does not fit in '{underlying}'")]
    EnumValueOutOfRange {
        name: String,
        value: i128,
        underlying: String,
        span: SourceSpan,
    },

    #[error("invalid constant expression: {message}")]
    InvalidConstant { message: String, span: SourceSpan },

    #[error("invalid bit-field '{name}': {message}")]
    InvalidBitField {
        name: String,
        message: String,
        span: SourceSpan,
    },
}

impl SemanticError {
    pub fn span(&self) -> SourceSpan {
        match self {
            SemanticError::UnknownTypeName { span, .. }
            | SemanticError::IncompleteType { span, .. }
            | SemanticError::UndeclaredConstant { span, .. }
            | SemanticError::UnsupportedConstruct { span, .. }
            | SemanticError::SelfReference { span, .. }
            | SemanticError::EnumValueOutOfRange { span, .. }
            | SemanticError::InvalidConstant { span, .. }
            | SemanticError::InvalidBitField { span, .. } => *span,
            SemanticError::Conflict { second, .. } | SemanticError::DuplicateMember { second, .. } => *second,
        }
    }

    /// Position of the earlier, conflicting declaration
    pub fn related(&self) -> Option<SourceSpan> {
        match self {
            SemanticError::Conflict { first, .. } | SemanticError::DuplicateMember { first, .. } => Some(*first),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SemanticError::UnknownTypeName { .. }
            | SemanticError::IncompleteType { .. }
            | SemanticError::UndeclaredConstant { .. } => ErrorKind::UnresolvedType,
            SemanticError::Conflict { .. } | SemanticError::DuplicateMember { .. } => ErrorKind::Conflict,
            SemanticError::UnsupportedConstruct { .. }
            | SemanticError::SelfReference { .. }
            | SemanticError::EnumValueOutOfRange { .. }
            | SemanticError::InvalidConstant { .. }
            | SemanticError::InvalidBitField { .. } => ErrorKind::UnsupportedConstruct,
        }
    }
}

/// Any error produced while turning declaration text into descriptors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FfiError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error("{error}")]
    Layout {
        #[source]
        error: LayoutError,
        span: SourceSpan,
    },
}

impl FfiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FfiError::Lex(_) => ErrorKind::Lex,
            FfiError::Parse(e) => e.kind(),
            FfiError::Semantic(e) => e.kind(),
            FfiError::Layout { error, .. } => error.kind(),
        }
    }

    pub fn span(&self) -> SourceSpan {
        match self {
            FfiError::Lex(e) => e.span(),
            FfiError::Parse(e) => e.span(),
            FfiError::Semantic(e) => e.span(),
            FfiError::Layout { span, .. } => *span,
        }
    }

    pub fn related(&self) -> Option<SourceSpan> {
        match self {
            FfiError::Semantic(e) => e.related(),
            _ => None,
        }
    }
}

impl From<&FfiError> for Diagnostic {
    fn from(error: &FfiError) -> Self {
        Diagnostic {
            level: DiagnosticLevel::Error,
            kind: Some(error.kind()),
            message: error.to_string(),
            span: error.span(),
            related: error.related().into_iter().collect(),
        }
    }
}

/// All errors of a unit that failed. Nothing from the unit was published.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", summarize(.errors))]
pub struct UnitError {
    pub errors: Vec<FfiError>,
}

fn summarize(errors: &[FfiError]) -> String {
    match errors {
        [] => "unit failed".to_string(),
        [only] => format!("{}: {}", only.span(), only),
        [first, rest @ ..] => format!("{}: {} (and {} more)", first.span(), first, rest.len()),
    }
}

impl UnitError {
    pub fn new(errors: Vec<FfiError>) -> Self {
        UnitError { errors }
    }

    /// Kind of the first error
    pub fn kind(&self) -> Option<ErrorKind> {
        self.errors.first().map(FfiError::kind)
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.errors.iter().map(Diagnostic::from).collect()
    }
}

impl From<FfiError> for UnitError {
    fn from(error: FfiError) -> Self {
        UnitError { errors: vec![error] }
    }
}

/// Diagnostic engine for collecting the errors and notes of one unit
#[derive(Debug, Default)]
pub struct DiagnosticEngine {
    pub diagnostics: Vec<Diagnostic>,
    errors: Vec<FfiError>,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        DiagnosticEngine::default()
    }

    pub fn report_error(&mut self, error: impl Into<FfiError>) {
        let error = error.into();
        self.diagnostics.push(Diagnostic::from(&error));
        self.errors.push(error);
    }

    pub fn report_note(&mut self, message: String, span: SourceSpan) {
        self.diagnostics.push(Diagnostic {
            level: DiagnosticLevel::Note,
            kind: None,
            message,
            span,
            related: Vec::new(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn errors(&self) -> &[FfiError] {
        &self.errors
    }

    /// Take the collected errors, leaving the engine empty
    pub fn take_errors(&mut self) -> Vec<FfiError> {
        self.diagnostics.clear();
        std::mem::take(&mut self.errors)
    }
}

/// Formats diagnostics as `file:line:col: level: message` with the offending source line
#[derive(Debug, Clone)]
pub struct ErrorFormatter {
    pub show_source: bool,
}

impl Default for ErrorFormatter {
    fn default() -> Self {
        ErrorFormatter { show_source: true }
    }
}

impl ErrorFormatter {
    /// Format a single diagnostic against the unit text it came from
    pub fn format_diagnostic(&self, diag: &Diagnostic, source: &str, path: &str) -> String {
        let level_str = match diag.level {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Note => "note",
        };

        let mut result = if diag.span.is_empty() {
            format!("{path}: {level_str}: {}", diag.message)
        } else {
            format!("{path}:{}: {level_str}: {}", diag.span.start, diag.message)
        };

        if self.show_source
            && !diag.span.is_empty()
            && let Some(line) = source.lines().nth(diag.span.start.line as usize - 1)
        {
            let caret_col = diag.span.start.column.saturating_sub(1) as usize;
            result.push_str(&format!("\n  | {line}\n  | {}^", " ".repeat(caret_col)));
        }

        for related in &diag.related {
            result.push_str(&format!("\n{path}:{related}: note: previous definition is here"));
        }

        result
    }

    /// Format multiple diagnostics
    pub fn format_diagnostics(&self, diagnostics: &[Diagnostic], source: &str, path: &str) -> String {
        diagnostics
            .iter()
            .map(|diag| self.format_diagnostic(diag, source, path))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
