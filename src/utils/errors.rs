//! Error types for loop analysis.
//!
//! Two families live here. [`AnalysisError`] aborts a request: the input
//! could not be parsed, contains a construct the analysis refuses to reason
//! about, or the run was cancelled. [`Diagnostic`]s are the opposite: they are
//! accumulated into a check's status and never abort anything.

use crate::utils::location::Span;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Top-level error type for an analysis request.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// A statement or expression outside the supported subset
    #[error("unsupported construct: {0}")]
    Unsupported(#[from] UnsupportedConstruct),

    /// Caller contract violation
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Cooperative cancellation was observed
    #[error("analysis cancelled")]
    Cancelled,

    /// Error during lexing
    #[error("lexer error: {0}")]
    Lexer(#[from] LexerError),

    /// Error during parsing
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl AnalysisError {
    /// Shorthand for [`AnalysisError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        AnalysisError::InvalidArgument(message.into())
    }

    /// Whether the error reports cancellation rather than a verdict.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AnalysisError::Cancelled)
    }
}

/// A construct the access collector refuses to analyze.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedConstruct {
    /// Human-readable description of the construct
    pub message: String,
    /// Location in source
    pub span: Span,
    /// Which part of the grammar was rejected
    pub kind: UnsupportedKind,
}

impl UnsupportedConstruct {
    /// Create a new rejection.
    pub fn new(kind: UnsupportedKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            kind,
        }
    }
}

impl fmt::Display for UnsupportedConstruct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.span.is_dummy() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} at {}", self.message, self.span)
        }
    }
}

/// Construct the analysis does not model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnsupportedKind {
    /// Statement form (while, switch, goto, ...)
    Statement,
    /// Expression form (pointer dereference, comma, ...)
    Expression,
    /// `for` header that is not a counted loop
    LoopHeader,
    /// Declaration with pointers or nested declarators
    Declaration,
    /// Non-affine subscript under strict subscript handling
    Subscript,
    /// Assignment to an enclosing loop's index variable
    IndexWrite,
}

/// Error during lexical analysis.
#[derive(Error, Debug, Clone)]
pub struct LexerError {
    /// The error message
    pub message: String,
    /// Location in source
    pub span: Span,
    /// The kind of lexer error
    pub kind: LexerErrorKind,
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.span)
    }
}

/// Category of a lexer error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexerErrorKind {
    /// Unexpected character
    UnexpectedChar,
    /// Unterminated string or character literal
    UnterminatedString,
    /// Unterminated block comment
    UnterminatedComment,
    /// Invalid number literal
    InvalidNumber,
}

/// Error during parsing.
#[derive(Error, Debug, Clone)]
pub struct ParseError {
    /// The error message
    pub message: String,
    /// Location in source
    pub span: Span,
    /// The kind of parse error
    pub kind: ParseErrorKind,
    /// What was found
    pub found: Option<String>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.span)?;
        if let Some(ref found) = self.found {
            write!(f, " (found: {})", found)?;
        }
        Ok(())
    }
}

/// Category of a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Expected a specific token
    ExpectedToken,
    /// Expected an expression
    ExpectedExpression,
    /// Expected an identifier
    ExpectedIdentifier,
    /// Expected a type
    ExpectedType,
    /// Unexpected end of file
    UnexpectedEof,
}

/// How serious a diagnostic is.
///
/// Ordered so that `max()` over a status yields its overall severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Transformation allowed, user should know
    Warning,
    /// Transformation blocked
    Error,
    /// Precondition failed; dependence analysis never ran
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// A message attached to a check's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity level
    pub severity: Severity,
    /// Message
    pub message: String,
    /// Primary span
    pub span: Option<Span>,
}

impl Diagnostic {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            span: None,
        }
    }

    /// Create a new fatal diagnostic.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, message)
    }

    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Add a span to the diagnostic.
    pub fn with_span(mut self, span: Span) -> Self {
        if !span.is_dummy() {
            self.span = Some(span);
        }
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(span) = self.span {
            write!(f, " ({})", span)?;
        }
        Ok(())
    }
}

/// Result type using AnalysisError.
pub type AnalysisResult<T> = Result<T, AnalysisError>;
