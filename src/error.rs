//! Shared location and diagnostic types threaded through every pipeline stage.
//!
//! Every reachable failure in the pipeline surfaces as one of the four
//! closed-set error enums ([`lexer::LexError`], [`parser::ParseError`],
//! [`lower::LowerError`], [`emit::EmitError`]) rather than a panic. This
//! module defines the [`Span`] they all carry and the [`Diagnostic`] wire
//! format a caller gets back from [`crate::translate`].

use serde::Serialize;
use thiserror::Error;

use crate::emit::EmitError;
use crate::lexer::LexError;
use crate::lower::LowerError;
use crate::parser::ParseError;

/// A byte-range-plus-line/column location in the original source string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start_offset: usize,
    pub end_offset: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start_offset: usize, end_offset: usize, line: u32, column: u32) -> Self {
        Self {
            start_offset,
            end_offset,
            line,
            column,
        }
    }
}

/// The unified, closed-set error type returned by [`crate::translate`].
///
/// Each variant wraps one stage's own error enum; matching on the variant
/// tells a caller which stage rejected the query without needing to inspect
/// the message text.
#[derive(Debug, Error, PartialEq)]
pub enum TranslateError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Lower(#[from] LowerError),
    #[error(transparent)]
    Emit(#[from] EmitError),
}

impl TranslateError {
    /// The location this error is anchored to.
    pub fn span(&self) -> Span {
        match self {
            TranslateError::Lex(e) => e.span(),
            TranslateError::Parse(e) => e.span(),
            TranslateError::Lower(e) => e.span,
            TranslateError::Emit(e) => e.span,
        }
    }

    /// The closed-set kind name, stable across message wording changes.
    pub fn kind(&self) -> &'static str {
        match self {
            TranslateError::Lex(e) => e.kind_name(),
            TranslateError::Parse(_) => "ParseError",
            TranslateError::Lower(e) => e.kind.name(),
            TranslateError::Emit(_) => "EmitError",
        }
    }
}

/// Public wire format for a translation failure: kind, message, and location.
///
/// The exact serialization (JSON, some other tuple) is an adapter concern;
/// this type only fixes the fields and offers `Serialize` so an adapter that
/// wants JSON doesn't have to hand-write the mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: String,
    pub message: String,
    pub line: u32,
    pub column: u32,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl From<&TranslateError> for Diagnostic {
    fn from(err: &TranslateError) -> Self {
        let span = err.span();
        Diagnostic {
            kind: err.kind().to_string(),
            message: err.to_string(),
            line: span.line,
            column: span.column,
            start_offset: span.start_offset,
            end_offset: span.end_offset,
        }
    }
}

impl From<TranslateError> for Diagnostic {
    fn from(err: TranslateError) -> Self {
        Diagnostic::from(&err)
    }
}
