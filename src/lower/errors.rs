use crate::error::Span;
use thiserror::Error;

/// The closed set of semantic faults the lowerer can detect in
/// otherwise well-formed syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowerErrorKind {
    UnknownVariable,
    VariableKindConflict,
    InvalidPropertyAccess,
    NestedAggregate,
    UnsupportedConstruct,
}

impl LowerErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            LowerErrorKind::UnknownVariable => "UnknownVariable",
            LowerErrorKind::VariableKindConflict => "VariableKindConflict",
            LowerErrorKind::InvalidPropertyAccess => "InvalidPropertyAccess",
            LowerErrorKind::NestedAggregate => "NestedAggregate",
            LowerErrorKind::UnsupportedConstruct => "UnsupportedConstruct",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct LowerError {
    pub kind: LowerErrorKind,
    pub span: Span,
    pub message: String,
}

impl LowerError {
    pub(crate) fn new(kind: LowerErrorKind, span: Span, message: impl Into<String>) -> Self {
        LowerError {
            kind,
            span,
            message: message.into(),
        }
    }

    pub(crate) fn unknown_variable(name: &str, span: Span) -> Self {
        Self::new(
            LowerErrorKind::UnknownVariable,
            span,
            format!("variable `{name}` is not in scope here"),
        )
    }

    pub(crate) fn kind_conflict(name: &str, span: Span) -> Self {
        Self::new(
            LowerErrorKind::VariableKindConflict,
            span,
            format!("`{name}` is already bound to a different kind of entity"),
        )
    }

    pub(crate) fn invalid_property_access(name: &str, span: Span) -> Self {
        Self::new(
            LowerErrorKind::InvalidPropertyAccess,
            span,
            format!("`{name}` is a variable-length relationship path and has no properties"),
        )
    }

    pub(crate) fn nested_aggregate(span: Span) -> Self {
        Self::new(
            LowerErrorKind::NestedAggregate,
            span,
            "aggregate functions cannot be nested inside another aggregate",
        )
    }

    pub(crate) fn unsupported(what: &str, span: Span) -> Self {
        Self::new(
            LowerErrorKind::UnsupportedConstruct,
            span,
            format!("{what} is not supported"),
        )
    }
}
