use crate::error::Span;
use thiserror::Error;

/// Failure to translate an AST construct the lowerer already accepted.
/// Per §4.4.7 this is an escape hatch — a well-formed query should never
/// reach one of these in practice.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EmitErrorKind {
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("unknown aggregate `{0}`")]
    UnknownAggregate(String),
    #[error("a relationship's maximum variable-length depth of 0 is not renderable")]
    ZeroDepthVariableLength,
    #[error("RETURN/WITH must project at least one item")]
    EmptyProjection,
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind}")]
pub struct EmitError {
    pub kind: EmitErrorKind,
    pub span: Span,
}

impl EmitError {
    pub(crate) fn new(kind: EmitErrorKind, span: Span) -> Self {
        EmitError { kind, span }
    }
}
