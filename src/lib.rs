//! pgraf-cypher - translates a subset of the Cypher graph query language into
//! parameterized SQL over a property-graph schema stored as two Postgres
//! tables (`nodes`, `edges`), each carrying a label array and a `jsonb`
//! property bag.
//!
//! The crate is a four-stage pipeline:
//! - [`lexer`] turns source text into a token stream with source spans.
//! - [`parser`] recognizes the supported Cypher grammar and builds a parse tree.
//! - [`lower`] resolves variable scoping and builds the typed [`ast`].
//! - [`emit`] walks the AST and assembles SQL text plus a parameter binding.
//!
//! [`translate`] is the single public entry point tying the four stages
//! together. The pipeline is synchronous and stateless: no I/O, no locks, no
//! process-wide state. An optional, feature-gated [`facade`] module adds an
//! async execution helper on top, but it is not part of the core contract.

pub mod ast;
pub mod config;
pub mod emit;
pub mod error;
pub mod lexer;
pub mod lower;
pub mod parser;

#[cfg(feature = "execute")]
pub mod facade;

pub use config::TranslateOptions;
pub use error::{Diagnostic, TranslateError};

use emit::ParamBinding;

/// The result of translating a Cypher source string: ready-to-execute SQL
/// text plus the ordered mapping from user-visible parameter name to
/// placeholder position that an adapter uses to bind values.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Translation {
    pub sql: String,
    pub params: ParamBinding,
}

/// Translate a single Cypher statement into `(sql, params)`.
///
/// This is the only entry point most callers need. It is a pure function of
/// `source` and `options`: the same pair always produces byte-identical
/// output.
pub fn translate(source: &str, options: &TranslateOptions) -> Result<Translation, TranslateError> {
    log::debug!("translate: {} byte(s) of source", source.len());

    let tokens = lexer::tokenize(source)?;
    log::trace!("lexer produced {} token(s)", tokens.len());

    let parse_tree = parser::parse(&tokens)?;
    log::debug!("parser produced a parse tree with {} clause(s)", parse_tree.clauses.len());

    let query = lower::lower_query(&parse_tree)?;
    log::debug!("lowered query with {} clause(s)", query.clauses.len());

    let translation = emit::emit_query(&query, options)?;
    log::debug!(
        "emitted {} byte(s) of SQL with {} parameter(s)",
        translation.sql.len(),
        translation.params.len()
    );

    Ok(Translation {
        sql: translation.sql,
        params: translation.params,
    })
}
