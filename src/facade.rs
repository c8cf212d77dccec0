//! Optional async execution façade (feature `execute`).
//!
//! The translation core never touches a database; this module only adds the
//! `async`/streaming plumbing so a caller with a relational client handy
//! doesn't have to hand-roll the connection lifecycle every time. It is
//! generic over any client that implements [`Executor`] — the crate ships no
//! concrete Postgres driver.

use async_trait::async_trait;
use futures_util::stream::Stream;
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use thiserror::Error;

use crate::{Translation, TranslateError};

/// A single result row: column name to JSON value, mirroring how the rest of
/// the ambient stack already represents rows at the wire boundary.
pub type Row = HashMap<String, Value>;

/// A stream of result rows, boxed so [`Executor`] implementors don't need to
/// name their own concrete stream type.
pub type RowStream = Pin<Box<dyn Stream<Item = Result<Row, ExecuteError>> + Send>>;

/// Named parameter values supplied by the caller at execution time, keyed by
/// the same names that appear in a [`crate::emit::ParamBinding`].
pub type ParamValues = HashMap<String, Value>;

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("translation failed: {0}")]
    Translate(#[from] TranslateError),

    #[error("missing value for parameter `{0}`")]
    MissingParameter(String),

    #[error("client error: {0}")]
    Client(String),
}

/// Anything that can run parameterized SQL and hand back a row stream.
/// Implemented by an adapter for whatever relational client it wraps; this
/// crate provides no implementation of its own.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, sql: &str, params: &ParamValues) -> Result<RowStream, ExecuteError>;
}

/// Translates `source` and runs it against `executor`, raising
/// [`ExecuteError::MissingParameter`] if `values` doesn't cover every name
/// the translation references.
///
/// Cancelling the returned future's caller (dropping the stream) is
/// cooperative: the underlying [`Executor`] is responsible for returning its
/// connection to its pool when its stream is dropped.
pub async fn translate_and_execute(
    source: &str,
    options: &crate::config::TranslateOptions,
    executor: &dyn Executor,
    values: &ParamValues,
) -> Result<RowStream, ExecuteError> {
    let translation: Translation = crate::translate(source, options)?;
    for (name, _) in translation.params.iter() {
        if !values.contains_key(name) {
            return Err(ExecuteError::MissingParameter(name.to_string()));
        }
    }
    executor.execute(&translation.sql, values).await
}
