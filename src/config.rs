use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::Validate;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Translation-time options, validated up front so a malformed config fails
/// loudly at startup rather than mid-query.
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
pub struct TranslateOptions {
    /// Schema holding the `nodes`/`edges` tables (§6.2).
    #[validate(length(min = 1, message = "schema cannot be empty"))]
    pub schema: String,

    /// Depth bound used for an unbounded variable-length relationship
    /// (`*`, `*2..`) when the query doesn't name one (§4.4.3, §9 Open
    /// Questions).
    #[validate(range(
        min = 1,
        max = 1000,
        message = "max_variable_path_depth must be between 1 and 1000"
    ))]
    pub max_variable_path_depth: u32,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            schema: "pgraf".to_string(),
            max_variable_path_depth: 10,
        }
    }
}

impl TranslateOptions {
    /// Build options from `PGRAF_CYPHER_*` environment variables, falling
    /// back to [`TranslateOptions::default`] for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let options = Self {
            schema: env::var("PGRAF_CYPHER_SCHEMA").unwrap_or_else(|_| "pgraf".to_string()),
            max_variable_path_depth: parse_env_var("PGRAF_CYPHER_MAX_VARIABLE_PATH_DEPTH", "10")?,
        };
        options.validate()?;
        Ok(options)
    }
}

fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let options = TranslateOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.schema, "pgraf");
        assert_eq!(options.max_variable_path_depth, 10);
    }

    #[test]
    fn rejects_empty_schema() {
        let options = TranslateOptions {
            schema: "".to_string(),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_depth() {
        let options = TranslateOptions {
            max_variable_path_depth: 1001,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }
}
