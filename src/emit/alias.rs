use super::ParamBinding;
use crate::config::TranslateOptions;
use std::collections::HashMap;

/// Per-query mutable state: alias/CTE counters and the parameter binding.
/// Threaded by `&mut` through every builder function so aliases stay
/// unique and parameters keep a single, query-wide numbering.
pub(super) struct Emitter {
    pub(super) options: TranslateOptions,
    alias_counters: HashMap<String, u32>,
    cte_counter: u32,
    pub(super) params: ParamBinding,
    pub(super) has_recursive_cte: bool,
}

impl Emitter {
    pub(super) fn new(options: TranslateOptions) -> Self {
        Emitter {
            options,
            alias_counters: HashMap::new(),
            cte_counter: 0,
            params: ParamBinding::new(),
            has_recursive_cte: false,
        }
    }

    /// `<var>_<n>` (§4.4.1), one monotonically increasing counter per
    /// variable name so repeated patterns over the same name still get a
    /// distinct table alias each time a *new* table reference is needed.
    pub(super) fn fresh_alias(&mut self, base: &str) -> String {
        let sanitized = sanitize_identifier(base);
        let counter = self.alias_counters.entry(sanitized.clone()).or_insert(0);
        let alias = format!("{sanitized}_{counter}");
        *counter += 1;
        alias
    }

    pub(super) fn fresh_cte_name(&mut self, prefix: &str) -> String {
        let name = format!("{prefix}_{}", self.cte_counter);
        self.cte_counter += 1;
        name
    }
}

/// Cypher variable names are a superset of valid SQL identifiers (they can
/// start with `0` after lowering's anonymous-name rewrite); strip anything
/// that isn't ASCII-alphanumeric/underscore and ensure the result starts
/// with a letter.
fn sanitize_identifier(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        format!("v_{cleaned}")
    } else {
        cleaned
    }
}
