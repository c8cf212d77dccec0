use crate::ast::EntityKind;
use std::collections::HashMap;

/// The set of variables bound at a point in the query, in binding order.
///
/// Order matters: `RETURN *` expands to the bound variables in the order
/// they first entered scope (§4.3), so this can't just be a `HashMap`.
#[derive(Debug, Default, Clone)]
pub(crate) struct Scope {
    order: Vec<String>,
    kinds: HashMap<String, EntityKind>,
}

impl Scope {
    pub(crate) fn new() -> Self {
        Scope::default()
    }

    /// Returns the previously bound kind if `name` was already in scope
    /// with a different kind (a conflict the caller should report).
    pub(crate) fn bind(&mut self, name: &str, kind: EntityKind) -> Option<EntityKind> {
        if let Some(existing) = self.kinds.get(name) {
            if *existing != kind {
                return Some(*existing);
            }
            return None;
        }
        self.order.push(name.to_string());
        self.kinds.insert(name.to_string(), kind);
        None
    }

    pub(crate) fn get(&self, name: &str) -> Option<EntityKind> {
        self.kinds.get(name).copied()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    pub(crate) fn names_in_order(&self) -> &[String] {
        &self.order
    }

    /// `WITH`/`RETURN` replace the scope with exactly the projected names.
    pub(crate) fn reset_to(&mut self, vars: Vec<(String, EntityKind)>) {
        self.order.clear();
        self.kinds.clear();
        for (name, kind) in vars {
            self.bind(&name, kind);
        }
    }
}
