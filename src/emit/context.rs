use std::collections::HashMap;

/// How a bound Cypher variable maps onto the SQL being assembled.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum EmitAlias {
    /// A node or relationship table alias — `.id`, `.labels`, `.properties`
    /// are all reachable through it.
    Entity(String),
    /// A scalar that already passed through a `WITH` projection; only the
    /// given SQL text (usually `<stage>.<column>`) is reachable, properties
    /// are not.
    Column(String),
    /// A node or relationship variable that crossed a `WITH` boundary as
    /// itself (not narrowed to a plain scalar): `.id`/`.properties`/`.labels`
    /// are still reachable, each through its own carried CTE column rather
    /// than a single table alias.
    CarriedEntity(CarriedEntity),
}

/// The three columns a node/relationship variable needs projected into a
/// `WITH` stage's CTE so property/label access still works on the far side
/// of the boundary.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct CarriedEntity {
    pub(super) id: String,
    pub(super) properties: String,
    pub(super) labels: String,
}

/// One entry in a stage's `FROM` list.
#[derive(Debug, Clone)]
pub(super) enum FromEntry {
    /// Comma-joined — used for mandatory `MATCH` patterns.
    Plain(String),
    /// `LEFT JOIN <table> ON <predicates>` — used for `OPTIONAL MATCH`, so a
    /// failed match widens the row with NULLs instead of eliminating it.
    LeftJoin(String, Vec<String>),
}

/// How one `WITH`-projected item rebinds into the next stage's scope.
#[derive(Debug, Clone)]
pub(super) enum ProjectedVar {
    /// A plain value column — `column` is its name in the stage's CTE.
    Scalar { name: String, column: String },
    /// A node/relationship variable carried through as itself; each field
    /// names one of the three columns the projection carried it with.
    Entity {
        name: String,
        id: String,
        properties: String,
        labels: String,
    },
}

/// The accumulated FROM/JOIN/WHERE state between two `WITH` boundaries (or
/// between the start of the query and its first boundary, or its last
/// boundary and the terminal `RETURN`).
#[derive(Debug, Default)]
pub(super) struct StageContext {
    pub(super) from_list: Vec<FromEntry>,
    pub(super) where_conditions: Vec<String>,
    pub(super) var_to_alias: HashMap<String, EmitAlias>,
    /// Recursive path CTEs introduced by variable-length relationships in
    /// this stage; hoisted to the query-level `WITH RECURSIVE` at assembly
    /// time.
    pub(super) ctes: Vec<String>,
}

impl StageContext {
    pub(super) fn new() -> Self {
        StageContext::default()
    }

    /// Rebuild the context after a `WITH`: the only things in scope are the
    /// projected columns of the CTE that now holds the prior stage's rows.
    pub(super) fn from_stage(stage_name: &str, projected: &[ProjectedVar]) -> Self {
        let mut ctx = StageContext::new();
        ctx.from_list.push(FromEntry::Plain(stage_name.to_string()));
        for var in projected {
            match var {
                ProjectedVar::Scalar { name, column } => {
                    ctx.var_to_alias.insert(
                        name.clone(),
                        EmitAlias::Column(format!("{stage_name}.{column}")),
                    );
                }
                ProjectedVar::Entity { name, id, properties, labels } => {
                    ctx.var_to_alias.insert(
                        name.clone(),
                        EmitAlias::CarriedEntity(CarriedEntity {
                            id: format!("{stage_name}.{id}"),
                            properties: format!("{stage_name}.{properties}"),
                            labels: format!("{stage_name}.{labels}"),
                        }),
                    );
                }
            }
        }
        ctx
    }

    /// `.id`-equivalent SQL for a bound variable: the alias's `.id` column
    /// if it's still a live entity, the column text itself if it was
    /// narrowed to a plain scalar by a `WITH`, or the carried id column if
    /// it crossed a `WITH` as a node/relationship variable.
    pub(super) fn id_sql(&self, name: &str) -> Option<String> {
        match self.var_to_alias.get(name)? {
            EmitAlias::Entity(alias) => Some(format!("{alias}.id")),
            EmitAlias::Column(sql) => Some(sql.clone()),
            EmitAlias::CarriedEntity(carried) => Some(carried.id.clone()),
        }
    }

    pub(super) fn from_sql(&self) -> String {
        let mut plain = Vec::new();
        let mut joins = String::new();
        for entry in &self.from_list {
            match entry {
                FromEntry::Plain(text) => plain.push(text.clone()),
                FromEntry::LeftJoin(text, on) => {
                    let on_sql = if on.is_empty() {
                        "TRUE".to_string()
                    } else {
                        on.join(" AND ")
                    };
                    joins.push_str(&format!("\nLEFT JOIN {text} ON {on_sql}"));
                }
            }
        }
        format!("{}{}", plain.join(", "), joins)
    }

    pub(super) fn where_sql(&self) -> Option<String> {
        if self.where_conditions.is_empty() {
            None
        } else {
            Some(self.where_conditions.join("\n  AND "))
        }
    }
}
