//! Walks the lowered [`ast::Query`] and assembles parameterized SQL.
//!
//! A query is emitted stage by stage: each `MATCH`/`OPTIONAL MATCH`/`UNWIND`
//! accumulates `FROM`/`WHERE` state into a [`context::StageContext`]; each
//! `WITH` finalizes that state into a `SELECT`, wraps it as a CTE, and
//! starts a fresh context seeded from the CTE's columns; the terminal
//! `RETURN` finalizes the last stage into the outermost `SELECT` and hoists
//! every CTE collected along the way into one top-level `WITH` (or `WITH
//! RECURSIVE`, if any variable-length path introduced a recursive one).

mod alias;
mod context;
pub mod errors;
mod expr;
mod filter_builder;
mod pattern_builder;
mod select_builder;

pub use errors::{EmitError, EmitErrorKind};

use crate::ast;
use crate::config::TranslateOptions;
use alias::Emitter;
use context::{EmitAlias, FromEntry, StageContext};
use expr::render_expression;
use filter_builder::build_where;
use pattern_builder::{build_patterns_into_context, JoinMode};
use select_builder::{
    build_order_by, build_projection, implicit_group_by, render_skip_limit, to_projected_vars, ProjectedColumn,
    StageKind,
};

/// The ordered mapping from a query's `$name` parameters to the Postgres
/// `$n` placeholder position each was assigned. Repeated references to the
/// same name reuse the same position (§8 invariants).
///
/// Serializes as a JSON object in encounter order (the ambient stack's
/// `serde_json` carries the `preserve_order` feature for exactly this).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamBinding(Vec<ParamEntry>);

#[derive(Debug, Clone, PartialEq)]
struct ParamEntry {
    name: String,
    position: usize,
}

impl serde::Serialize for ParamBinding {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in &self.0 {
            map.serialize_entry(&entry.name, &entry.position)?;
        }
        map.end()
    }
}

impl ParamBinding {
    pub(super) fn new() -> Self {
        ParamBinding(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|e| (e.name.as_str(), e.position))
    }

    /// Returns the placeholder position for `name`, allocating a fresh one
    /// (in encounter order, 1-based for `$n`) the first time it's seen.
    pub(super) fn position_for(&mut self, name: &str) -> usize {
        if let Some(entry) = self.0.iter().find(|e| e.name == name) {
            return entry.position;
        }
        let position = self.0.len() + 1;
        self.0.push(ParamEntry {
            name: name.to_string(),
            position,
        });
        position
    }
}

/// What [`emit_query`] hands back to [`crate::translate`]: finished SQL text
/// plus the parameter binding collected while rendering it.
pub(crate) struct EmitOutput {
    pub(crate) sql: String,
    pub(crate) params: ParamBinding,
}

pub fn emit_query(query: &ast::Query, options: &TranslateOptions) -> Result<EmitOutput, EmitError> {
    let mut emitter = Emitter::new(options.clone());
    let mut ctx = StageContext::new();
    let mut top_level_ctes: Vec<String> = Vec::new();

    for clause in &query.clauses {
        match clause {
            ast::Clause::Match(m) => {
                let mode = if m.optional { JoinMode::Optional } else { JoinMode::Mandatory };
                build_patterns_into_context(&m.patterns, mode, &mut ctx, &mut emitter)?;
                if let Some(w) = &m.where_clause {
                    let sql = render_expression(w, &ctx, &mut emitter)?;
                    ctx.where_conditions.push(sql);
                }
            }
            ast::Clause::Unwind(u) => build_unwind(u, &mut ctx, &mut emitter)?,
            ast::Clause::With(w) => {
                let columns = build_projection(&w.items, StageKind::Intermediate, &ctx, &mut emitter)?;
                let group_by = implicit_group_by(&columns);
                let order_by = build_order_by(&w.order_by, &ctx, &mut emitter)?;
                let where_sql = build_where(&ctx, w.where_clause.as_ref(), &mut emitter)?;
                let limit_sql = render_skip_limit(w.limit.as_ref(), &ctx, &mut emitter)?;
                let skip_sql = render_skip_limit(w.skip.as_ref(), &ctx, &mut emitter)?;

                top_level_ctes.append(&mut ctx.ctes);
                let select_sql = assemble_select(
                    &columns,
                    w.distinct,
                    &ctx,
                    where_sql.as_deref(),
                    group_by.as_deref(),
                    order_by.as_deref(),
                    limit_sql.as_deref(),
                    skip_sql.as_deref(),
                );

                let stage_name = emitter.fresh_cte_name("stage");
                top_level_ctes.push(format!("{stage_name} AS (\n{select_sql}\n)"));

                let projected = to_projected_vars(&columns);
                ctx = StageContext::from_stage(&stage_name, &projected);
            }
            ast::Clause::Return(r) => {
                let columns = build_projection(&r.items, StageKind::Terminal, &ctx, &mut emitter)?;
                let group_by = implicit_group_by(&columns);
                let order_by = build_order_by(&r.order_by, &ctx, &mut emitter)?;
                let where_sql = build_where(&ctx, None, &mut emitter)?;
                let limit_sql = render_skip_limit(r.limit.as_ref(), &ctx, &mut emitter)?;
                let skip_sql = render_skip_limit(r.skip.as_ref(), &ctx, &mut emitter)?;

                top_level_ctes.append(&mut ctx.ctes);
                let select_sql = assemble_select(
                    &columns,
                    r.distinct,
                    &ctx,
                    where_sql.as_deref(),
                    group_by.as_deref(),
                    order_by.as_deref(),
                    limit_sql.as_deref(),
                    skip_sql.as_deref(),
                );

                let mut sql = String::new();
                if !top_level_ctes.is_empty() {
                    let keyword = if emitter.has_recursive_cte { "WITH RECURSIVE" } else { "WITH" };
                    sql.push_str(keyword);
                    sql.push(' ');
                    sql.push_str(&top_level_ctes.join(",\n"));
                    sql.push('\n');
                }
                sql.push_str(&select_sql);

                return Ok(EmitOutput {
                    sql,
                    params: emitter.params,
                });
            }
        }
    }

    // The parser requires a terminal RETURN (§4.2), so the loop above
    // always returns before falling through.
    unreachable!("a parsed query always ends in RETURN")
}

/// `UNWIND expr AS var` compiles to `unnest(expr) AS alias(value)`; `var`
/// becomes a plain scalar column, not an entity (it may hold any JSON
/// value, not just ids).
fn build_unwind(u: &ast::UnwindClause, ctx: &mut StageContext, emitter: &mut Emitter) -> Result<(), EmitError> {
    let list_sql = render_expression(&u.expression, ctx, emitter)?;
    let alias = emitter.fresh_alias(&u.as_var);
    ctx.from_list
        .push(FromEntry::Plain(format!("unnest({list_sql}) AS {alias}(value)")));
    ctx.var_to_alias
        .insert(u.as_var.clone(), EmitAlias::Column(format!("{alias}.value")));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn assemble_select(
    columns: &[ProjectedColumn],
    distinct: bool,
    ctx: &StageContext,
    where_sql: Option<&str>,
    group_by: Option<&str>,
    order_by: Option<&str>,
    limit_sql: Option<&str>,
    skip_sql: Option<&str>,
) -> String {
    let mut sql = String::from("SELECT ");
    if distinct {
        sql.push_str("DISTINCT ");
    }
    let cols: Vec<&str> = columns.iter().map(|c| c.sql.as_str()).collect();
    sql.push_str(&cols.join(", "));
    sql.push_str("\nFROM ");
    sql.push_str(&ctx.from_sql());
    if let Some(w) = where_sql {
        sql.push_str("\nWHERE ");
        sql.push_str(w);
    }
    if let Some(g) = group_by {
        sql.push_str("\nGROUP BY ");
        sql.push_str(g);
    }
    if let Some(o) = order_by {
        sql.push_str("\nORDER BY ");
        sql.push_str(o);
    }
    if let Some(l) = limit_sql {
        sql.push_str("\nLIMIT ");
        sql.push_str(l);
    }
    if let Some(s) = skip_sql {
        sql.push_str("\nOFFSET ");
        sql.push_str(s);
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Span;

    fn dummy_span() -> Span {
        Span::new(0, 0, 1, 1)
    }

    fn var(name: &str) -> ast::Expression {
        ast::Expression::Variable {
            name: name.to_string(),
            span: dummy_span(),
        }
    }

    #[test]
    fn emits_simple_match_return() {
        let query = ast::Query {
            clauses: vec![
                ast::Clause::Match(ast::MatchClause {
                    patterns: vec![ast::Pattern {
                        nodes: vec![ast::NodePattern {
                            variable: "n".to_string(),
                            is_anonymous: false,
                            labels: vec!["Person".to_string()],
                            properties: vec![],
                            span: dummy_span(),
                        }],
                        rels: vec![],
                        span: dummy_span(),
                    }],
                    optional: false,
                    where_clause: None,
                    span: dummy_span(),
                }),
                ast::Clause::Return(ast::ReturnClause {
                    items: vec![ast::Projection {
                        expression: var("n"),
                        alias: None,
                        span: dummy_span(),
                    }],
                    distinct: false,
                    order_by: vec![],
                    skip: None,
                    limit: None,
                    span: dummy_span(),
                }),
            ],
        };

        let options = TranslateOptions::default();
        let output = emit_query(&query, &options).expect("should emit");
        assert!(output.sql.contains("FROM pgraf.nodes AS n_0"));
        assert!(output.sql.contains("'Person' = ANY(n_0.labels)"));
        assert!(output.sql.contains("n_0.*"));
        assert!(output.params.is_empty());
    }

    #[test]
    fn dedupes_repeated_parameters() {
        let query = ast::Query {
            clauses: vec![
                ast::Clause::Match(ast::MatchClause {
                    patterns: vec![ast::Pattern {
                        nodes: vec![ast::NodePattern {
                            variable: "n".to_string(),
                            is_anonymous: false,
                            labels: vec![],
                            properties: vec![],
                            span: dummy_span(),
                        }],
                        rels: vec![],
                        span: dummy_span(),
                    }],
                    optional: false,
                    where_clause: Some(ast::Expression::Binary {
                        op: ast::BinaryOp::Or,
                        lhs: Box::new(ast::Expression::Binary {
                            op: ast::BinaryOp::Eq,
                            lhs: Box::new(ast::Expression::Property {
                                base: Box::new(var("n")),
                                property: "name".to_string(),
                                span: dummy_span(),
                            }),
                            rhs: Box::new(ast::Expression::Parameter {
                                name: "name".to_string(),
                                span: dummy_span(),
                            }),
                            span: dummy_span(),
                        }),
                        rhs: Box::new(ast::Expression::Binary {
                            op: ast::BinaryOp::Eq,
                            lhs: Box::new(ast::Expression::Property {
                                base: Box::new(var("n")),
                                property: "nickname".to_string(),
                                span: dummy_span(),
                            }),
                            rhs: Box::new(ast::Expression::Parameter {
                                name: "name".to_string(),
                                span: dummy_span(),
                            }),
                            span: dummy_span(),
                        }),
                        span: dummy_span(),
                    }),
                    span: dummy_span(),
                }),
                ast::Clause::Return(ast::ReturnClause {
                    items: vec![ast::Projection {
                        expression: var("n"),
                        alias: None,
                        span: dummy_span(),
                    }],
                    distinct: false,
                    order_by: vec![],
                    skip: None,
                    limit: None,
                    span: dummy_span(),
                }),
            ],
        };

        let options = TranslateOptions::default();
        let output = emit_query(&query, &options).expect("should emit");
        assert_eq!(output.params.len(), 1);
        assert!(output.sql.matches("$1").count() >= 2);
    }
}
