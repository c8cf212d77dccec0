//! Turns AST patterns into `FROM` entries, join predicates, and (for
//! variable-length relationships) recursive path CTEs. Shared by top-level
//! `MATCH`/`OPTIONAL MATCH` processing and by `EXISTS { ... }` subqueries.

use super::alias::Emitter;
use super::context::{CarriedEntity, EmitAlias, FromEntry, StageContext};
use super::errors::{EmitError, EmitErrorKind};
use super::expr::render_expression;
use crate::ast;

/// Whether new table references introduced while walking a pattern are
/// mandatory (comma-joined, filtered in `WHERE`) or optional (`LEFT JOIN`,
/// filtered in their own `ON` clause).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum JoinMode {
    Mandatory,
    Optional,
}

pub(super) fn build_patterns_into_context(
    patterns: &[ast::Pattern],
    mode: JoinMode,
    ctx: &mut StageContext,
    emitter: &mut Emitter,
) -> Result<(), EmitError> {
    for pattern in patterns {
        for node in &pattern.nodes {
            build_node(node, mode, ctx, emitter)?;
        }
        for rel in &pattern.rels {
            match rel.length {
                ast::Length::Single => build_rel(rel, mode, ctx, emitter)?,
                ast::Length::Range(min, max) => {
                    build_variable_length_rel(rel, min, max, mode, ctx, emitter)?
                }
            }
        }
    }
    Ok(())
}

fn build_node(
    node: &ast::NodePattern,
    mode: JoinMode,
    ctx: &mut StageContext,
    emitter: &mut Emitter,
) -> Result<(), EmitError> {
    if ctx.var_to_alias.contains_key(&node.variable) {
        // Already bound (a reused variable, or a variable carried through a
        // prior `WITH`) — only its fresh predicates, if any, need adding.
        match &ctx.var_to_alias[&node.variable] {
            EmitAlias::Entity(alias) => {
                let alias = alias.clone();
                return add_node_predicates(&alias, node, mode, ctx, emitter);
            }
            EmitAlias::Column(_) => return Ok(()), // properties unavailable post-WITH; nothing to add
            EmitAlias::CarriedEntity(carried) => {
                let carried = carried.clone();
                return add_carried_node_predicates(&carried, node, ctx, emitter);
            }
        }
    }

    let alias = emitter.fresh_alias(&node.variable);
    let table = format!("{}.nodes AS {}", emitter.options.schema, alias);
    ctx.var_to_alias
        .insert(node.variable.clone(), EmitAlias::Entity(alias.clone()));

    match mode {
        JoinMode::Mandatory => ctx.from_list.push(FromEntry::Plain(table)),
        JoinMode::Optional => ctx.from_list.push(FromEntry::LeftJoin(table, Vec::new())),
    }
    add_node_predicates(&alias, node, mode, ctx, emitter)
}

fn add_node_predicates(
    alias: &str,
    node: &ast::NodePattern,
    mode: JoinMode,
    ctx: &mut StageContext,
    emitter: &mut Emitter,
) -> Result<(), EmitError> {
    let mut predicates = Vec::new();
    for label in &node.labels {
        predicates.push(label_predicate(alias, label));
    }
    for (key, value) in &node.properties {
        predicates.push(property_equality(alias, key, value, ctx, emitter)?);
    }
    push_predicates(alias, predicates, mode, ctx);
    Ok(())
}

/// Same as [`add_node_predicates`], but for a node variable carried through
/// a `WITH` boundary: it has no single table alias, so predicates key off
/// its carried `labels`/`properties` columns directly and always land in
/// the stage's `WHERE` clause — a carried variable has no `LEFT JOIN` entry
/// of its own to attach an optional predicate to.
fn add_carried_node_predicates(
    carried: &CarriedEntity,
    node: &ast::NodePattern,
    ctx: &mut StageContext,
    emitter: &mut Emitter,
) -> Result<(), EmitError> {
    let mut predicates = Vec::new();
    for label in &node.labels {
        predicates.push(format!(
            "'{}' = ANY({})",
            escape_sql_string(label),
            carried.labels
        ));
    }
    for (key, value) in &node.properties {
        let value_sql = render_expression(value, ctx, emitter)?;
        let accessor = format!("({}) ->> '{}'", carried.properties, escape_sql_string(key));
        predicates.push(match value {
            ast::Expression::Literal(ast::Literal::Int(_), _)
            | ast::Expression::Literal(ast::Literal::Float(_), _) => {
                format!("({accessor})::numeric = {value_sql}")
            }
            ast::Expression::Literal(ast::Literal::Bool(_), _) => {
                format!("({accessor})::boolean = {value_sql}")
            }
            _ => format!("{accessor} = {value_sql}"),
        });
    }
    ctx.where_conditions.extend(predicates);
    Ok(())
}

fn build_rel(
    rel: &ast::RelPattern,
    mode: JoinMode,
    ctx: &mut StageContext,
    emitter: &mut Emitter,
) -> Result<(), EmitError> {
    let alias = emitter.fresh_alias(&rel.variable);
    let table = format!("{}.edges AS {}", emitter.options.schema, alias);
    ctx.var_to_alias
        .insert(rel.variable.clone(), EmitAlias::Entity(alias.clone()));

    let from_id = require_id(ctx, &rel.from, rel.span)?;
    let to_id = require_id(ctx, &rel.to, rel.span)?;

    let mut predicates = vec![match rel.direction {
        ast::Direction::Out => format!("{from_id} = {alias}.source AND {alias}.target = {to_id}"),
        ast::Direction::Undirected => format!(
            "(({from_id} = {alias}.source AND {to_id} = {alias}.target) OR \
              ({from_id} = {alias}.target AND {to_id} = {alias}.source))"
        ),
    }];

    if !rel.labels.is_empty() {
        let disjuncts: Vec<String> = rel.labels.iter().map(|l| label_predicate(&alias, l)).collect();
        predicates.push(format!("({})", disjuncts.join(" OR ")));
    }
    for (key, value) in &rel.properties {
        predicates.push(property_equality(&alias, key, value, ctx, emitter)?);
    }

    match mode {
        JoinMode::Mandatory => {
            ctx.from_list.push(FromEntry::Plain(table));
            ctx.where_conditions.extend(predicates);
        }
        JoinMode::Optional => ctx.from_list.push(FromEntry::LeftJoin(table, predicates)),
    }
    Ok(())
}

/// `(a:X)-[r:T*min..max]->(b)` compiles to a recursive CTE over the edge
/// table producing `(start_id, end_id, depth)` reachability triples,
/// joined to the pattern's two node aliases (§4.4.3).
fn build_variable_length_rel(
    rel: &ast::RelPattern,
    min: Option<u32>,
    max: Option<u32>,
    mode: JoinMode,
    ctx: &mut StageContext,
    emitter: &mut Emitter,
) -> Result<(), EmitError> {
    let max = max.unwrap_or(emitter.options.max_variable_path_depth);
    if max == 0 {
        return Err(EmitError::new(EmitErrorKind::ZeroDepthVariableLength, rel.span));
    }
    let min = min.unwrap_or(1);

    let cte_name = emitter.fresh_cte_name("path");
    let schema = emitter.options.schema.clone();
    let label_pred = if rel.labels.is_empty() {
        "TRUE".to_string()
    } else {
        let disjuncts: Vec<String> = rel
            .labels
            .iter()
            .map(|l| format!("'{}' = ANY(labels)", escape_sql_string(l)))
            .collect();
        format!("({})", disjuncts.join(" OR "))
    };

    let base_forward = format!(
        "SELECT source AS start_id, target AS end_id, ARRAY[source, target] AS path, 1 AS depth\n  \
           FROM {schema}.edges\n  \
           WHERE {label_pred}"
    );
    let step_forward = format!(
        "SELECT p.start_id, e.target, p.path || e.target, p.depth + 1\n  \
           FROM {cte_name} p\n  \
           JOIN {schema}.edges e ON e.source = p.end_id\n  \
           WHERE {label_pred} AND NOT (e.target = ANY(p.path)) AND p.depth + 1 <= {max}"
    );

    let (base_sql, step_sql) = match rel.direction {
        ast::Direction::Out => (base_forward, step_forward),
        ast::Direction::Undirected => {
            let base_reverse = format!(
                "SELECT target AS start_id, source AS end_id, ARRAY[target, source] AS path, 1 AS depth\n  \
                   FROM {schema}.edges\n  \
                   WHERE {label_pred}"
            );
            let step_reverse = format!(
                "SELECT p.start_id, e.source, p.path || e.source, p.depth + 1\n  \
                   FROM {cte_name} p\n  \
                   JOIN {schema}.edges e ON e.target = p.end_id\n  \
                   WHERE {label_pred} AND NOT (e.source = ANY(p.path)) AND p.depth + 1 <= {max}"
            );
            (
                format!("{base_forward}\n  UNION ALL\n  {base_reverse}"),
                format!("{step_forward}\n  UNION ALL\n  {step_reverse}"),
            )
        }
    };

    let cte_sql = format!("{cte_name} AS (\n  {base_sql}\n  UNION ALL\n  {step_sql}\n)");
    ctx.ctes.push(cte_sql);
    emitter.has_recursive_cte = true;

    let alias = emitter.fresh_alias(&format!("{}_path", rel.variable));
    ctx.var_to_alias
        .insert(rel.variable.clone(), EmitAlias::Entity(alias.clone()));

    let from_id = require_id(ctx, &rel.from, rel.span)?;
    let to_id = require_id(ctx, &rel.to, rel.span)?;
    let table = format!("{cte_name} AS {alias}");
    let predicates = vec![
        format!("{alias}.depth >= {min} AND {alias}.depth <= {max}"),
        format!("{from_id} = {alias}.start_id AND {to_id} = {alias}.end_id"),
    ];

    match mode {
        JoinMode::Mandatory => {
            ctx.from_list.push(FromEntry::Plain(table));
            ctx.where_conditions.extend(predicates);
        }
        JoinMode::Optional => ctx.from_list.push(FromEntry::LeftJoin(table, predicates)),
    }
    Ok(())
}

fn push_predicates(
    alias: &str,
    predicates: Vec<String>,
    mode: JoinMode,
    ctx: &mut StageContext,
) {
    if predicates.is_empty() {
        return;
    }
    match mode {
        JoinMode::Mandatory => ctx.where_conditions.extend(predicates),
        JoinMode::Optional => {
            for entry in ctx.from_list.iter_mut().rev() {
                if let FromEntry::LeftJoin(text, on) = entry {
                    if text.ends_with(&format!(" AS {alias}")) {
                        on.extend(predicates);
                        return;
                    }
                }
            }
            // No matching LEFT JOIN entry (the alias was reused from a
            // mandatory scope) — fall back to a global conjunct.
            ctx.where_conditions.extend(predicates);
        }
    }
}

fn require_id(ctx: &StageContext, name: &str, span: crate::error::Span) -> Result<String, EmitError> {
    ctx.id_sql(name).ok_or_else(|| {
        EmitError::new(
            EmitErrorKind::UnknownFunction(format!("internal: unbound variable `{name}`")),
            span,
        )
    })
}

pub(super) fn label_predicate(alias: &str, label: &str) -> String {
    format!("'{}' = ANY({alias}.labels)", escape_sql_string(label))
}

fn property_equality(
    alias: &str,
    key: &str,
    value: &ast::Expression,
    ctx: &StageContext,
    emitter: &mut Emitter,
) -> Result<String, EmitError> {
    let value_sql = render_expression(value, ctx, emitter)?;
    let accessor = format!("{alias}.properties ->> '{}'", escape_sql_string(key));
    Ok(match value {
        ast::Expression::Literal(ast::Literal::Int(_), _)
        | ast::Expression::Literal(ast::Literal::Float(_), _) => {
            format!("({accessor})::numeric = {value_sql}")
        }
        ast::Expression::Literal(ast::Literal::Bool(_), _) => {
            format!("({accessor})::boolean = {value_sql}")
        }
        _ => format!("{accessor} = {value_sql}"),
    })
}

pub(super) fn escape_sql_string(s: &str) -> String {
    s.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TranslateOptions;
    use crate::error::Span;

    fn span() -> Span {
        Span::new(0, 0, 1, 1)
    }

    fn emitter() -> Emitter {
        Emitter::new(TranslateOptions::default())
    }

    fn node(variable: &str, labels: &[&str]) -> ast::NodePattern {
        ast::NodePattern {
            variable: variable.to_string(),
            is_anonymous: false,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties: Vec::new(),
            span: span(),
        }
    }

    #[test]
    fn mandatory_node_adds_plain_from_entry_and_label_predicate() {
        let mut ctx = StageContext::new();
        let mut e = emitter();
        build_node(&node("n", &["User"]), JoinMode::Mandatory, &mut ctx, &mut e).unwrap();
        assert!(matches!(ctx.from_list[0], FromEntry::Plain(_)));
        assert!(ctx.where_conditions[0].contains("'User' = ANY(n_0.labels)"));
    }

    #[test]
    fn optional_node_attaches_predicates_to_its_own_left_join() {
        let mut ctx = StageContext::new();
        let mut e = emitter();
        build_node(&node("p", &["Post"]), JoinMode::Optional, &mut ctx, &mut e).unwrap();
        match &ctx.from_list[0] {
            FromEntry::LeftJoin(text, on) => {
                assert!(text.contains("AS p_0"));
                assert!(on[0].contains("'Post' = ANY(p_0.labels)"));
            }
            other => panic!("expected a LEFT JOIN entry, got {other:?}"),
        }
        assert!(ctx.where_conditions.is_empty());
    }

    #[test]
    fn variable_length_relationship_bounds_depth_and_sets_recursive_flag() {
        let mut ctx = StageContext::new();
        let mut e = emitter();
        ctx.var_to_alias
            .insert("a".to_string(), EmitAlias::Entity("a_0".to_string()));
        ctx.var_to_alias
            .insert("b".to_string(), EmitAlias::Entity("b_0".to_string()));
        let rel = ast::RelPattern {
            variable: "r".to_string(),
            is_anonymous: false,
            labels: vec!["FOLLOWS".to_string()],
            direction: ast::Direction::Out,
            from: "a".to_string(),
            to: "b".to_string(),
            properties: Vec::new(),
            length: ast::Length::Range(Some(1), Some(3)),
            span: span(),
        };
        build_variable_length_rel(&rel, Some(1), Some(3), JoinMode::Mandatory, &mut ctx, &mut e).unwrap();
        assert!(e.has_recursive_cte);
        assert_eq!(ctx.ctes.len(), 1);
        assert!(ctx.ctes[0].contains("UNION ALL"));
        assert!(ctx.where_conditions.iter().any(|c| c.contains(">= 1") && c.contains("<= 3")));
    }

    #[test]
    fn undirected_variable_length_relationship_unions_both_orientations() {
        let mut ctx = StageContext::new();
        let mut e = emitter();
        ctx.var_to_alias
            .insert("a".to_string(), EmitAlias::Entity("a_0".to_string()));
        ctx.var_to_alias
            .insert("b".to_string(), EmitAlias::Entity("b_0".to_string()));
        let rel = ast::RelPattern {
            variable: "r".to_string(),
            is_anonymous: false,
            labels: vec!["FOLLOWS".to_string()],
            direction: ast::Direction::Undirected,
            from: "a".to_string(),
            to: "b".to_string(),
            properties: Vec::new(),
            length: ast::Length::Range(Some(1), Some(3)),
            span: span(),
        };
        build_variable_length_rel(&rel, Some(1), Some(3), JoinMode::Mandatory, &mut ctx, &mut e).unwrap();
        let cte = &ctx.ctes[0];
        assert_eq!(cte.matches("UNION ALL").count(), 3);
        assert!(cte.contains("e.source = p.end_id"));
        assert!(cte.contains("e.target = p.end_id"));
        assert!(cte.contains("target AS start_id, source AS end_id"));
    }

    #[test]
    fn zero_depth_variable_length_relationship_is_rejected() {
        let mut ctx = StageContext::new();
        let mut e = emitter();
        ctx.var_to_alias
            .insert("a".to_string(), EmitAlias::Entity("a_0".to_string()));
        ctx.var_to_alias
            .insert("b".to_string(), EmitAlias::Entity("b_0".to_string()));
        let rel = ast::RelPattern {
            variable: "r".to_string(),
            is_anonymous: false,
            labels: Vec::new(),
            direction: ast::Direction::Out,
            from: "a".to_string(),
            to: "b".to_string(),
            properties: Vec::new(),
            length: ast::Length::Range(Some(0), Some(0)),
            span: span(),
        };
        let err = build_variable_length_rel(&rel, Some(0), Some(0), JoinMode::Mandatory, &mut ctx, &mut e)
            .unwrap_err();
        assert_eq!(err.kind, EmitErrorKind::ZeroDepthVariableLength);
    }
}
