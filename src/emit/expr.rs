//! Renders a lowered [`ast::Expression`] to a SQL scalar expression,
//! registering parameters and correlated subqueries along the way.

use super::alias::Emitter;
use super::context::{EmitAlias, StageContext};
use super::errors::{EmitError, EmitErrorKind};
use super::pattern_builder::{build_patterns_into_context, escape_sql_string, JoinMode};
use crate::ast::{self, BinaryOp, Expression, Literal, UnaryOp};

pub(super) fn render_expression(
    expr: &Expression,
    ctx: &StageContext,
    emitter: &mut Emitter,
) -> Result<String, EmitError> {
    Ok(match expr {
        Expression::Variable { name, .. } => ctx
            .id_sql(name)
            .unwrap_or_else(|| format!("/* unbound: {name} */ NULL")),
        Expression::Property { base, property, .. } => render_property(base, property, ctx, emitter)?,
        Expression::LabelTest { base, label, .. } => render_label_test(base, label, ctx, emitter)?,
        Expression::Literal(lit, _) => render_literal(lit)?,
        Expression::Parameter { name, .. } => format!("${}", emitter.params.position_for(name)),
        Expression::Binary { op, lhs, rhs, span } => render_binary(*op, lhs, rhs, *span, ctx, emitter)?,
        Expression::Unary { op, expr, .. } => {
            let inner = render_expression(expr, ctx, emitter)?;
            match op {
                UnaryOp::Not => format!("NOT ({inner})"),
                UnaryOp::Neg => format!("-({inner})"),
            }
        }
        Expression::IsNull { expr, negated, .. } => {
            let inner = render_expression(expr, ctx, emitter)?;
            format!("{inner} IS {}NULL", if *negated { "NOT " } else { "" })
        }
        Expression::FunctionCall { name, args, span } => render_function(name, args, *span, ctx, emitter)?,
        Expression::Aggregate {
            name,
            distinct,
            arg,
            span,
        } => render_aggregate(name, *distinct, arg.as_deref(), *span, ctx, emitter)?,
        Expression::Exists(e) => render_exists(e, ctx, emitter)?,
        Expression::Case {
            operand,
            whens,
            else_branch,
            ..
        } => render_case(operand.as_deref(), whens, else_branch.as_deref(), ctx, emitter)?,
        Expression::List(items, _) => {
            let rendered: Vec<String> = items
                .iter()
                .map(|i| render_expression(i, ctx, emitter))
                .collect::<Result<_, _>>()?;
            format!("ARRAY[{}]", rendered.join(", "))
        }
        Expression::Map(entries, _) => render_map_literal(entries, ctx, emitter)?,
        Expression::Star(_) => unreachable!("Expression::Star is expanded away before emission"),
    })
}

fn render_property(
    base: &Expression,
    property: &str,
    ctx: &StageContext,
    emitter: &mut Emitter,
) -> Result<String, EmitError> {
    let escaped = escape_sql_string(property);
    if let Expression::Variable { name, .. } = base {
        match ctx.var_to_alias.get(name) {
            Some(EmitAlias::Entity(alias)) => {
                return Ok(format!("{alias}.properties ->> '{escaped}'"))
            }
            Some(EmitAlias::CarriedEntity(carried)) => {
                return Ok(format!("({}) ->> '{escaped}'", carried.properties))
            }
            Some(EmitAlias::Column(sql)) => return Ok(format!("({sql}) ->> '{escaped}'")),
            None => {}
        }
    }
    let base_sql = render_expression(base, ctx, emitter)?;
    Ok(format!("({base_sql}) ->> '{escaped}'"))
}

fn render_label_test(
    base: &Expression,
    label: &str,
    ctx: &StageContext,
    emitter: &mut Emitter,
) -> Result<String, EmitError> {
    let escaped = escape_sql_string(label);
    if let Expression::Variable { name, .. } = base {
        match ctx.var_to_alias.get(name) {
            Some(EmitAlias::Entity(alias)) => {
                return Ok(format!("'{escaped}' = ANY({alias}.labels)"))
            }
            Some(EmitAlias::CarriedEntity(carried)) => {
                return Ok(format!("'{escaped}' = ANY({})", carried.labels))
            }
            _ => {}
        }
    }
    let base_sql = render_expression(base, ctx, emitter)?;
    Ok(format!("'{escaped}' = ANY({base_sql})"))
}

fn render_literal(lit: &Literal) -> Result<String, EmitError> {
    Ok(match lit {
        Literal::Str(s) => format!("'{}'", escape_sql_string(s)),
        Literal::Int(n) => n.to_string(),
        Literal::Float(f) => f.to_string(),
        Literal::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Literal::Null => "NULL".to_string(),
        Literal::List(items) => {
            let rendered: Vec<String> = items.iter().map(render_literal).collect::<Result<_, _>>()?;
            format!("ARRAY[{}]", rendered.join(", "))
        }
        Literal::Map(entries) => format!("'{}'::jsonb", escape_sql_string(&literal_map_to_json(entries))),
    })
}

fn literal_map_to_json(entries: &[(String, Literal)]) -> String {
    let value = literal_list_to_value(entries);
    serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string())
}

fn literal_list_to_value(entries: &[(String, Literal)]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (k, v) in entries {
        map.insert(k.clone(), literal_to_value(v));
    }
    serde_json::Value::Object(map)
}

fn literal_to_value(lit: &Literal) -> serde_json::Value {
    match lit {
        Literal::Str(s) => serde_json::Value::String(s.clone()),
        Literal::Int(n) => serde_json::Value::from(*n),
        Literal::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Literal::Bool(b) => serde_json::Value::Bool(*b),
        Literal::Null => serde_json::Value::Null,
        Literal::List(items) => serde_json::Value::Array(items.iter().map(literal_to_value).collect()),
        Literal::Map(entries) => literal_list_to_value(entries),
    }
}

fn render_map_literal(
    entries: &[(String, Expression)],
    ctx: &StageContext,
    emitter: &mut Emitter,
) -> Result<String, EmitError> {
    // Map expressions aren't literals (values may reference parameters or
    // variables), so build a `jsonb_build_object(...)` call instead of a
    // JSON literal.
    let mut parts = Vec::with_capacity(entries.len() * 2);
    for (k, v) in entries {
        parts.push(format!("'{}'", escape_sql_string(k)));
        parts.push(render_expression(v, ctx, emitter)?);
    }
    Ok(format!("jsonb_build_object({})", parts.join(", ")))
}

fn render_binary(
    op: BinaryOp,
    lhs: &Expression,
    rhs: &Expression,
    _span: crate::error::Span,
    ctx: &StageContext,
    emitter: &mut Emitter,
) -> Result<String, EmitError> {
    let lhs_sql = render_expression(lhs, ctx, emitter)?;
    let rhs_sql = render_expression(rhs, ctx, emitter)?;
    Ok(match op {
        BinaryOp::Add => format!("({lhs_sql} + {rhs_sql})"),
        BinaryOp::Sub => format!("({lhs_sql} - {rhs_sql})"),
        BinaryOp::Mul => format!("({lhs_sql} * {rhs_sql})"),
        BinaryOp::Div => format!("({lhs_sql} / {rhs_sql})"),
        BinaryOp::Mod => format!("({lhs_sql} % {rhs_sql})"),
        BinaryOp::And => format!("({lhs_sql} AND {rhs_sql})"),
        BinaryOp::Or => format!("({lhs_sql} OR {rhs_sql})"),
        BinaryOp::In => format!("({lhs_sql} = ANY({rhs_sql}))"),
        BinaryOp::Contains => format!(
            r"({lhs_sql} LIKE '%' || {} || '%' ESCAPE '\')",
            escape_like_operand(&rhs_sql)
        ),
        BinaryOp::StartsWith => format!(
            r"({lhs_sql} LIKE {} || '%' ESCAPE '\')",
            escape_like_operand(&rhs_sql)
        ),
        BinaryOp::EndsWith => format!(
            r"({lhs_sql} LIKE '%' || {} ESCAPE '\')",
            escape_like_operand(&rhs_sql)
        ),
        BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            let operator = comparison_operator(op);
            let (lhs_sql, rhs_sql) = apply_comparison_casts(lhs, rhs, lhs_sql, rhs_sql);
            format!("({lhs_sql} {operator} {rhs_sql})")
        }
    })
}

/// Escapes literal `%`/`_`/`\` in a `LIKE` pattern operand so `CONTAINS`,
/// `STARTS WITH` and `ENDS WITH` test for a literal substring rather than a
/// wildcard pattern (§4.4.4).
fn escape_like_operand(sql: &str) -> String {
    format!(r"replace(replace(replace({sql}, '\', '\\'), '%', '\%'), '_', '\_')")
}

fn comparison_operator(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Eq => "=",
        BinaryOp::NotEq => "<>",
        BinaryOp::Lt => "<",
        BinaryOp::LtEq => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::GtEq => ">=",
        _ => unreachable!("only called for comparison operators"),
    }
}

/// A property accessor (`x.prop`) renders as JSON text; when compared
/// against a numeric or boolean literal on the other side, cast it so the
/// comparison isn't a text comparison against `"5"` (§4.4.4).
fn apply_comparison_casts(
    lhs: &Expression,
    rhs: &Expression,
    lhs_sql: String,
    rhs_sql: String,
) -> (String, String) {
    let lhs_is_property = matches!(lhs, Expression::Property { .. });
    let rhs_is_property = matches!(rhs, Expression::Property { .. });
    if lhs_is_property && !rhs_is_property {
        if let Some(cast) = literal_cast(rhs) {
            return (format!("({lhs_sql})::{cast}"), rhs_sql);
        }
    }
    if rhs_is_property && !lhs_is_property {
        if let Some(cast) = literal_cast(lhs) {
            return (lhs_sql, format!("({rhs_sql})::{cast}"));
        }
    }
    (lhs_sql, rhs_sql)
}

fn literal_cast(expr: &Expression) -> Option<&'static str> {
    match expr {
        Expression::Literal(Literal::Int(_), _) | Expression::Literal(Literal::Float(_), _) => {
            Some("numeric")
        }
        Expression::Literal(Literal::Bool(_), _) => Some("boolean"),
        _ => None,
    }
}

fn render_function(
    name: &str,
    args: &[Expression],
    span: crate::error::Span,
    ctx: &StageContext,
    emitter: &mut Emitter,
) -> Result<String, EmitError> {
    let rendered: Vec<String> = args
        .iter()
        .map(|a| render_expression(a, ctx, emitter))
        .collect::<Result<_, _>>()?;
    let lowered = name.to_ascii_lowercase();
    let sql = match lowered.as_str() {
        "tointeger" | "toint" => format!("({})::integer", require_one(&rendered, name, span)?),
        "tofloat" => format!("({})::double precision", require_one(&rendered, name, span)?),
        "tostring" => format!("({})::text", require_one(&rendered, name, span)?),
        "tolower" => format!("lower({})", require_one(&rendered, name, span)?),
        "toupper" => format!("upper({})", require_one(&rendered, name, span)?),
        "trim" => format!("trim({})", require_one(&rendered, name, span)?),
        "size" => format!("jsonb_array_length({})", require_one(&rendered, name, span)?),
        "coalesce" => format!("coalesce({})", rendered.join(", ")),
        "id" => require_one(&rendered, name, span)?,
        _ => return Err(EmitError::new(EmitErrorKind::UnknownFunction(name.to_string()), span)),
    };
    Ok(sql)
}

fn require_one(rendered: &[String], name: &str, span: crate::error::Span) -> Result<String, EmitError> {
    rendered
        .first()
        .cloned()
        .ok_or_else(|| EmitError::new(EmitErrorKind::UnknownFunction(format!("{name} requires one argument")), span))
}

fn render_aggregate(
    name: &str,
    distinct: bool,
    arg: Option<&Expression>,
    span: crate::error::Span,
    ctx: &StageContext,
    emitter: &mut Emitter,
) -> Result<String, EmitError> {
    let lowered = name.to_ascii_lowercase();
    let sql_fn = match lowered.as_str() {
        "count" => "COUNT",
        "sum" => "SUM",
        "avg" => "AVG",
        "min" => "MIN",
        "max" => "MAX",
        "collect" => "jsonb_agg",
        _ => return Err(EmitError::new(EmitErrorKind::UnknownAggregate(name.to_string()), span)),
    };
    let distinct_sql = if distinct { "DISTINCT " } else { "" };
    let arg_sql = match arg {
        Some(a) => render_expression(a, ctx, emitter)?,
        None => "*".to_string(),
    };
    Ok(format!("{sql_fn}({distinct_sql}{arg_sql})"))
}

fn render_case(
    operand: Option<&Expression>,
    whens: &[(Expression, Expression)],
    else_branch: Option<&Expression>,
    ctx: &StageContext,
    emitter: &mut Emitter,
) -> Result<String, EmitError> {
    let operand_sql = operand.map(|o| render_expression(o, ctx, emitter)).transpose()?;
    let mut sql = String::from("CASE");
    for (cond, result) in whens {
        let cond_sql = render_expression(cond, ctx, emitter)?;
        let result_sql = render_expression(result, ctx, emitter)?;
        match &operand_sql {
            Some(op) => sql.push_str(&format!(" WHEN {op} = {cond_sql} THEN {result_sql}")),
            None => sql.push_str(&format!(" WHEN {cond_sql} THEN {result_sql}")),
        }
    }
    if let Some(else_expr) = else_branch {
        sql.push_str(&format!(" ELSE {}", render_expression(else_expr, ctx, emitter)?));
    }
    sql.push_str(" END");
    Ok(sql)
}

fn render_exists(
    subquery: &ast::ExistsSubquery,
    outer_ctx: &StageContext,
    emitter: &mut Emitter,
) -> Result<String, EmitError> {
    let mut inner_ctx = StageContext {
        var_to_alias: outer_ctx.var_to_alias.clone(),
        ..StageContext::new()
    };
    build_patterns_into_context(&subquery.patterns, JoinMode::Mandatory, &mut inner_ctx, emitter)?;
    if let Some(w) = &subquery.where_clause {
        let sql = render_expression(w, &inner_ctx, emitter)?;
        inner_ctx.where_conditions.push(sql);
    }

    let ctes_prefix = if inner_ctx.ctes.is_empty() {
        String::new()
    } else {
        emitter.has_recursive_cte = true;
        format!("WITH RECURSIVE {}\n", inner_ctx.ctes.join(",\n"))
    };
    let where_sql = inner_ctx.where_sql().unwrap_or_else(|| "TRUE".to_string());
    Ok(format!(
        "EXISTS ({ctes_prefix}SELECT 1 FROM {} WHERE {where_sql})",
        inner_ctx.from_sql()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TranslateOptions;
    use crate::error::Span;

    fn span() -> Span {
        Span::new(0, 0, 1, 1)
    }

    fn ctx_with_entity(var: &str, alias: &str) -> StageContext {
        let mut ctx = StageContext::new();
        ctx.var_to_alias
            .insert(var.to_string(), EmitAlias::Entity(alias.to_string()));
        ctx
    }

    fn emitter() -> Emitter {
        Emitter::new(TranslateOptions::default())
    }

    fn var(name: &str) -> Expression {
        Expression::Variable {
            name: name.to_string(),
            span: span(),
        }
    }

    fn int_lit(n: i64) -> Expression {
        Expression::Literal(Literal::Int(n), span())
    }

    #[test]
    fn property_access_on_entity_reads_jsonb() {
        let ctx = ctx_with_entity("n", "n_0");
        let mut e = emitter();
        let sql = render_property(&var("n"), "age", &ctx, &mut e).unwrap();
        assert_eq!(sql, "n_0.properties ->> 'age'");
    }

    #[test]
    fn numeric_comparison_against_property_casts_both_sides() {
        let ctx = ctx_with_entity("n", "n_0");
        let mut e = emitter();
        let prop = Expression::Property {
            base: Box::new(var("n")),
            property: "age".to_string(),
            span: span(),
        };
        let sql = render_binary(BinaryOp::Gt, &prop, &int_lit(25), span(), &ctx, &mut e).unwrap();
        assert!(sql.contains("::numeric"));
        assert!(sql.contains(">"));
    }

    #[test]
    fn in_operator_renders_as_any() {
        let ctx = StageContext::new();
        let mut e = emitter();
        let list = Expression::List(vec![int_lit(1), int_lit(2)], span());
        let sql = render_binary(BinaryOp::In, &int_lit(1), &list, span(), &ctx, &mut e).unwrap();
        assert_eq!(sql, "(1 = ANY(ARRAY[1, 2]))");
    }

    #[test]
    fn contains_renders_as_like_with_wildcards() {
        let ctx = StageContext::new();
        let mut e = emitter();
        let sql = render_binary(
            BinaryOp::Contains,
            &Expression::Literal(Literal::Str("abc".to_string()), span()),
            &Expression::Literal(Literal::Str("b".to_string()), span()),
            span(),
            &ctx,
            &mut e,
        )
        .unwrap();
        assert_eq!(
            sql,
            r"('abc' LIKE '%' || replace(replace(replace('b', '\', '\\'), '%', '\%'), '_', '\_') || '%' ESCAPE '\')"
        );
    }

    #[test]
    fn repeated_parameter_name_reuses_placeholder_position() {
        let ctx = StageContext::new();
        let mut e = emitter();
        let p1 = render_expression(
            &Expression::Parameter {
                name: "x".to_string(),
                span: span(),
            },
            &ctx,
            &mut e,
        )
        .unwrap();
        let p2 = render_expression(
            &Expression::Parameter {
                name: "x".to_string(),
                span: span(),
            },
            &ctx,
            &mut e,
        )
        .unwrap();
        assert_eq!(p1, p2);
        assert_eq!(e.params.len(), 1);
    }

    #[test]
    fn unknown_function_is_rejected() {
        let ctx = StageContext::new();
        let mut e = emitter();
        let err = render_function("not_a_real_fn", &[], span(), &ctx, &mut e).unwrap_err();
        assert!(matches!(err.kind, EmitErrorKind::UnknownFunction(_)));
    }
}
