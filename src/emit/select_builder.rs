//! Assembles a stage's `SELECT` list, implicit `GROUP BY`, `ORDER BY`,
//! `OFFSET`/`LIMIT` — the parts shared by an intermediate `WITH` stage (which
//! gets wrapped into a CTE) and the terminal `RETURN` (which becomes the
//! outermost `SELECT`).

use super::context::{CarriedEntity, EmitAlias, ProjectedVar, StageContext};
use super::alias::Emitter;
use super::errors::{EmitError, EmitErrorKind};
use super::expr::render_expression;
use crate::ast::{Expression, OrderDirection, OrderItem, Projection};

/// Whether a projection list is feeding an intermediate `WITH` stage (which
/// needs every column individually named so the next stage can reference
/// it) or the terminal `RETURN` (which becomes the query's own result set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum StageKind {
    Intermediate,
    Terminal,
}

/// What role a physical SQL column plays in its originating projection item
/// — a plain value, or one of the three columns a carried node/relationship
/// variable needs (see [`ProjectedVar::Entity`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ColumnRole {
    Scalar,
    EntityId,
    EntityProperties,
    EntityLabels,
}

/// One physical projected column: its rendered SQL, the name it's bound to,
/// and whether it came straight off an aggregate (so the caller knows it
/// can't also appear in an implicit `GROUP BY`). A single [`Projection`]
/// item yields one of these normally, or three (id/properties/labels) when
/// it's a bare node/relationship variable crossing into a `WITH` stage.
pub(super) struct ProjectedColumn {
    pub(super) sql: String,
    pub(super) output_name: String,
    pub(super) is_aggregate: bool,
    /// The Cypher variable this column rebinds in the next stage, if any.
    pub(super) var_name: Option<String>,
    pub(super) role: ColumnRole,
}

pub(super) fn build_projection(
    items: &[Projection],
    kind: StageKind,
    ctx: &StageContext,
    emitter: &mut Emitter,
) -> Result<Vec<ProjectedColumn>, EmitError> {
    if items.is_empty() {
        let span = crate::error::Span::new(0, 0, 1, 1);
        return Err(EmitError::new(EmitErrorKind::EmptyProjection, span));
    }
    let mut columns = Vec::new();
    for item in items {
        columns.extend(build_projected_column(item, kind, ctx, emitter)?);
    }
    Ok(columns)
}

/// The three columns behind a live node/relationship variable, whichever
/// shape it's currently bound in.
struct EntityRef {
    id: String,
    properties: String,
    labels: String,
}

fn entity_ref(ctx: &StageContext, name: &str) -> Option<EntityRef> {
    match ctx.var_to_alias.get(name)? {
        EmitAlias::Entity(alias) => Some(EntityRef {
            id: format!("{alias}.id"),
            properties: format!("{alias}.properties"),
            labels: format!("{alias}.labels"),
        }),
        EmitAlias::CarriedEntity(CarriedEntity { id, properties, labels }) => Some(EntityRef {
            id: id.clone(),
            properties: properties.clone(),
            labels: labels.clone(),
        }),
        EmitAlias::Column(_) => None,
    }
}

fn build_projected_column(
    item: &Projection,
    kind: StageKind,
    ctx: &StageContext,
    emitter: &mut Emitter,
) -> Result<Vec<ProjectedColumn>, EmitError> {
    let is_aggregate = item.expression.is_aggregate();

    // A bare node/relationship variable projects its whole row (§9 Open
    // Questions) when it's the query's terminal result. An intermediate
    // `WITH` stage carries it forward as three named columns
    // (id/properties/labels) instead of one, so property/label access still
    // works on the far side of the boundary.
    if let Expression::Variable { name, .. } = &item.expression {
        if let Some(entity) = entity_ref(ctx, name) {
            let base = item.alias.clone().unwrap_or_else(|| name.clone());
            return Ok(match kind {
                StageKind::Terminal => vec![terminal_entity_column(ctx, name, &entity, base)],
                StageKind::Intermediate => entity_triplet(&entity, base),
            });
        }
    }

    let sql = render_expression(&item.expression, ctx, emitter)?;
    let output_name = item
        .alias
        .clone()
        .unwrap_or_else(|| default_column_name(&item.expression));
    Ok(vec![ProjectedColumn {
        sql: format!("{sql} AS {output_name}"),
        output_name: output_name.clone(),
        is_aggregate,
        var_name: Some(output_name),
        role: ColumnRole::Scalar,
    }])
}

/// A still-live table alias expands to `alias.*` (no `AS`, since a row
/// expansion can't be aliased as one name); a variable already carried
/// through a prior `WITH` has no single table row left, so it's
/// reconstructed into one JSON object instead.
fn terminal_entity_column(ctx: &StageContext, name: &str, entity: &EntityRef, base: String) -> ProjectedColumn {
    if let Some(EmitAlias::Entity(alias)) = ctx.var_to_alias.get(name) {
        return ProjectedColumn {
            sql: format!("{alias}.*"),
            output_name: base,
            is_aggregate: false,
            var_name: None,
            role: ColumnRole::Scalar,
        };
    }
    ProjectedColumn {
        sql: format!(
            "jsonb_build_object('id', {}, 'properties', {}, 'labels', to_jsonb({})) AS {base}",
            entity.id, entity.properties, entity.labels
        ),
        output_name: base,
        is_aggregate: false,
        var_name: None,
        role: ColumnRole::Scalar,
    }
}

fn entity_triplet(entity: &EntityRef, base: String) -> Vec<ProjectedColumn> {
    vec![
        ProjectedColumn {
            sql: format!("{} AS {base}__id", entity.id),
            output_name: format!("{base}__id"),
            is_aggregate: false,
            var_name: Some(base.clone()),
            role: ColumnRole::EntityId,
        },
        ProjectedColumn {
            sql: format!("{} AS {base}__properties", entity.properties),
            output_name: format!("{base}__properties"),
            is_aggregate: false,
            var_name: Some(base.clone()),
            role: ColumnRole::EntityProperties,
        },
        ProjectedColumn {
            sql: format!("{} AS {base}__labels", entity.labels),
            output_name: format!("{base}__labels"),
            is_aggregate: false,
            var_name: Some(base),
            role: ColumnRole::EntityLabels,
        },
    ]
}

/// Regroups a stage's flat physical column list back into one entry per
/// Cypher variable, for `StageContext::from_stage` to rebind into the next
/// stage's scope.
pub(super) fn to_projected_vars(columns: &[ProjectedColumn]) -> Vec<ProjectedVar> {
    let mut result = Vec::new();
    let mut i = 0;
    while i < columns.len() {
        match columns[i].role {
            ColumnRole::EntityId => {
                let name = columns[i]
                    .var_name
                    .clone()
                    .expect("an entity id column always carries its variable name");
                result.push(ProjectedVar::Entity {
                    name,
                    id: columns[i].output_name.clone(),
                    properties: columns[i + 1].output_name.clone(),
                    labels: columns[i + 2].output_name.clone(),
                });
                i += 3;
            }
            ColumnRole::Scalar => {
                let name = columns[i]
                    .var_name
                    .clone()
                    .unwrap_or_else(|| columns[i].output_name.clone());
                result.push(ProjectedVar::Scalar {
                    name,
                    column: columns[i].output_name.clone(),
                });
                i += 1;
            }
            ColumnRole::EntityProperties | ColumnRole::EntityLabels => {
                unreachable!("entity properties/labels columns are consumed together with their id column")
            }
        }
    }
    result
}

/// A readable fallback name for an unaliased projection, mirroring how a
/// Cypher driver derives a result column name from the expression text.
fn default_column_name(expr: &Expression) -> String {
    match expr {
        Expression::Variable { name, .. } => name.clone(),
        Expression::Property { property, .. } => property.clone(),
        Expression::Aggregate { name, .. } => name.to_ascii_lowercase(),
        Expression::FunctionCall { name, .. } => name.to_ascii_lowercase(),
        _ => "col".to_string(),
    }
}

/// Cypher has no explicit `GROUP BY`; a projection list mixing aggregates
/// and plain expressions implicitly groups by every plain one (§4.4.5).
pub(super) fn implicit_group_by(columns: &[ProjectedColumn]) -> Option<String> {
    let any_aggregate = columns.iter().any(|c| c.is_aggregate);
    if !any_aggregate {
        return None;
    }
    let keys: Vec<String> = columns
        .iter()
        .filter(|c| !c.is_aggregate)
        .map(|c| c.output_name.clone())
        .collect();
    if keys.is_empty() {
        None
    } else {
        Some(keys.join(", "))
    }
}

pub(super) fn build_order_by(
    order_by: &[OrderItem],
    ctx: &StageContext,
    emitter: &mut Emitter,
) -> Result<Option<String>, EmitError> {
    if order_by.is_empty() {
        return Ok(None);
    }
    let rendered: Vec<String> = order_by
        .iter()
        .map(|item| {
            let sql = render_expression(&item.expression, ctx, emitter)?;
            let dir = match item.direction {
                OrderDirection::Asc => "ASC",
                OrderDirection::Desc => "DESC",
            };
            Ok(format!("{sql} {dir}"))
        })
        .collect::<Result<_, EmitError>>()?;
    Ok(Some(rendered.join(", ")))
}

pub(super) fn render_skip_limit(
    expr: Option<&Expression>,
    ctx: &StageContext,
    emitter: &mut Emitter,
) -> Result<Option<String>, EmitError> {
    expr.map(|e| render_expression(e, ctx, emitter)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TranslateOptions;
    use crate::error::Span;

    fn span() -> Span {
        Span::new(0, 0, 1, 1)
    }

    #[test]
    fn terminal_variable_projects_whole_row_unaliased() {
        let mut ctx = StageContext::new();
        ctx.var_to_alias.insert("n".to_string(), EmitAlias::Entity("n_0".to_string()));
        let mut emitter = Emitter::new(TranslateOptions::default());
        let items = vec![Projection {
            expression: Expression::Variable {
                name: "n".to_string(),
                span: span(),
            },
            alias: None,
            span: span(),
        }];
        let columns = build_projection(&items, StageKind::Terminal, &ctx, &mut emitter).unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].sql, "n_0.*");
    }

    #[test]
    fn terminal_carried_entity_reconstructs_a_json_object() {
        let mut ctx = StageContext::new();
        ctx.var_to_alias.insert(
            "n".to_string(),
            EmitAlias::CarriedEntity(CarriedEntity {
                id: "stage_0.n__id".to_string(),
                properties: "stage_0.n__properties".to_string(),
                labels: "stage_0.n__labels".to_string(),
            }),
        );
        let mut emitter = Emitter::new(TranslateOptions::default());
        let items = vec![Projection {
            expression: Expression::Variable {
                name: "n".to_string(),
                span: span(),
            },
            alias: None,
            span: span(),
        }];
        let columns = build_projection(&items, StageKind::Terminal, &ctx, &mut emitter).unwrap();
        assert_eq!(columns.len(), 1);
        assert!(columns[0].sql.starts_with("jsonb_build_object("));
        assert!(columns[0].sql.contains("stage_0.n__properties"));
        assert!(columns[0].sql.contains("AS n"));
    }

    #[test]
    fn intermediate_variable_carries_id_properties_and_labels() {
        let mut ctx = StageContext::new();
        ctx.var_to_alias.insert("n".to_string(), EmitAlias::Entity("n_0".to_string()));
        let mut emitter = Emitter::new(TranslateOptions::default());
        let items = vec![Projection {
            expression: Expression::Variable {
                name: "n".to_string(),
                span: span(),
            },
            alias: None,
            span: span(),
        }];
        let columns = build_projection(&items, StageKind::Intermediate, &ctx, &mut emitter).unwrap();
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0].sql, "n_0.id AS n__id");
        assert_eq!(columns[1].sql, "n_0.properties AS n__properties");
        assert_eq!(columns[2].sql, "n_0.labels AS n__labels");

        let projected = to_projected_vars(&columns);
        assert_eq!(projected.len(), 1);
        match &projected[0] {
            ProjectedVar::Entity { name, .. } => assert_eq!(name, "n"),
            other => panic!("expected a carried entity, got {other:?}"),
        }
    }

    #[test]
    fn group_by_collects_non_aggregate_columns() {
        let columns = vec![
            ProjectedColumn {
                sql: "n_0.id AS n".to_string(),
                output_name: "n".to_string(),
                is_aggregate: false,
                var_name: Some("n".to_string()),
                role: ColumnRole::Scalar,
            },
            ProjectedColumn {
                sql: "COUNT(m_0.id) AS c".to_string(),
                output_name: "c".to_string(),
                is_aggregate: true,
                var_name: Some("c".to_string()),
                role: ColumnRole::Scalar,
            },
        ];
        assert_eq!(implicit_group_by(&columns), Some("n".to_string()));
    }

    #[test]
    fn no_group_by_without_an_aggregate() {
        let columns = vec![ProjectedColumn {
            sql: "n_0.id AS n".to_string(),
            output_name: "n".to_string(),
            is_aggregate: false,
            var_name: Some("n".to_string()),
            role: ColumnRole::Scalar,
        }];
        assert_eq!(implicit_group_by(&columns), None);
    }

    #[test]
    fn empty_projection_is_rejected() {
        let ctx = StageContext::new();
        let mut emitter = Emitter::new(TranslateOptions::default());
        let err = build_projection(&[], StageKind::Terminal, &ctx, &mut emitter).unwrap_err();
        assert_eq!(err.kind, EmitErrorKind::EmptyProjection);
    }
}
