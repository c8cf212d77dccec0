//! Combines a stage's accumulated join predicates with its explicit `WHERE`
//! expression into one `WHERE` clause for the stage's `SELECT`.

use super::alias::Emitter;
use super::context::StageContext;
use super::errors::EmitError;
use super::expr::render_expression;
use crate::ast::Expression;

pub(super) fn build_where(
    ctx: &StageContext,
    where_clause: Option<&Expression>,
    emitter: &mut Emitter,
) -> Result<Option<String>, EmitError> {
    let mut conditions: Vec<String> = ctx.where_conditions.clone();
    if let Some(expr) = where_clause {
        conditions.push(render_expression(expr, ctx, emitter)?);
    }
    if conditions.is_empty() {
        Ok(None)
    } else {
        Ok(Some(conditions.join("\n  AND ")))
    }
}
