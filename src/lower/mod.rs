//! Lowers an untyped [`crate::parser::tree::ParseTree`] into the typed
//! [`crate::ast::Query`]: resolves variable scoping, canonicalizes edge
//! direction, invents names for anonymous pattern variables, and rejects
//! constructs the parser merely recognized but this crate doesn't support.

mod errors;
mod scope;

pub use errors::{LowerError, LowerErrorKind};

use crate::ast;
use crate::parser::tree::{self, ExprNode};
use scope::Scope;

/// Lower a complete parse tree into a [`ast::Query`].
pub fn lower_query(tree: &tree::ParseTree) -> Result<ast::Query, LowerError> {
    let mut lowerer = Lowerer::new();
    let mut clauses = Vec::with_capacity(tree.clauses.len());
    for clause in &tree.clauses {
        clauses.push(lowerer.lower_clause(clause)?);
    }
    Ok(ast::Query { clauses })
}

struct Lowerer {
    scope: Scope,
    anon_counter: u32,
}

impl Lowerer {
    fn new() -> Self {
        Lowerer {
            scope: Scope::new(),
            anon_counter: 0,
        }
    }

    /// Cypher identifiers can't start with a digit, so a leading `0`
    /// guarantees this name never collides with a source identifier.
    fn fresh_name(&mut self) -> String {
        let name = format!("0anon{}", self.anon_counter);
        self.anon_counter += 1;
        name
    }

    fn lower_clause(&mut self, clause: &tree::ClauseNode) -> Result<ast::Clause, LowerError> {
        match clause {
            tree::ClauseNode::Match(m) => self.lower_match(m).map(ast::Clause::Match),
            tree::ClauseNode::With(w) => self.lower_with(w).map(ast::Clause::With),
            tree::ClauseNode::Return(r) => self.lower_return(r).map(ast::Clause::Return),
            tree::ClauseNode::Unwind(u) => self.lower_unwind(u).map(ast::Clause::Unwind),
            tree::ClauseNode::Unsupported { keyword, span } => {
                Err(LowerError::unsupported(keyword, *span))
            }
        }
    }

    fn lower_match(&mut self, m: &tree::MatchNode) -> Result<ast::MatchClause, LowerError> {
        let mut patterns = Vec::with_capacity(m.patterns.len());
        for p in &m.patterns {
            patterns.push(self.lower_pattern(p)?);
        }
        let where_clause = m
            .where_clause
            .as_ref()
            .map(|e| self.lower_expression(e))
            .transpose()?;
        Ok(ast::MatchClause {
            patterns,
            optional: m.optional,
            where_clause,
            span: m.span,
        })
    }

    fn lower_unwind(&mut self, u: &tree::UnwindNode) -> Result<ast::UnwindClause, LowerError> {
        let expression = self.lower_expression(&u.expression)?;
        if self.scope.bind(&u.alias, ast::EntityKind::Scalar).is_some() {
            return Err(LowerError::kind_conflict(&u.alias, u.span));
        }
        Ok(ast::UnwindClause {
            expression,
            as_var: u.alias.clone(),
            span: u.span,
        })
    }

    fn lower_pattern(&mut self, p: &tree::PatternNode) -> Result<ast::Pattern, LowerError> {
        if let Some((_, span)) = p.path_variable {
            return Err(LowerError::unsupported("named path variables", span));
        }
        if let Some((name, span)) = &p.path_function {
            return Err(LowerError::unsupported(
                &format!("the `{name}` path function"),
                *span,
            ));
        }

        let mut nodes = Vec::new();
        let mut rels = Vec::new();

        for element in &p.elements {
            match element {
                tree::PatternElementNode::Node(n) => nodes.push(self.lower_node_pattern(n)?),
                tree::PatternElementNode::Rel(r) => {
                    // The node immediately before this relationship in
                    // textual order — already lowered and pushed above.
                    let before = nodes.last().expect("grammar guarantees a node precedes a relationship").variable.clone();
                    rels.push((r, before));
                }
            }
        }

        // Second pass: each rels[i] needs the node *after* it too, which by
        // construction is nodes[i + 1] (there's exactly one node between
        // each pair of relationships, plus the leading and trailing node).
        let mut lowered_rels = Vec::with_capacity(rels.len());
        for (i, (r, before)) in rels.into_iter().enumerate() {
            let after = nodes[i + 1].variable.clone();
            lowered_rels.push(self.lower_rel_pattern(r, before, after)?);
        }

        Ok(ast::Pattern {
            nodes,
            rels: lowered_rels,
            span: p.span,
        })
    }

    fn lower_node_pattern(
        &mut self,
        n: &tree::NodePatternNode,
    ) -> Result<ast::NodePattern, LowerError> {
        let (variable, is_anonymous) = match &n.variable {
            Some(name) if name != "_" => (name.clone(), false),
            _ => (self.fresh_name(), true),
        };

        if self.scope.bind(&variable, ast::EntityKind::Node).is_some() {
            return Err(LowerError::kind_conflict(&variable, n.span));
        }

        let properties = self.lower_property_map(&n.properties)?;

        Ok(ast::NodePattern {
            variable,
            is_anonymous,
            labels: n.labels.clone(),
            properties,
            span: n.span,
        })
    }

    fn lower_rel_pattern(
        &mut self,
        r: &tree::RelPatternNode,
        before: String,
        after: String,
    ) -> Result<ast::RelPattern, LowerError> {
        let (variable, is_anonymous) = match &r.variable {
            Some(name) if name != "_" => (name.clone(), false),
            _ => (self.fresh_name(), true),
        };

        let is_variable_length = r.length.is_some();
        let kind = if is_variable_length {
            ast::EntityKind::RelationshipPath
        } else {
            ast::EntityKind::Relationship
        };
        if self.scope.bind(&variable, kind).is_some() {
            return Err(LowerError::kind_conflict(&variable, r.span));
        }

        let (direction, from, to) = match r.direction {
            tree::DirectionNode::Out => (ast::Direction::Out, before, after),
            // Canonicalization (§4.3): `<-[...]-` becomes `-[...]->` with
            // endpoints swapped.
            tree::DirectionNode::In => (ast::Direction::Out, after, before),
            tree::DirectionNode::Undirected => (ast::Direction::Undirected, before, after),
        };

        let length = match r.length {
            None => ast::Length::Single,
            Some(l) => ast::Length::Range(l.min, l.max),
        };

        let properties = self.lower_property_map(&r.properties)?;
        if is_variable_length && !properties.is_empty() {
            return Err(LowerError::invalid_property_access(&variable, r.span));
        }

        Ok(ast::RelPattern {
            variable,
            is_anonymous,
            labels: r.labels.clone(),
            direction,
            from,
            to,
            properties,
            length,
            span: r.span,
        })
    }

    fn lower_property_map(
        &mut self,
        props: &[(String, ExprNode)],
    ) -> Result<Vec<(String, ast::Expression)>, LowerError> {
        props
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.lower_expression(v)?)))
            .collect()
    }

    fn lower_with(&mut self, w: &tree::WithNode) -> Result<ast::WithClause, LowerError> {
        let items = self.lower_projections(&w.items)?;
        self.rebind_scope_from_projections(&items);

        let where_clause = w
            .where_clause
            .as_ref()
            .map(|e| self.lower_expression(e))
            .transpose()?;
        let order_by = self.lower_order_by(&w.order_by)?;
        let skip = w.skip.as_ref().map(|e| self.lower_expression(e)).transpose()?;
        let limit = w.limit.as_ref().map(|e| self.lower_expression(e)).transpose()?;

        Ok(ast::WithClause {
            items,
            distinct: w.distinct,
            where_clause,
            order_by,
            skip,
            limit,
            span: w.span,
        })
    }

    fn lower_return(&mut self, r: &tree::ReturnNode) -> Result<ast::ReturnClause, LowerError> {
        let items = self.lower_projections(&r.items)?;
        let order_by = self.lower_order_by(&r.order_by)?;
        let skip = r.skip.as_ref().map(|e| self.lower_expression(e)).transpose()?;
        let limit = r.limit.as_ref().map(|e| self.lower_expression(e)).transpose()?;

        Ok(ast::ReturnClause {
            items,
            distinct: r.distinct,
            order_by,
            skip,
            limit,
            span: r.span,
        })
    }

    /// Expands `*` into one projection per bound variable (insertion
    /// order) and lowers every other projection's expression. Nested
    /// aggregates are rejected here, once, for every projection.
    fn lower_projections(
        &mut self,
        items: &[tree::ProjectionNode],
    ) -> Result<Vec<ast::Projection>, LowerError> {
        let mut out = Vec::new();
        for item in items {
            if matches!(item.expression, ExprNode::Star(_)) {
                for name in self.scope.names_in_order().to_vec() {
                    out.push(ast::Projection {
                        expression: ast::Expression::Variable {
                            name: name.clone(),
                            span: item.span,
                        },
                        alias: None,
                        span: item.span,
                    });
                }
                continue;
            }
            let expression = self.lower_expression(&item.expression)?;
            reject_nested_aggregate(&expression, false)?;
            out.push(ast::Projection {
                expression,
                alias: item.alias.clone(),
                span: item.span,
            });
        }
        Ok(out)
    }

    fn rebind_scope_from_projections(&mut self, items: &[ast::Projection]) {
        let mut vars = Vec::with_capacity(items.len());
        for item in items {
            let name = item
                .alias
                .clone()
                .unwrap_or_else(|| match &item.expression {
                    ast::Expression::Variable { name, .. } => name.clone(),
                    _ => unreachable!("a bare expression without an alias must be a variable"),
                });
            let kind = match &item.expression {
                ast::Expression::Variable { name, .. } => {
                    self.scope.get(name).unwrap_or(ast::EntityKind::Scalar)
                }
                _ => ast::EntityKind::Scalar,
            };
            vars.push((name, kind));
        }
        self.scope.reset_to(vars);
    }

    fn lower_order_by(
        &mut self,
        items: &[tree::OrderItemNode],
    ) -> Result<Vec<ast::OrderItem>, LowerError> {
        items
            .iter()
            .map(|i| {
                Ok(ast::OrderItem {
                    expression: self.lower_expression(&i.expression)?,
                    direction: if i.descending {
                        ast::OrderDirection::Desc
                    } else {
                        ast::OrderDirection::Asc
                    },
                })
            })
            .collect()
    }

    fn lower_expression(&mut self, expr: &ExprNode) -> Result<ast::Expression, LowerError> {
        Ok(match expr {
            ExprNode::Variable(name, span) => {
                if !self.scope.contains(name) {
                    return Err(LowerError::unknown_variable(name, *span));
                }
                ast::Expression::Variable {
                    name: name.clone(),
                    span: *span,
                }
            }
            ExprNode::Property {
                base,
                property,
                span,
            } => {
                if let ExprNode::Variable(name, _) = base.as_ref() {
                    if self.scope.get(name) == Some(ast::EntityKind::RelationshipPath) {
                        return Err(LowerError::invalid_property_access(name, *span));
                    }
                }
                ast::Expression::Property {
                    base: Box::new(self.lower_expression(base)?),
                    property: property.clone(),
                    span: *span,
                }
            }
            ExprNode::LabelTest { base, label, span } => ast::Expression::LabelTest {
                base: Box::new(self.lower_expression(base)?),
                label: label.clone(),
                span: *span,
            },
            ExprNode::Literal(lit, span) => {
                ast::Expression::Literal(lower_literal(lit), *span)
            }
            ExprNode::Parameter(name, span) => ast::Expression::Parameter {
                name: name.clone(),
                span: *span,
            },
            ExprNode::Binary { op, lhs, rhs, span } => ast::Expression::Binary {
                op: lower_binary_op(*op),
                lhs: Box::new(self.lower_expression(lhs)?),
                rhs: Box::new(self.lower_expression(rhs)?),
                span: *span,
            },
            ExprNode::Unary { op, expr, span } => ast::Expression::Unary {
                op: lower_unary_op(*op),
                expr: Box::new(self.lower_expression(expr)?),
                span: *span,
            },
            ExprNode::IsNull {
                expr,
                negated,
                span,
            } => ast::Expression::IsNull {
                expr: Box::new(self.lower_expression(expr)?),
                negated: *negated,
                span: *span,
            },
            ExprNode::FunctionCall { name, args, span } => ast::Expression::FunctionCall {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| self.lower_expression(a))
                    .collect::<Result<Vec<_>, _>>()?,
                span: *span,
            },
            ExprNode::Aggregate {
                name,
                distinct,
                arg,
                span,
            } => ast::Expression::Aggregate {
                name: name.clone(),
                distinct: *distinct,
                arg: arg
                    .as_ref()
                    .map(|a| self.lower_expression(a))
                    .transpose()?
                    .map(Box::new),
                span: *span,
            },
            ExprNode::Exists(e) => {
                // EXISTS opens its own nested scope that inherits the
                // outer bindings (so its pattern can correlate on them)
                // but discards anything it binds once lowered.
                let saved = self.scope.clone();
                let mut patterns = Vec::with_capacity(e.patterns.len());
                for p in &e.patterns {
                    patterns.push(self.lower_pattern(p)?);
                }
                let where_clause = e
                    .where_clause
                    .as_ref()
                    .map(|w| self.lower_expression(w))
                    .transpose()?;
                self.scope = saved;
                ast::Expression::Exists(Box::new(ast::ExistsSubquery {
                    patterns,
                    where_clause,
                    span: e.span,
                }))
            }
            ExprNode::Case {
                operand,
                whens,
                else_branch,
                span,
            } => ast::Expression::Case {
                operand: operand
                    .as_ref()
                    .map(|o| self.lower_expression(o))
                    .transpose()?
                    .map(Box::new),
                whens: whens
                    .iter()
                    .map(|(c, r)| Ok((self.lower_expression(c)?, self.lower_expression(r)?)))
                    .collect::<Result<Vec<_>, LowerError>>()?,
                else_branch: else_branch
                    .as_ref()
                    .map(|e| self.lower_expression(e))
                    .transpose()?
                    .map(Box::new),
                span: *span,
            },
            ExprNode::List(items, span) => ast::Expression::List(
                items
                    .iter()
                    .map(|i| self.lower_expression(i))
                    .collect::<Result<Vec<_>, _>>()?,
                *span,
            ),
            ExprNode::Map(entries, span) => ast::Expression::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.lower_expression(v)?)))
                    .collect::<Result<Vec<_>, LowerError>>()?,
                *span,
            ),
            ExprNode::Star(span) => ast::Expression::Star(*span),
            ExprNode::MapProjection { span, .. } => {
                return Err(LowerError::unsupported("map projections", *span))
            }
            ExprNode::ListComprehension { span } => {
                return Err(LowerError::unsupported("list comprehensions", *span))
            }
        })
    }
}

/// Rejects `agg(... agg(...) ...)`. Only checked one level deep from each
/// top-level projection expression — an aggregate can't itself contain
/// another aggregate anywhere in its argument tree.
fn reject_nested_aggregate(expr: &ast::Expression, inside_aggregate: bool) -> Result<(), LowerError> {
    let is_aggregate = expr.is_aggregate();
    if is_aggregate && inside_aggregate {
        return Err(LowerError::nested_aggregate(expr.span()));
    }
    let next_inside = inside_aggregate || is_aggregate;
    match expr {
        ast::Expression::Binary { lhs, rhs, .. } => {
            reject_nested_aggregate(lhs, next_inside)?;
            reject_nested_aggregate(rhs, next_inside)?;
        }
        ast::Expression::Unary { expr, .. } => reject_nested_aggregate(expr, next_inside)?,
        ast::Expression::IsNull { expr, .. } => reject_nested_aggregate(expr, next_inside)?,
        ast::Expression::Property { base, .. } => reject_nested_aggregate(base, next_inside)?,
        ast::Expression::LabelTest { base, .. } => reject_nested_aggregate(base, next_inside)?,
        ast::Expression::FunctionCall { args, .. } => {
            for a in args {
                reject_nested_aggregate(a, next_inside)?;
            }
        }
        ast::Expression::Aggregate { arg: Some(a), .. } => reject_nested_aggregate(a, next_inside)?,
        ast::Expression::Case {
            operand,
            whens,
            else_branch,
            ..
        } => {
            if let Some(o) = operand {
                reject_nested_aggregate(o, next_inside)?;
            }
            for (c, r) in whens {
                reject_nested_aggregate(c, next_inside)?;
                reject_nested_aggregate(r, next_inside)?;
            }
            if let Some(e) = else_branch {
                reject_nested_aggregate(e, next_inside)?;
            }
        }
        ast::Expression::List(items, _) => {
            for i in items {
                reject_nested_aggregate(i, next_inside)?;
            }
        }
        ast::Expression::Map(entries, _) => {
            for (_, v) in entries {
                reject_nested_aggregate(v, next_inside)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn lower_literal(lit: &tree::LiteralNode) -> ast::Literal {
    match lit {
        tree::LiteralNode::Str(s) => ast::Literal::Str(s.clone()),
        tree::LiteralNode::Int(n) => ast::Literal::Int(*n),
        tree::LiteralNode::Float(f) => ast::Literal::Float(*f),
        tree::LiteralNode::Bool(b) => ast::Literal::Bool(*b),
        tree::LiteralNode::Null => ast::Literal::Null,
    }
}

fn lower_binary_op(op: tree::BinaryOp) -> ast::BinaryOp {
    match op {
        tree::BinaryOp::Add => ast::BinaryOp::Add,
        tree::BinaryOp::Sub => ast::BinaryOp::Sub,
        tree::BinaryOp::Mul => ast::BinaryOp::Mul,
        tree::BinaryOp::Div => ast::BinaryOp::Div,
        tree::BinaryOp::Mod => ast::BinaryOp::Mod,
        tree::BinaryOp::Eq => ast::BinaryOp::Eq,
        tree::BinaryOp::NotEq => ast::BinaryOp::NotEq,
        tree::BinaryOp::Lt => ast::BinaryOp::Lt,
        tree::BinaryOp::LtEq => ast::BinaryOp::LtEq,
        tree::BinaryOp::Gt => ast::BinaryOp::Gt,
        tree::BinaryOp::GtEq => ast::BinaryOp::GtEq,
        tree::BinaryOp::And => ast::BinaryOp::And,
        tree::BinaryOp::Or => ast::BinaryOp::Or,
        tree::BinaryOp::In => ast::BinaryOp::In,
        tree::BinaryOp::Contains => ast::BinaryOp::Contains,
        tree::BinaryOp::StartsWith => ast::BinaryOp::StartsWith,
        tree::BinaryOp::EndsWith => ast::BinaryOp::EndsWith,
    }
}

fn lower_unary_op(op: tree::UnaryOp) -> ast::UnaryOp {
    match op {
        tree::UnaryOp::Not => ast::UnaryOp::Not,
        tree::UnaryOp::Neg => ast::UnaryOp::Neg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn lower_source(src: &str) -> Result<ast::Query, LowerError> {
        let tokens = tokenize(src).unwrap();
        let tree = parse(&tokens).unwrap();
        lower_query(&tree)
    }

    #[test]
    fn binds_pattern_variables() {
        let query = lower_source("MATCH (n:User) RETURN n.name").unwrap();
        match &query.clauses[0] {
            ast::Clause::Match(m) => {
                assert_eq!(m.patterns[0].nodes[0].variable, "n");
                assert!(!m.patterns[0].nodes[0].is_anonymous);
            }
            _ => panic!("expected Match"),
        }
    }

    #[test]
    fn rejects_unknown_variable() {
        let err = lower_source("MATCH (n) RETURN m").unwrap_err();
        assert_eq!(err.kind, LowerErrorKind::UnknownVariable);
    }

    #[test]
    fn canonicalizes_incoming_direction() {
        let query = lower_source("MATCH (a)<-[r:T]-(b) RETURN a").unwrap();
        match &query.clauses[0] {
            ast::Clause::Match(m) => {
                let rel = &m.patterns[0].rels[0];
                assert_eq!(rel.direction, ast::Direction::Out);
                assert_eq!(rel.from, "b");
                assert_eq!(rel.to, "a");
            }
            _ => panic!("expected Match"),
        }
    }

    #[test]
    fn rejects_property_access_on_variable_length_path() {
        let err = lower_source("MATCH (a)-[r:T*1..3]->(b) RETURN r.weight").unwrap_err();
        assert_eq!(err.kind, LowerErrorKind::InvalidPropertyAccess);
    }

    #[test]
    fn rejects_nested_aggregates() {
        let err = lower_source("MATCH (n) RETURN count(sum(n.x))").unwrap_err();
        assert_eq!(err.kind, LowerErrorKind::NestedAggregate);
    }

    #[test]
    fn expands_return_star() {
        let query = lower_source("MATCH (a), (b) RETURN *").unwrap();
        match &query.clauses[1] {
            ast::Clause::Return(r) => assert_eq!(r.items.len(), 2),
            _ => panic!("expected Return"),
        }
    }

    #[test]
    fn rejects_unsupported_clause() {
        let err = lower_source("CREATE (n:User)").unwrap_err();
        assert_eq!(err.kind, LowerErrorKind::UnsupportedConstruct);
    }

    #[test]
    fn with_narrows_scope() {
        let err = lower_source("MATCH (a) WITH a.name AS name RETURN a").unwrap_err();
        assert_eq!(err.kind, LowerErrorKind::UnknownVariable);
    }
}
