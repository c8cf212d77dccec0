//! Expression grammar, precedence climbing from `OR` down to unary.
//!
//! ```text
//! expr       := orExpr
//! orExpr     := andExpr ('OR' andExpr)*
//! andExpr    := notExpr ('AND' notExpr)*
//! notExpr    := 'NOT'? comparison
//! comparison := additive ( ('=' | '<>' | '<' | '<=' | '>' | '>=' | 'IN'
//!                          | 'CONTAINS' | 'STARTS WITH' | 'ENDS WITH'
//!                          | 'IS' 'NOT'? 'NULL') additive )*
//! additive   := multiplicative (('+' | '-') multiplicative)*
//! multiplicative := unary (('*' | '/' | '%') unary)*
//! unary      := '-' unary | postfix
//! postfix    := primary ('.' IDENT | ':' IDENT)*
//! ```

use super::tree::*;
use super::{Parser, ParseError};
use crate::error::Span;
use crate::lexer::{Keyword, TokenKind};

pub(super) fn parse_expression(parser: &mut Parser) -> Result<ExprNode, ParseError> {
    parse_or(parser)
}

fn parse_or(parser: &mut Parser) -> Result<ExprNode, ParseError> {
    let mut lhs = parse_and(parser)?;
    while parser.eat_keyword(Keyword::Or) {
        let span = lhs.span();
        let rhs = parse_and(parser)?;
        lhs = ExprNode::Binary {
            op: BinaryOp::Or,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            span,
        };
    }
    Ok(lhs)
}

fn parse_and(parser: &mut Parser) -> Result<ExprNode, ParseError> {
    let mut lhs = parse_not(parser)?;
    while parser.eat_keyword(Keyword::And) {
        let span = lhs.span();
        let rhs = parse_not(parser)?;
        lhs = ExprNode::Binary {
            op: BinaryOp::And,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            span,
        };
    }
    Ok(lhs)
}

fn parse_not(parser: &mut Parser) -> Result<ExprNode, ParseError> {
    if parser.eat_keyword(Keyword::Not) {
        let span = parser.current_span();
        let expr = parse_not(parser)?;
        return Ok(ExprNode::Unary {
            op: UnaryOp::Not,
            expr: Box::new(expr),
            span,
        });
    }
    parse_comparison(parser)
}

fn parse_comparison(parser: &mut Parser) -> Result<ExprNode, ParseError> {
    let mut lhs = parse_additive(parser)?;
    loop {
        let span = lhs.span();
        let op = match parser.peek_kind() {
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::NotEq,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::LtEq => BinaryOp::LtEq,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::GtEq => BinaryOp::GtEq,
            TokenKind::Keyword(Keyword::In) => BinaryOp::In,
            TokenKind::Keyword(Keyword::Contains) => BinaryOp::Contains,
            TokenKind::Keyword(Keyword::Starts) => {
                parser.advance();
                parser.expect_keyword(Keyword::With)?;
                let rhs = parse_additive(parser)?;
                lhs = ExprNode::Binary {
                    op: BinaryOp::StartsWith,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    span,
                };
                continue;
            }
            TokenKind::Keyword(Keyword::Ends) => {
                parser.advance();
                parser.expect_keyword(Keyword::With)?;
                let rhs = parse_additive(parser)?;
                lhs = ExprNode::Binary {
                    op: BinaryOp::EndsWith,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    span,
                };
                continue;
            }
            TokenKind::Keyword(Keyword::Is) => {
                parser.advance();
                let negated = parser.eat_keyword(Keyword::Not);
                parser.expect_keyword(Keyword::Null)?;
                lhs = ExprNode::IsNull {
                    expr: Box::new(lhs),
                    negated,
                    span,
                };
                continue;
            }
            _ => break,
        };
        parser.advance();
        let rhs = parse_additive(parser)?;
        lhs = ExprNode::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            span,
        };
    }
    Ok(lhs)
}

fn parse_additive(parser: &mut Parser) -> Result<ExprNode, ParseError> {
    let mut lhs = parse_multiplicative(parser)?;
    loop {
        let span = lhs.span();
        let op = match parser.peek_kind() {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            _ => break,
        };
        parser.advance();
        let rhs = parse_multiplicative(parser)?;
        lhs = ExprNode::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            span,
        };
    }
    Ok(lhs)
}

fn parse_multiplicative(parser: &mut Parser) -> Result<ExprNode, ParseError> {
    let mut lhs = parse_unary(parser)?;
    loop {
        let span = lhs.span();
        let op = match parser.peek_kind() {
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            _ => break,
        };
        parser.advance();
        let rhs = parse_unary(parser)?;
        lhs = ExprNode::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            span,
        };
    }
    Ok(lhs)
}

fn parse_unary(parser: &mut Parser) -> Result<ExprNode, ParseError> {
    if parser.eat_kind(&TokenKind::Minus) {
        let span = parser.current_span();
        let expr = parse_unary(parser)?;
        return Ok(ExprNode::Unary {
            op: UnaryOp::Neg,
            expr: Box::new(expr),
            span,
        });
    }
    parse_postfix(parser)
}

fn parse_postfix(parser: &mut Parser) -> Result<ExprNode, ParseError> {
    let mut expr = parse_primary(parser)?;
    loop {
        match parser.peek_kind() {
            TokenKind::Dot => {
                parser.advance();
                let span = parser.current_span();
                let (name, _) = parser.expect_identifier()?;
                expr = ExprNode::Property {
                    base: Box::new(expr),
                    property: name,
                    span,
                };
            }
            TokenKind::Colon => {
                parser.advance();
                let span = parser.current_span();
                let (name, _) = parser.expect_identifier()?;
                expr = ExprNode::LabelTest {
                    base: Box::new(expr),
                    label: name,
                    span,
                };
            }
            TokenKind::LBrace => {
                // `expr {.a, .b}` map-projection syntax — unsupported, but
                // recognized so the lowerer can reject it precisely.
                let span = parser.current_span();
                skip_balanced(parser, TokenKind::LBrace, TokenKind::RBrace)?;
                expr = ExprNode::MapProjection {
                    base: Box::new(expr),
                    span,
                };
            }
            _ => break,
        }
    }
    Ok(expr)
}

fn skip_balanced(
    parser: &mut Parser,
    open: TokenKind,
    close: TokenKind,
) -> Result<(), ParseError> {
    parser.expect_kind(open.clone())?;
    let mut depth = 1;
    while depth > 0 {
        if parser.at_eof() {
            return Err(parser.unexpected("closing delimiter".to_string()));
        }
        if parser.check_kind(&open) {
            depth += 1;
        } else if parser.check_kind(&close) {
            depth -= 1;
        }
        parser.advance();
    }
    Ok(())
}

fn parse_primary(parser: &mut Parser) -> Result<ExprNode, ParseError> {
    let span = parser.current_span();
    match parser.peek_kind().clone() {
        TokenKind::IntegerLiteral(n) => {
            parser.advance();
            Ok(ExprNode::Literal(LiteralNode::Int(n), span))
        }
        TokenKind::FloatLiteral(f) => {
            parser.advance();
            Ok(ExprNode::Literal(LiteralNode::Float(f), span))
        }
        TokenKind::StringLiteral(s) => {
            parser.advance();
            Ok(ExprNode::Literal(LiteralNode::Str(s), span))
        }
        TokenKind::Keyword(Keyword::True) => {
            parser.advance();
            Ok(ExprNode::Literal(LiteralNode::Bool(true), span))
        }
        TokenKind::Keyword(Keyword::False) => {
            parser.advance();
            Ok(ExprNode::Literal(LiteralNode::Bool(false), span))
        }
        TokenKind::Keyword(Keyword::Null) => {
            parser.advance();
            Ok(ExprNode::Literal(LiteralNode::Null, span))
        }
        TokenKind::Parameter(name) => {
            parser.advance();
            Ok(ExprNode::Parameter(name, span))
        }
        TokenKind::Star => {
            parser.advance();
            Ok(ExprNode::Star(span))
        }
        TokenKind::LParen => {
            parser.advance();
            let inner = parse_expression(parser)?;
            parser.expect_kind(TokenKind::RParen)?;
            Ok(inner)
        }
        TokenKind::LBracket => parse_list_or_comprehension(parser, span),
        TokenKind::LBrace => parse_map_literal(parser, span),
        TokenKind::Keyword(Keyword::Case) => parse_case(parser, span),
        TokenKind::Keyword(Keyword::Exists) => parse_exists(parser, span),
        TokenKind::Identifier(name) => parse_identifier_led(parser, name, span),
        _ => Err(parser.unexpected("an expression".to_string())),
    }
}

fn parse_identifier_led(
    parser: &mut Parser,
    name: String,
    span: Span,
) -> Result<ExprNode, ParseError> {
    parser.advance();

    if parser.check_kind(&TokenKind::LParen) {
        return parse_call(parser, name, span);
    }

    Ok(ExprNode::Variable(name, span))
}

fn parse_call(parser: &mut Parser, name: String, span: Span) -> Result<ExprNode, ParseError> {
    parser.expect_kind(TokenKind::LParen)?;

    let lowered = name.to_ascii_lowercase();
    let is_aggregate = matches!(
        lowered.as_str(),
        "count" | "sum" | "avg" | "min" | "max" | "collect"
    );

    if is_aggregate {
        let distinct = parser.eat_keyword(Keyword::Distinct);
        let arg = if parser.check_kind(&TokenKind::RParen) {
            None
        } else if parser.check_kind(&TokenKind::Star) {
            parser.advance();
            None
        } else {
            Some(Box::new(parse_expression(parser)?))
        };
        parser.expect_kind(TokenKind::RParen)?;
        return Ok(ExprNode::Aggregate {
            name,
            distinct,
            arg,
            span,
        });
    }

    let mut args = Vec::new();
    if !parser.check_kind(&TokenKind::RParen) {
        loop {
            args.push(parse_expression(parser)?);
            if !parser.eat_kind(&TokenKind::Comma) {
                break;
            }
        }
    }
    parser.expect_kind(TokenKind::RParen)?;
    Ok(ExprNode::FunctionCall { name, args, span })
}

fn parse_case(parser: &mut Parser, span: Span) -> Result<ExprNode, ParseError> {
    parser.expect_keyword(Keyword::Case)?;

    let operand = if parser.check_keyword(Keyword::When) {
        None
    } else {
        Some(Box::new(parse_expression(parser)?))
    };

    let mut whens = Vec::new();
    while parser.eat_keyword(Keyword::When) {
        let cond = parse_expression(parser)?;
        parser.expect_keyword(Keyword::Then)?;
        let result = parse_expression(parser)?;
        whens.push((cond, result));
    }

    let else_branch = if parser.eat_keyword(Keyword::Else) {
        Some(Box::new(parse_expression(parser)?))
    } else {
        None
    };

    parser.expect_keyword(Keyword::End)?;
    Ok(ExprNode::Case {
        operand,
        whens,
        else_branch,
        span,
    })
}

fn parse_exists(parser: &mut Parser, span: Span) -> Result<ExprNode, ParseError> {
    parser.expect_keyword(Keyword::Exists)?;
    parser.expect_kind(TokenKind::LBrace)?;

    let mut patterns = vec![super::pattern::parse_pattern(parser)?];
    while parser.eat_kind(&TokenKind::Comma) {
        patterns.push(super::pattern::parse_pattern(parser)?);
    }
    let where_clause = if parser.eat_keyword(Keyword::Where) {
        Some(parse_expression(parser)?)
    } else {
        None
    };

    parser.expect_kind(TokenKind::RBrace)?;
    Ok(ExprNode::Exists(Box::new(ExistsNode {
        patterns,
        where_clause,
        span,
    })))
}

fn parse_map_literal(parser: &mut Parser, span: Span) -> Result<ExprNode, ParseError> {
    parser.expect_kind(TokenKind::LBrace)?;
    let mut entries = Vec::new();
    if !parser.check_kind(&TokenKind::RBrace) {
        loop {
            let (key, _) = parser.expect_identifier()?;
            parser.expect_kind(TokenKind::Colon)?;
            let value = parse_expression(parser)?;
            entries.push((key, value));
            if !parser.eat_kind(&TokenKind::Comma) {
                break;
            }
        }
    }
    parser.expect_kind(TokenKind::RBrace)?;
    Ok(ExprNode::Map(entries, span))
}

/// `[a, b, c]`, or a list comprehension `[x IN list WHERE cond | expr]`
/// (unsupported — detected by `IDENT IN` right after `[`).
fn parse_list_or_comprehension(
    parser: &mut Parser,
    span: Span,
) -> Result<ExprNode, ParseError> {
    parser.expect_kind(TokenKind::LBracket)?;

    let looks_like_comprehension = matches!(parser.peek_kind(), TokenKind::Identifier(_))
        && matches!(parser.peek_nth(1).kind, TokenKind::Keyword(Keyword::In));

    if looks_like_comprehension {
        let mut depth = 1;
        while depth > 0 {
            if parser.at_eof() {
                return Err(parser.unexpected("`]`".to_string()));
            }
            match parser.peek_kind() {
                TokenKind::LBracket => depth += 1,
                TokenKind::RBracket => depth -= 1,
                _ => {}
            }
            parser.advance();
        }
        return Ok(ExprNode::ListComprehension { span });
    }

    let mut items = Vec::new();
    if !parser.check_kind(&TokenKind::RBracket) {
        loop {
            items.push(parse_expression(parser)?);
            if !parser.eat_kind(&TokenKind::Comma) {
                break;
            }
        }
    }
    parser.expect_kind(TokenKind::RBracket)?;
    Ok(ExprNode::List(items, span))
}
