//! Node and relationship pattern grammar.
//!
//! ```text
//! pattern       := (IDENT '=')? pathFunction? patternElement
//! pathFunction  := IDENT '(' patternElement ')'
//! patternElement:= nodePattern (relPattern nodePattern)*
//! nodePattern   := '(' IDENT? labels? properties? ')'
//! relPattern    := '<'? '-' ( '[' IDENT? labels? length? properties? ']' )? '-' '>'?
//! length        := '*' (INT)? ('..' (INT)?)?
//! ```

use super::tree::*;
use super::{Parser, ParseError};
use crate::error::Span;
use crate::lexer::TokenKind;

pub(super) fn parse_pattern(parser: &mut Parser) -> Result<PatternNode, ParseError> {
    let start = parser.current_span();

    let path_variable = if matches!(parser.peek_kind(), TokenKind::Identifier(_))
        && matches!(parser.peek_nth(1).kind, TokenKind::Eq)
    {
        let (name, span) = parser.expect_identifier()?;
        parser.advance(); // '='
        Some((name, span))
    } else {
        None
    };

    let path_function = if let TokenKind::Identifier(name) = parser.peek_kind().clone() {
        let lowered = name.to_ascii_lowercase();
        if (lowered == "shortestpath" || lowered == "allshortestpaths")
            && matches!(parser.peek_nth(1).kind, TokenKind::LParen)
        {
            let span = parser.current_span();
            parser.advance();
            parser.advance(); // '('
            let inner = parse_pattern_element(parser)?;
            parser.expect_kind(TokenKind::RParen)?;
            return Ok(PatternNode {
                path_variable,
                path_function: Some((name, span)),
                elements: inner,
                span: start,
            });
        }
        None
    } else {
        None
    };

    let elements = parse_pattern_element(parser)?;
    Ok(PatternNode {
        path_variable,
        path_function,
        elements,
        span: start,
    })
}

fn parse_pattern_element(parser: &mut Parser) -> Result<Vec<PatternElementNode>, ParseError> {
    let mut elements = vec![PatternElementNode::Node(parse_node_pattern(parser)?)];
    loop {
        match parser.peek_kind() {
            TokenKind::ArrowLeft | TokenKind::DashDash => {
                elements.push(PatternElementNode::Rel(parse_rel_pattern(parser)?));
                elements.push(PatternElementNode::Node(parse_node_pattern(parser)?));
            }
            TokenKind::Minus => {
                elements.push(PatternElementNode::Rel(parse_rel_pattern(parser)?));
                elements.push(PatternElementNode::Node(parse_node_pattern(parser)?));
            }
            _ => break,
        }
    }
    Ok(elements)
}

fn parse_node_pattern(parser: &mut Parser) -> Result<NodePatternNode, ParseError> {
    let start = parser.current_span();
    parser.expect_kind(TokenKind::LParen)?;

    let variable = if let TokenKind::Identifier(name) = parser.peek_kind().clone() {
        parser.advance();
        Some(name)
    } else {
        None
    };

    let labels = parse_labels(parser)?;
    let properties = parse_properties(parser)?;

    parser.expect_kind(TokenKind::RParen)?;
    Ok(NodePatternNode {
        variable,
        labels,
        properties,
        span: start,
    })
}

fn parse_labels(parser: &mut Parser) -> Result<Vec<String>, ParseError> {
    let mut labels = Vec::new();
    while parser.eat_kind(&TokenKind::Colon) {
        let (name, _) = parser.expect_identifier()?;
        labels.push(name);
    }
    Ok(labels)
}

fn parse_properties(
    parser: &mut Parser,
) -> Result<Vec<(String, ExprNode)>, ParseError> {
    if !parser.eat_kind(&TokenKind::LBrace) {
        return Ok(Vec::new());
    }
    let mut props = Vec::new();
    if !parser.check_kind(&TokenKind::RBrace) {
        loop {
            let (key, _) = parser.expect_identifier()?;
            parser.expect_kind(TokenKind::Colon)?;
            let value = super::expression::parse_expression(parser)?;
            props.push((key, value));
            if !parser.eat_kind(&TokenKind::Comma) {
                break;
            }
        }
    }
    parser.expect_kind(TokenKind::RBrace)?;
    Ok(props)
}

fn parse_rel_pattern(parser: &mut Parser) -> Result<RelPatternNode, ParseError> {
    let start = parser.current_span();

    let left_arrow = parser.eat_kind(&TokenKind::ArrowLeft);
    if !left_arrow {
        // consumes either a lone '-' or the first '-' of '--'
        if parser.eat_kind(&TokenKind::DashDash) {
            return finish_undirected_rel(parser, start);
        }
        parser.expect_kind(TokenKind::Minus)?;
    }

    let (variable, labels, properties, length) = if parser.eat_kind(&TokenKind::LBracket) {
        let variable = if let TokenKind::Identifier(name) = parser.peek_kind().clone() {
            parser.advance();
            Some(name)
        } else {
            None
        };
        let labels = parse_rel_type_labels(parser)?;
        let length = parse_length(parser)?;
        let properties = parse_properties(parser)?;
        parser.expect_kind(TokenKind::RBracket)?;
        (variable, labels, properties, length)
    } else {
        (None, Vec::new(), Vec::new(), None)
    };

    // trailing dash(es) and optional arrow
    if parser.eat_kind(&TokenKind::DashDash) {
        return Ok(RelPatternNode {
            variable,
            labels,
            direction: if left_arrow {
                DirectionNode::In
            } else {
                DirectionNode::Undirected
            },
            properties,
            length,
            span: start,
        });
    }
    parser.expect_kind(TokenKind::Minus)?;
    let right_arrow = parser.eat_kind(&TokenKind::ArrowRight);

    let direction = match (left_arrow, right_arrow) {
        (true, false) => DirectionNode::In,
        (false, true) => DirectionNode::Out,
        (false, false) => DirectionNode::Undirected,
        (true, true) => {
            return Err(parser.unexpected("a single relationship direction".to_string()))
        }
    };

    Ok(RelPatternNode {
        variable,
        labels,
        direction,
        properties,
        length,
        span: start,
    })
}

fn finish_undirected_rel(
    parser: &mut Parser,
    start: Span,
) -> Result<RelPatternNode, ParseError> {
    Ok(RelPatternNode {
        variable: None,
        labels: Vec::new(),
        direction: DirectionNode::Undirected,
        properties: Vec::new(),
        length: None,
        span: start,
    })
}

fn parse_rel_type_labels(parser: &mut Parser) -> Result<Vec<String>, ParseError> {
    let mut labels = Vec::new();
    while parser.eat_kind(&TokenKind::Colon) {
        let (name, _) = parser.expect_identifier()?;
        labels.push(name);
        if !parser.eat_kind(&TokenKind::Pipe) {
            break;
        }
    }
    Ok(labels)
}

/// `*`, `*n`, `*n..m`, `*..m`, `*n..`
fn parse_length(parser: &mut Parser) -> Result<Option<LengthNode>, ParseError> {
    if !parser.eat_kind(&TokenKind::Star) {
        return Ok(None);
    }

    let min = take_int_literal(parser);

    if parser.eat_kind(&TokenKind::DotDot) {
        let max = take_int_literal(parser);
        Ok(Some(LengthNode { min, max }))
    } else {
        Ok(Some(LengthNode { min, max: min }))
    }
}

fn take_int_literal(parser: &mut Parser) -> Option<u32> {
    if let TokenKind::IntegerLiteral(n) = *parser.peek_kind() {
        parser.advance();
        Some(n as u32)
    } else {
        None
    }
}
