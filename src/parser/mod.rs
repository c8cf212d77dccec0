//! Parser stage: a hand-written recursive-descent recognizer that turns the
//! lexer's token stream into a [`tree::ParseTree`].
//!
//! Operator precedence follows the Cypher reference: `OR < AND < NOT <
//! comparison < additive < multiplicative < unary`. Grammar is split one
//! module per concern (clauses here, patterns in [`pattern`], expressions in
//! [`expression`]) the way the clause-per-module layout of comparable
//! Cypher-over-relational translators in this codebase's lineage does.

mod expression;
mod pattern;
pub mod tree;

use crate::error::Span;
use crate::lexer::{Keyword, Token, TokenKind};
use thiserror::Error;
use tree::*;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String, span: Span },

    #[error("trailing tokens after the query's terminal RETURN clause")]
    TrailingTokens { span: Span },

    #[error("a query must end with a RETURN clause")]
    MissingReturn { span: Span },

    #[error("a query must contain at least one MATCH clause")]
    NoReadingClause { span: Span },

    #[error("empty query")]
    EmptyQuery { span: Span },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. } => *span,
            ParseError::UnexpectedEof { span, .. } => *span,
            ParseError::TrailingTokens { span } => *span,
            ParseError::MissingReturn { span } => *span,
            ParseError::NoReadingClause { span } => *span,
            ParseError::EmptyQuery { span } => *span,
        }
    }
}

pub(crate) struct Parser<'a> {
    pub(crate) tokens: &'a [Token],
    pub(crate) pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Parser { tokens, pos: 0 }
    }

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    pub(crate) fn peek_nth(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    pub(crate) fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    pub(crate) fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if !self.at_eof() {
            self.pos += 1;
        }
        tok
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn check_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(k) if *k == kw)
    }

    pub(crate) fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if self.check_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_keyword(&mut self, kw: Keyword) -> Result<Token, ParseError> {
        if self.check_keyword(kw) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(format!("{kw:?}")))
        }
    }

    pub(crate) fn check_kind(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    pub(crate) fn eat_kind(&mut self, kind: &TokenKind) -> bool {
        if self.check_kind(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_kind(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.check_kind(&kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(format!("{kind:?}")))
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> Result<(String, Span), ParseError> {
        let span = self.current_span();
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok((name, span))
            }
            _ => Err(self.unexpected("an identifier".to_string())),
        }
    }

    pub(crate) fn unexpected(&self, expected: String) -> ParseError {
        let found = describe_token(self.peek_kind());
        if self.at_eof() {
            ParseError::UnexpectedEof {
                expected,
                span: self.current_span(),
            }
        } else {
            ParseError::UnexpectedToken {
                expected,
                found,
                span: self.current_span(),
            }
        }
    }

    /// True when the current token starts a new top-level clause — used to
    /// bound the token range of an unsupported clause we can't otherwise
    /// parse the internal grammar of.
    fn at_clause_boundary(&self) -> bool {
        self.at_eof()
            || matches!(
                self.peek_kind(),
                TokenKind::Keyword(
                    Keyword::Match
                        | Keyword::Optional
                        | Keyword::With
                        | Keyword::Return
                        | Keyword::Unwind
                        | Keyword::Create
                        | Keyword::Merge
                        | Keyword::Set
                        | Keyword::Delete
                        | Keyword::Remove
                        | Keyword::Detach
                        | Keyword::Call
                        | Keyword::Union
                )
            )
            || matches!(self.peek_kind(), TokenKind::Semicolon)
    }
}

fn describe_token(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Eof => "end of input".to_string(),
        TokenKind::Keyword(k) => format!("keyword {k:?}"),
        TokenKind::Identifier(name) => format!("identifier `{name}`"),
        other => format!("{other:?}"),
    }
}

/// Parse a complete single Cypher statement.
pub fn parse(tokens: &[Token]) -> Result<ParseTree, ParseError> {
    let mut parser = Parser::new(tokens);

    if parser.at_eof() {
        return Err(ParseError::EmptyQuery {
            span: parser.current_span(),
        });
    }

    let mut clauses = Vec::new();
    while !parser.at_eof() {
        clauses.push(parse_clause(&mut parser)?);
    }

    parser.eat_kind(&TokenKind::Semicolon);
    if !parser.at_eof() {
        return Err(ParseError::TrailingTokens {
            span: parser.current_span(),
        });
    }

    let has_reading_clause = clauses
        .iter()
        .any(|c| matches!(c, ClauseNode::Match(_) | ClauseNode::Unwind(_)));
    if !has_reading_clause {
        return Err(ParseError::NoReadingClause {
            span: clauses.first().map(span_of).unwrap_or(Span::new(0, 0, 1, 1)),
        });
    }

    match clauses.last() {
        Some(ClauseNode::Return(_)) => {}
        Some(other) => {
            return Err(ParseError::MissingReturn {
                span: span_of(other),
            })
        }
        None => unreachable!("checked non-empty above"),
    }

    Ok(ParseTree { clauses })
}

fn span_of(clause: &ClauseNode) -> Span {
    match clause {
        ClauseNode::Match(m) => m.span,
        ClauseNode::With(w) => w.span,
        ClauseNode::Return(r) => r.span,
        ClauseNode::Unwind(u) => u.span,
        ClauseNode::Unsupported { span, .. } => *span,
    }
}

fn parse_clause(parser: &mut Parser) -> Result<ClauseNode, ParseError> {
    if parser.check_keyword(Keyword::Optional) {
        return parse_match_clause(parser, true).map(ClauseNode::Match);
    }
    if parser.check_keyword(Keyword::Match) {
        return parse_match_clause(parser, false).map(ClauseNode::Match);
    }
    if parser.check_keyword(Keyword::With) {
        return parse_with_clause(parser).map(ClauseNode::With);
    }
    if parser.check_keyword(Keyword::Return) {
        return parse_return_clause(parser).map(ClauseNode::Return);
    }
    if parser.check_keyword(Keyword::Unwind) {
        return parse_unwind_clause(parser).map(ClauseNode::Unwind);
    }
    if let TokenKind::Keyword(kw) = parser.peek_kind() {
        if kw.is_unsupported_construct() {
            return parse_unsupported_clause(parser);
        }
    }
    Err(parser.unexpected(
        "MATCH, OPTIONAL MATCH, WITH, RETURN, or UNWIND".to_string(),
    ))
}

fn parse_unsupported_clause(parser: &mut Parser) -> Result<ClauseNode, ParseError> {
    let start = parser.current_span();
    let keyword_tok = parser.advance();
    let mut depth: i32 = 0;
    while !parser.at_eof() {
        match parser.peek_kind() {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => depth -= 1,
            _ => {}
        }
        if depth <= 0 && parser.at_clause_boundary() {
            break;
        }
        parser.advance();
    }
    Ok(ClauseNode::Unsupported {
        keyword: keyword_tok.lexeme,
        span: start,
    })
}

fn parse_match_clause(parser: &mut Parser, optional: bool) -> Result<MatchNode, ParseError> {
    let start = parser.current_span();
    if optional {
        parser.expect_keyword(Keyword::Optional)?;
    }
    parser.expect_keyword(Keyword::Match)?;

    let mut patterns = vec![pattern::parse_pattern(parser)?];
    while parser.eat_kind(&TokenKind::Comma) {
        patterns.push(pattern::parse_pattern(parser)?);
    }

    let where_clause = if parser.eat_keyword(Keyword::Where) {
        Some(expression::parse_expression(parser)?)
    } else {
        None
    };

    Ok(MatchNode {
        optional,
        patterns,
        where_clause,
        span: start,
    })
}

fn parse_unwind_clause(parser: &mut Parser) -> Result<UnwindNode, ParseError> {
    let start = parser.current_span();
    parser.expect_keyword(Keyword::Unwind)?;
    let expression = expression::parse_expression(parser)?;
    parser.expect_keyword(Keyword::As)?;
    let (alias, _) = parser.expect_identifier()?;
    Ok(UnwindNode {
        expression,
        alias,
        span: start,
    })
}

fn parse_projection_list(parser: &mut Parser) -> Result<(bool, Vec<ProjectionNode>), ParseError> {
    let distinct = parser.eat_keyword(Keyword::Distinct);

    let mut items = Vec::new();
    loop {
        let span = parser.current_span();
        if parser.eat_kind(&TokenKind::Star) {
            items.push(ProjectionNode {
                expression: ExprNode::Star(span),
                alias: None,
                span,
            });
        } else {
            let expression = expression::parse_expression(parser)?;
            let alias = if parser.eat_keyword(Keyword::As) {
                Some(parser.expect_identifier()?.0)
            } else {
                None
            };
            items.push(ProjectionNode {
                expression,
                alias,
                span,
            });
        }
        if !parser.eat_kind(&TokenKind::Comma) {
            break;
        }
    }
    Ok((distinct, items))
}

fn parse_order_by(parser: &mut Parser) -> Result<Vec<OrderItemNode>, ParseError> {
    if !parser.eat_keyword(Keyword::Order) {
        return Ok(Vec::new());
    }
    parser.expect_keyword(Keyword::By)?;
    let mut items = Vec::new();
    loop {
        let expression = expression::parse_expression(parser)?;
        let descending = if parser.eat_keyword(Keyword::Desc) {
            true
        } else {
            parser.eat_keyword(Keyword::Asc);
            false
        };
        items.push(OrderItemNode {
            expression,
            descending,
        });
        if !parser.eat_kind(&TokenKind::Comma) {
            break;
        }
    }
    Ok(items)
}

fn parse_skip(parser: &mut Parser) -> Result<Option<ExprNode>, ParseError> {
    if parser.eat_keyword(Keyword::Skip) {
        Ok(Some(expression::parse_expression(parser)?))
    } else {
        Ok(None)
    }
}

fn parse_limit(parser: &mut Parser) -> Result<Option<ExprNode>, ParseError> {
    if parser.eat_keyword(Keyword::Limit) {
        Ok(Some(expression::parse_expression(parser)?))
    } else {
        Ok(None)
    }
}

fn parse_with_clause(parser: &mut Parser) -> Result<WithNode, ParseError> {
    let start = parser.current_span();
    parser.expect_keyword(Keyword::With)?;
    let (distinct, items) = parse_projection_list(parser)?;
    let where_clause = if parser.eat_keyword(Keyword::Where) {
        Some(expression::parse_expression(parser)?)
    } else {
        None
    };
    let order_by = parse_order_by(parser)?;
    let skip = parse_skip(parser)?;
    let limit = parse_limit(parser)?;
    Ok(WithNode {
        items,
        distinct,
        where_clause,
        order_by,
        skip,
        limit,
        span: start,
    })
}

fn parse_return_clause(parser: &mut Parser) -> Result<ReturnNode, ParseError> {
    let start = parser.current_span();
    parser.expect_keyword(Keyword::Return)?;
    let (distinct, items) = parse_projection_list(parser)?;
    let order_by = parse_order_by(parser)?;
    let skip = parse_skip(parser)?;
    let limit = parse_limit(parser)?;
    Ok(ReturnNode {
        items,
        distinct,
        order_by,
        skip,
        limit,
        span: start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_source(src: &str) -> Result<ParseTree, ParseError> {
        let tokens = tokenize(src).expect("lexing should succeed in these tests");
        parse(&tokens)
    }

    #[test]
    fn parses_simple_match_return() {
        let tree = parse_source("MATCH (n:User) RETURN n.name LIMIT 5").unwrap();
        assert_eq!(tree.clauses.len(), 2);
        assert!(matches!(tree.clauses[0], ClauseNode::Match(_)));
        match &tree.clauses[1] {
            ClauseNode::Return(r) => {
                assert_eq!(r.items.len(), 1);
                assert!(r.limit.is_some());
            }
            other => panic!("expected Return, got {other:?}"),
        }
    }

    #[test]
    fn requires_terminal_return() {
        let err = parse_source("MATCH (n:User)").unwrap_err();
        assert!(matches!(err, ParseError::MissingReturn { .. }));
    }

    #[test]
    fn requires_a_reading_clause() {
        let err = parse_source("RETURN 1").unwrap_err();
        assert!(matches!(err, ParseError::NoReadingClause { .. }));
    }

    #[test]
    fn rejects_trailing_tokens() {
        let err = parse_source("MATCH (n) RETURN n garbage").unwrap_err();
        assert!(matches!(err, ParseError::TrailingTokens { .. }));
    }

    #[test]
    fn recognizes_unsupported_create_clause() {
        let tree = parse_source("CREATE (n:User) MATCH (m) RETURN m").unwrap();
        assert!(matches!(
            tree.clauses[0],
            ClauseNode::Unsupported { .. }
        ));
    }

    #[test]
    fn parses_optional_match() {
        let tree = parse_source("MATCH (a) OPTIONAL MATCH (b) RETURN a, b").unwrap();
        match &tree.clauses[1] {
            ClauseNode::Match(m) => assert!(m.optional),
            other => panic!("expected Match, got {other:?}"),
        }
    }

    #[test]
    fn parses_with_chain() {
        let tree =
            parse_source("MATCH (a) WITH a, count(a) AS c WHERE c > 1 RETURN a").unwrap();
        assert_eq!(tree.clauses.len(), 3);
        assert!(matches!(tree.clauses[1], ClauseNode::With(_)));
    }
}
