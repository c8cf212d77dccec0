//! Lexer stage: turns Cypher source text into a finite token stream.
//!
//! Recognizes keywords (case-insensitive), identifiers (including
//! backtick-quoted), numeric and string literals, punctuation, arrows, and
//! comments. Every token carries an exact source [`Span`]. This stage never
//! panics on malformed input — unterminated strings/comments and disallowed
//! code points surface as [`LexError`].

mod token;

pub use token::{Keyword, Token, TokenKind};

use crate::error::Span;
use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LexError {
    #[error("unterminated string literal starting at byte {start}")]
    UnterminatedString { start: usize, span: Span },

    #[error("unterminated block comment starting at byte {start}")]
    UnterminatedBlockComment { start: usize, span: Span },

    #[error("disallowed character {ch:?}")]
    DisallowedCodePoint { ch: char, span: Span },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            LexError::UnterminatedString { span, .. } => *span,
            LexError::UnterminatedBlockComment { span, .. } => *span,
            LexError::DisallowedCodePoint { span, .. } => *span,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        "LexError"
    }
}

struct Cursor<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: u32,
    column: u32,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Cursor {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source[offset..].chars().next()
    }

    fn byte_offset(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(i, _)| *i)
            .unwrap_or(self.source.len())
    }

    fn advance(&mut self) -> Option<char> {
        let (_, ch) = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn here(&mut self) -> (usize, u32, u32) {
        (self.byte_offset(), self.line, self.column)
    }
}

/// Tokenize a complete Cypher source string.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut cursor = Cursor::new(source);
    let mut tokens = Vec::new();

    loop {
        skip_whitespace_and_comments(&mut cursor)?;

        let (start, line, column) = cursor.here();
        let Some(ch) = cursor.peek() else {
            tokens.push(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                span: Span::new(start, start, line, column),
            });
            break;
        };

        let token = if ch == '"' || ch == '\'' {
            lex_string(&mut cursor, start, line, column)?
        } else if ch == '`' {
            lex_backtick_identifier(&mut cursor, start, line, column)?
        } else if ch.is_ascii_digit() {
            lex_number(&mut cursor, start, line, column)
        } else if ch == '$' {
            lex_parameter(&mut cursor, start, line, column)
        } else if is_identifier_start(ch) {
            lex_identifier_or_keyword(&mut cursor, start, line, column)
        } else {
            lex_punctuation(&mut cursor, start, line, column)?
        };

        tokens.push(token);
    }

    Ok(tokens)
}

fn is_identifier_start(ch: char) -> bool {
    ch == '_' || ch.is_alphabetic()
}

fn is_identifier_continue(ch: char) -> bool {
    ch == '_' || ch.is_alphanumeric()
}

fn skip_whitespace_and_comments(cursor: &mut Cursor) -> Result<(), LexError> {
    loop {
        let mut advanced = false;
        while matches!(cursor.peek(), Some(ch) if ch.is_whitespace()) {
            cursor.advance();
            advanced = true;
        }
        let offset = cursor.byte_offset();
        if cursor.source[offset..].starts_with("//") {
            while !matches!(cursor.peek(), Some('\n') | None) {
                cursor.advance();
            }
            advanced = true;
        } else if cursor.source[offset..].starts_with("/*") {
            let (start, line, column) = cursor.here();
            cursor.advance();
            cursor.advance();
            loop {
                let rest = cursor.byte_offset();
                if cursor.source[rest..].starts_with("*/") {
                    cursor.advance();
                    cursor.advance();
                    break;
                }
                if cursor.advance().is_none() {
                    return Err(LexError::UnterminatedBlockComment {
                        start,
                        span: Span::new(start, cursor.source.len(), line, column),
                    });
                }
            }
            advanced = true;
        }
        if !advanced {
            break;
        }
    }
    Ok(())
}

fn lex_string(
    cursor: &mut Cursor,
    start: usize,
    line: u32,
    column: u32,
) -> Result<Token, LexError> {
    let quote = cursor.advance().expect("caller checked quote char");
    let mut value = String::new();
    loop {
        match cursor.advance() {
            None => {
                return Err(LexError::UnterminatedString {
                    start,
                    span: Span::new(start, cursor.source.len(), line, column),
                })
            }
            Some(ch) if ch == quote => break,
            Some('\\') => match cursor.advance() {
                Some('n') => value.push('\n'),
                Some('t') => value.push('\t'),
                Some('r') => value.push('\r'),
                Some('\\') => value.push('\\'),
                Some(c) if c == quote => value.push(quote),
                Some(other) => value.push(other),
                None => {
                    return Err(LexError::UnterminatedString {
                        start,
                        span: Span::new(start, cursor.source.len(), line, column),
                    })
                }
            },
            Some(ch) => value.push(ch),
        }
    }
    let end = cursor.byte_offset();
    Ok(Token {
        kind: TokenKind::StringLiteral(value.clone()),
        lexeme: value,
        span: Span::new(start, end, line, column),
    })
}

fn lex_backtick_identifier(
    cursor: &mut Cursor,
    start: usize,
    line: u32,
    column: u32,
) -> Result<Token, LexError> {
    cursor.advance();
    let mut name = String::new();
    loop {
        match cursor.advance() {
            None => {
                return Err(LexError::UnterminatedString {
                    start,
                    span: Span::new(start, cursor.source.len(), line, column),
                })
            }
            Some('`') => break,
            Some(ch) => name.push(ch),
        }
    }
    let end = cursor.byte_offset();
    Ok(Token {
        kind: TokenKind::Identifier(name.clone()),
        lexeme: name,
        span: Span::new(start, end, line, column),
    })
}

fn lex_number(cursor: &mut Cursor, start: usize, line: u32, column: u32) -> Token {
    let mut text = String::new();
    let mut is_float = false;
    while matches!(cursor.peek(), Some(c) if c.is_ascii_digit()) {
        text.push(cursor.advance().unwrap());
    }
    if cursor.peek() == Some('.') && matches!(cursor.peek_at(cursor.byte_offset() + 1), Some(c) if c.is_ascii_digit())
    {
        is_float = true;
        text.push(cursor.advance().unwrap()); // '.'
        while matches!(cursor.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(cursor.advance().unwrap());
        }
    }
    if matches!(cursor.peek(), Some('e') | Some('E')) {
        let rest_after_e = cursor.byte_offset() + 1;
        let next = cursor.peek_at(rest_after_e);
        let exponent_follows = matches!(next, Some(c) if c.is_ascii_digit())
            || (matches!(next, Some('+') | Some('-'))
                && matches!(cursor.peek_at(rest_after_e + 1), Some(c) if c.is_ascii_digit()));
        if exponent_follows {
            is_float = true;
            text.push(cursor.advance().unwrap()); // e/E
            if matches!(cursor.peek(), Some('+') | Some('-')) {
                text.push(cursor.advance().unwrap());
            }
            while matches!(cursor.peek(), Some(c) if c.is_ascii_digit()) {
                text.push(cursor.advance().unwrap());
            }
        }
    }
    let end = cursor.byte_offset();
    let span = Span::new(start, end, line, column);
    if is_float {
        Token {
            kind: TokenKind::FloatLiteral(text.parse().unwrap_or(0.0)),
            lexeme: text,
            span,
        }
    } else {
        Token {
            kind: TokenKind::IntegerLiteral(text.parse().unwrap_or(0)),
            lexeme: text,
            span,
        }
    }
}

fn lex_parameter(cursor: &mut Cursor, start: usize, line: u32, column: u32) -> Token {
    cursor.advance(); // '$'
    let mut name = String::new();
    while matches!(cursor.peek(), Some(c) if is_identifier_continue(c)) {
        name.push(cursor.advance().unwrap());
    }
    let end = cursor.byte_offset();
    Token {
        kind: TokenKind::Parameter(name.clone()),
        lexeme: format!("${name}"),
        span: Span::new(start, end, line, column),
    }
}

fn lex_identifier_or_keyword(cursor: &mut Cursor, start: usize, line: u32, column: u32) -> Token {
    let mut text = String::new();
    while matches!(cursor.peek(), Some(c) if is_identifier_continue(c)) {
        text.push(cursor.advance().unwrap());
    }
    let end = cursor.byte_offset();
    let span = Span::new(start, end, line, column);
    match Keyword::lookup(&text) {
        Some(keyword) => Token {
            kind: TokenKind::Keyword(keyword),
            lexeme: text,
            span,
        },
        None => Token {
            kind: TokenKind::Identifier(text.clone()),
            lexeme: text,
            span,
        },
    }
}

fn lex_punctuation(
    cursor: &mut Cursor,
    start: usize,
    line: u32,
    column: u32,
) -> Result<Token, LexError> {
    let ch = cursor.advance().unwrap();
    let kind = match ch {
        '(' => TokenKind::LParen,
        ')' => TokenKind::RParen,
        '[' => TokenKind::LBracket,
        ']' => TokenKind::RBracket,
        '{' => TokenKind::LBrace,
        '}' => TokenKind::RBrace,
        ',' => TokenKind::Comma,
        ':' => TokenKind::Colon,
        ';' => TokenKind::Semicolon,
        '|' => TokenKind::Pipe,
        '+' => TokenKind::Plus,
        '*' => TokenKind::Star,
        '/' => TokenKind::Slash,
        '%' => TokenKind::Percent,
        '.' => {
            if cursor.peek() == Some('.') {
                cursor.advance();
                TokenKind::DotDot
            } else {
                TokenKind::Dot
            }
        }
        '=' => TokenKind::Eq,
        '-' => {
            if cursor.peek() == Some('-') {
                cursor.advance();
                TokenKind::DashDash
            } else if cursor.peek() == Some('>') {
                cursor.advance();
                TokenKind::ArrowRight
            } else {
                TokenKind::Minus
            }
        }
        '<' => {
            if cursor.peek() == Some('>') {
                cursor.advance();
                TokenKind::NotEq
            } else if cursor.peek() == Some('-') {
                cursor.advance();
                TokenKind::ArrowLeft
            } else if cursor.peek() == Some('=') {
                cursor.advance();
                TokenKind::LtEq
            } else {
                TokenKind::Lt
            }
        }
        '>' => {
            if cursor.peek() == Some('=') {
                cursor.advance();
                TokenKind::GtEq
            } else {
                TokenKind::Gt
            }
        }
        other => {
            let end = cursor.byte_offset();
            return Err(LexError::DisallowedCodePoint {
                ch: other,
                span: Span::new(start, end, line, column),
            });
        }
    };
    let end = cursor.byte_offset();
    Ok(Token {
        kind,
        lexeme: cursor.source[start..end].to_string(),
        span: Span::new(start, end, line, column),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_simple_match_return() {
        let ks = kinds("MATCH (n:User) RETURN n.name");
        assert_eq!(
            ks,
            vec![
                TokenKind::Keyword(Keyword::Match),
                TokenKind::LParen,
                TokenKind::Identifier("n".into()),
                TokenKind::Colon,
                TokenKind::Identifier("User".into()),
                TokenKind::RParen,
                TokenKind::Keyword(Keyword::Return),
                TokenKind::Identifier("n".into()),
                TokenKind::Dot,
                TokenKind::Identifier("name".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn recognizes_arrows_and_dashdash() {
        assert_eq!(
            kinds("->"),
            vec![TokenKind::ArrowRight, TokenKind::Eof]
        );
        assert_eq!(kinds("<-"), vec![TokenKind::ArrowLeft, TokenKind::Eof]);
        assert_eq!(kinds("--"), vec![TokenKind::DashDash, TokenKind::Eof]);
    }

    #[test]
    fn parses_numeric_literals() {
        assert_eq!(
            kinds("1 2.5 10e3"),
            vec![
                TokenKind::IntegerLiteral(1),
                TokenKind::FloatLiteral(2.5),
                TokenKind::FloatLiteral(10e3),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn parses_string_literal_with_escapes() {
        let ks = kinds(r#"'it\'s here'"#);
        assert_eq!(
            ks,
            vec![
                TokenKind::StringLiteral("it's here".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn parses_parameter_reference() {
        assert_eq!(
            kinds("$name"),
            vec![TokenKind::Parameter("name".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_string_is_a_lex_error() {
        let err = tokenize("'abc").unwrap_err();
        assert!(matches!(err, LexError::UnterminatedString { .. }));
    }

    #[test]
    fn unterminated_block_comment_is_a_lex_error() {
        let err = tokenize("/* never closes").unwrap_err();
        assert!(matches!(err, LexError::UnterminatedBlockComment { .. }));
    }

    #[test]
    fn disallowed_code_point_is_a_lex_error() {
        let err = tokenize("MATCH (n) RETURN n § foo").unwrap_err();
        assert!(matches!(err, LexError::DisallowedCodePoint { .. }));
    }

    #[test]
    fn strips_line_and_block_comments() {
        let ks = kinds("MATCH (n) // trailing comment\nRETURN n /* inline */ .name");
        assert_eq!(
            ks,
            vec![
                TokenKind::Keyword(Keyword::Match),
                TokenKind::LParen,
                TokenKind::Identifier("n".into()),
                TokenKind::RParen,
                TokenKind::Keyword(Keyword::Return),
                TokenKind::Identifier("n".into()),
                TokenKind::Dot,
                TokenKind::Identifier("name".into()),
                TokenKind::Eof,
            ]
        );
    }
}
