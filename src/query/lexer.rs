use nom::branch::alt;
use nom::bytes::complete::{take_while, take_while1};
use nom::character::complete::{char, multispace0};
use nom::combinator::{map, value};
use nom::sequence::delimited;
use nom::{IResult, Parser};
use crate::core::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Word(String),
    Quoted(String),
    Colon,
    LParen,
    RParen,
    LBracket,   // [
    RBracket,   // ]
    LBrace,     // {
    RBrace,     // }
    And,
    Or,
    Not,        // NOT or a leading '-'
}

/// A query token with its character offset in the input
#[derive(Debug, Clone, PartialEq)]
pub struct QueryToken {
    pub kind: TokenKind,
    pub text: String,
    pub position: usize,
}

fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | ':' | '[' | ']' | '{' | '}' | '"')
}

fn punct(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::LParen, char('(')),
        value(TokenKind::RParen, char(')')),
        value(TokenKind::Colon, char(':')),
        value(TokenKind::LBracket, char('[')),
        value(TokenKind::RBracket, char(']')),
        value(TokenKind::LBrace, char('{')),
        value(TokenKind::RBrace, char('}')),
    ))
    .parse(input)
}

fn quoted(input: &str) -> IResult<&str, TokenKind> {
    map(
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
        |s: &str| TokenKind::Quoted(s.to_string()),
    )
    .parse(input)
}

fn word(input: &str) -> IResult<&str, TokenKind> {
    map(take_while1(is_word_char), |s: &str| match s {
        "AND" | "&&" => TokenKind::And,
        "OR" | "||" => TokenKind::Or,
        "NOT" => TokenKind::Not,
        _ => TokenKind::Word(s.to_string()),
    })
    .parse(input)
}

/// '-' directly before a term, quote or group negates it; "-5" stays a word
fn negation(input: &str) -> Option<&str> {
    let rest = input.strip_prefix('-')?;
    let next = rest.chars().next()?;
    if next.is_whitespace() || next.is_ascii_digit() || next == '.' || next == '-' {
        return None;
    }
    Some(rest)
}

/// Split a query string into tokens
pub fn tokenize(input: &str) -> Result<Vec<QueryToken>> {
    let char_position = |rest: &str| input[..input.len() - rest.len()].chars().count();
    let mut tokens = Vec::new();
    let mut rest = input;

    loop {
        let (after_space, _) = multispace0::<&str, nom::error::Error<&str>>(rest)
            .map_err(|_| Error::syntax(rest, char_position(rest), "unreadable input"))?;
        rest = after_space;
        if rest.is_empty() {
            break;
        }
        let position = char_position(rest);

        if let Some(after) = negation(rest) {
            tokens.push(QueryToken {
                kind: TokenKind::Not,
                text: "-".to_string(),
                position,
            });
            rest = after;
            continue;
        }

        let parsed = alt((punct, quoted, word)).parse(rest);
        match parsed {
            Ok((after, kind)) => {
                let text = rest[..rest.len() - after.len()].to_string();
                tokens.push(QueryToken { kind, text, position });
                rest = after;
            }
            Err(_) if rest.starts_with('"') => {
                return Err(Error::syntax("\"", position, "unterminated quote"));
            }
            Err(_) => {
                let token: String = rest.chars().take(1).collect();
                return Err(Error::syntax(token, position, "unexpected character"));
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    fn word(s: &str) -> TokenKind {
        TokenKind::Word(s.to_string())
    }

    #[test]
    fn test_field_range_and_operators() {
        assert_eq!(
            kinds("title:fox AND price:[10 TO *}"),
            vec![
                word("title"), TokenKind::Colon, word("fox"), TokenKind::And,
                word("price"), TokenKind::Colon, TokenKind::LBracket, word("10"),
                word("TO"), word("*"), TokenKind::RBrace,
            ]
        );
    }

    #[test]
    fn test_negation_and_negative_numbers() {
        assert_eq!(kinds("-fox"), vec![TokenKind::Not, word("fox")]);
        assert_eq!(kinds("[-5 TO 5]")[1], word("-5"));
        assert_eq!(kinds("e-mail"), vec![word("e-mail")]);
        assert_eq!(kinds("-(a b)")[0], TokenKind::Not);
    }

    #[test]
    fn test_lowercase_operators_are_words() {
        assert_eq!(kinds("fox and dog"), vec![word("fox"), word("and"), word("dog")]);
    }

    #[test]
    fn test_positions_count_characters() {
        let tokens = tokenize("héllo \"big dog\" )").unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Quoted("big dog".into()));
        assert_eq!(tokens[1].position, 6);
        assert_eq!(tokens[2].position, 16);
    }

    #[test]
    fn test_unterminated_quote() {
        let err = tokenize("title:\"quick fox").unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Syntax { token: "\"".into(), position: 6 }
        );
    }
}
