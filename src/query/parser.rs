use std::ops::Bound;
use std::sync::Arc;
use crate::analysis::analyzer::AnalyzerRegistry;
use crate::core::config::{Config, DefaultOperator};
use crate::core::error::{Error, ErrorKind, Result};
use crate::query::ast::{PhraseQuery, Query, RangeQuery, TermQuery};
use crate::query::lexer::{tokenize, QueryToken, TokenKind};
use crate::schema::schema::{FieldDefinition, FieldType, Schema};

/// Query parser for converting string queries to AST
///
/// Examples:
/// - `rust programming` -> OR over the default fields (or AND, per config)
/// - `rust AND NOT go` -> boolean query
/// - `title:rust` -> field query
/// - `"exact phrase"` -> phrase query
/// - `price:[10 TO 100}` -> range query
pub struct QueryParser {
    schema: Arc<Schema>,
    analyzers: Arc<AnalyzerRegistry>,
    default_analyzer: String,
    default_fields: Vec<String>,
    default_operator: DefaultOperator,
    max_depth: usize,
    max_clauses: usize,
}

impl QueryParser {
    pub fn new(schema: Arc<Schema>, analyzers: Arc<AnalyzerRegistry>, config: &Config) -> Result<Self> {
        let default_fields = if config.default_fields.is_empty() {
            schema.text_fields().map(|f| f.name.clone()).collect()
        } else {
            for name in &config.default_fields {
                if schema.get_field(name).is_none() {
                    return Err(Error::unknown_field(name));
                }
            }
            config.default_fields.clone()
        };

        Ok(QueryParser {
            schema,
            analyzers,
            default_analyzer: config.analyzer.clone(),
            default_fields,
            default_operator: config.default_operator,
            max_depth: config.max_query_depth,
            max_clauses: config.max_clauses,
        })
    }

    /// Parse a query string into Query AST
    pub fn parse(&self, input: &str) -> Result<Query> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Ok(Query::MatchAll);
        }

        let mut state = ParseState {
            parser: self,
            tokens,
            pos: 0,
            depth: 0,
            end_position: input.chars().count(),
        };
        let query = state.parse_or(None)?;

        if let Some(token) = state.peek() {
            return Err(Error::syntax(token.text.clone(), token.position, "unexpected token"));
        }

        self.validate(&query)?;
        Ok(query)
    }

    fn validate(&self, query: &Query) -> Result<()> {
        let depth = query.depth();
        if depth > self.max_depth {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("query nesting depth {} exceeds the limit of {}", depth, self.max_depth),
            ));
        }
        let clauses = query.clause_count();
        if clauses > self.max_clauses {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("query has {} clauses, the limit is {}", clauses, self.max_clauses),
            ));
        }
        Ok(())
    }

    fn field(&self, token: &QueryToken, name: &str) -> Result<&FieldDefinition> {
        self.schema.get_field(name).ok_or_else(|| {
            let mut err = Error::unknown_field(name);
            err.context = format!("{} (at position {})", err.context, token.position);
            err
        })
    }

    /// Turn one raw value into a query against one field
    fn value_query(&self, def: &FieldDefinition, token: &QueryToken, raw: &str) -> Result<Query> {
        match def.field_type {
            FieldType::Text => {
                let analyzer = self
                    .analyzers
                    .require(def.analyzer.as_deref().unwrap_or(&self.default_analyzer))?;
                let tokens = analyzer.analyze(raw);
                match tokens.len() {
                    // Nothing left after analysis: matches nothing
                    0 => Ok(Query::Or(Vec::new())),
                    1 => Ok(Query::Term(TermQuery {
                        field: def.name.clone(),
                        value: tokens[0].text.clone(),
                    })),
                    _ => {
                        let first = tokens[0].position;
                        Ok(Query::Phrase(PhraseQuery {
                            field: def.name.clone(),
                            offsets: tokens.iter().map(|t| t.position - first).collect(),
                            terms: tokens.into_iter().map(|t| t.text).collect(),
                        }))
                    }
                }
            }
            FieldType::Keyword => Ok(Query::Term(TermQuery {
                field: def.name.clone(),
                value: raw.to_string(),
            })),
            FieldType::Numeric => {
                let value = parse_number(raw).ok_or_else(|| {
                    Error::syntax(token.text.clone(), token.position, "expected a number")
                })?;
                Ok(Query::Range(RangeQuery {
                    field: def.name.clone(),
                    lower: Bound::Included(value),
                    upper: Bound::Included(value),
                }))
            }
            FieldType::Vector { .. } => Err(Error::schema_mismatch(
                &def.name,
                "vector fields are searched with knn, not the query language",
            )),
        }
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| !v.is_nan())
}

struct ParseState<'a> {
    parser: &'a QueryParser,
    tokens: Vec<QueryToken>,
    pos: usize,
    depth: usize,
    end_position: usize,
}

impl<'a> ParseState<'a> {
    fn peek(&self) -> Option<&QueryToken> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<QueryToken> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn starts_unary(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(TokenKind::Word(_) | TokenKind::Quoted(_) | TokenKind::LParen | TokenKind::Not)
        )
    }

    /// Error for a missing token at the current spot
    fn unexpected(&self, context: &str) -> Error {
        match self.peek() {
            Some(token) => Error::syntax(token.text.clone(), token.position, context),
            None => Error::syntax("", self.end_position, format!("{} at end of input", context)),
        }
    }

    // or := and ("OR" and)*
    fn parse_or(&mut self, scope: Option<&FieldDefinition>) -> Result<Query> {
        let mut clauses = vec![self.parse_and(scope)?];
        loop {
            match self.peek_kind() {
                Some(TokenKind::Or) => {
                    self.next();
                    if !self.starts_unary() {
                        return Err(self.unexpected("dangling OR"));
                    }
                    clauses.push(self.parse_and(scope)?);
                }
                _ if self.parser.default_operator == DefaultOperator::Or && self.starts_unary() => {
                    clauses.push(self.parse_and(scope)?);
                }
                _ => break,
            }
        }
        Ok(flatten(clauses, Query::Or))
    }

    // and := unary (["AND"] unary)*
    fn parse_and(&mut self, scope: Option<&FieldDefinition>) -> Result<Query> {
        let mut clauses = vec![self.parse_unary(scope)?];
        loop {
            match self.peek_kind() {
                Some(TokenKind::And) => {
                    self.next();
                    if !self.starts_unary() {
                        return Err(self.unexpected("dangling AND"));
                    }
                    clauses.push(self.parse_unary(scope)?);
                }
                // An exclusion always narrows the clause before it
                Some(TokenKind::Not) => clauses.push(self.parse_unary(scope)?),
                _ if self.parser.default_operator == DefaultOperator::And && self.starts_unary() => {
                    clauses.push(self.parse_unary(scope)?);
                }
                _ => break,
            }
        }
        Ok(flatten(clauses, Query::And))
    }

    // unary := ("NOT" | "-") unary | primary
    fn parse_unary(&mut self, scope: Option<&FieldDefinition>) -> Result<Query> {
        if let Some(TokenKind::Not) = self.peek_kind() {
            let token = self.next();
            if !self.starts_unary() {
                return match token {
                    Some(t) if self.peek().is_none() => {
                        Err(Error::syntax(t.text, t.position, "dangling NOT"))
                    }
                    _ => Err(self.unexpected("dangling NOT")),
                };
            }
            self.enter()?;
            let inner = self.parse_unary(scope);
            self.depth -= 1;
            return Ok(Query::Not(Box::new(inner?)));
        }
        self.parse_primary(scope)
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.parser.max_depth {
            let position = self.peek().map_or(self.end_position, |t| t.position);
            self.depth -= 1;
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("query nesting exceeds the limit of {} at position {}", self.parser.max_depth, position),
            ));
        }
        Ok(())
    }

    fn parse_group(&mut self, open: QueryToken, scope: Option<&FieldDefinition>) -> Result<Query> {
        if let Some(TokenKind::RParen) = self.peek_kind() {
            return Err(self.unexpected("empty group"));
        }
        self.enter()?;
        let inner = self.parse_or(scope);
        self.depth -= 1;
        let inner = inner?;
        match self.next() {
            Some(QueryToken { kind: TokenKind::RParen, .. }) => Ok(inner),
            Some(token) => Err(Error::syntax(token.text, token.position, "expected ')'")),
            None => Err(Error::syntax(open.text, open.position, "unbalanced parenthesis")),
        }
    }

    // primary := "(" or ")" | FIELD ":" value | value
    fn parse_primary(&mut self, scope: Option<&FieldDefinition>) -> Result<Query> {
        let Some(token) = self.next() else {
            return Err(self.unexpected("expected a term"));
        };

        match &token.kind {
            TokenKind::LParen => self.parse_group(token, scope),
            TokenKind::Word(word) if matches!(self.peek_kind(), Some(TokenKind::Colon)) => {
                self.next();
                if scope.is_some() {
                    return Err(Error::syntax(token.text.clone(), token.position, "nested field qualifier"));
                }
                if word == "*" {
                    // *:* matches everything
                    return match self.next() {
                        Some(QueryToken { kind: TokenKind::Word(w), .. }) if w == "*" => Ok(Query::MatchAll),
                        Some(t) => Err(Error::syntax(t.text, t.position, "expected '*' after '*:'")),
                        None => Err(self.unexpected("expected a value")),
                    };
                }
                let def = self.parser.field(&token, word)?;
                self.parse_field_value(def)
            }
            TokenKind::Word(word) if scope.is_none() && word == "*" => Ok(Query::MatchAll),
            TokenKind::Word(word) => self.default_value(scope, &token, word),
            TokenKind::Quoted(text) => self.default_value(scope, &token, text),
            TokenKind::LBracket | TokenKind::LBrace => match scope {
                Some(def) => self.parse_range(def, token),
                None => Err(Error::syntax(token.text.clone(), token.position, "range needs a field")),
            },
            TokenKind::And | TokenKind::Or => {
                Err(Error::syntax(token.text.clone(), token.position, "dangling operator"))
            }
            _ => Err(Error::syntax(token.text.clone(), token.position, "unexpected token")),
        }
    }

    // value := TERM | "phrase" | range | "(" or ")"
    fn parse_field_value(&mut self, def: &FieldDefinition) -> Result<Query> {
        let Some(token) = self.next() else {
            return Err(self.unexpected("expected a value"));
        };
        match &token.kind {
            TokenKind::Word(word) => self.parser.value_query(def, &token, word),
            TokenKind::Quoted(text) => self.parser.value_query(def, &token, text),
            TokenKind::LBracket | TokenKind::LBrace => self.parse_range(def, token),
            TokenKind::LParen => self.parse_group(token, Some(def)),
            _ => Err(Error::syntax(token.text.clone(), token.position, "expected a value")),
        }
    }

    /// Unqualified value: every default field, or the field of an enclosing group
    fn default_value(
        &mut self,
        scope: Option<&FieldDefinition>,
        token: &QueryToken,
        raw: &str,
    ) -> Result<Query> {
        if let Some(def) = scope {
            return self.parser.value_query(def, token, raw);
        }
        let parser = self.parser;
        if parser.default_fields.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("'{}' has no field and the schema has no default fields", raw),
            ));
        }
        let mut clauses = Vec::with_capacity(parser.default_fields.len());
        for name in &parser.default_fields {
            let def = parser.field(token, name)?;
            clauses.push(parser.value_query(def, token, raw)?);
        }
        Ok(flatten(clauses, Query::Or))
    }

    // ("[" | "{") BOUND "TO" BOUND ("]" | "}")
    fn parse_range(&mut self, def: &FieldDefinition, open: QueryToken) -> Result<Query> {
        if def.field_type != FieldType::Numeric {
            return Err(Error::schema_mismatch(&def.name, "range queries need a numeric field"));
        }
        let inclusive_lower = open.kind == TokenKind::LBracket;

        let lower = self.parse_bound(inclusive_lower)?;
        match self.next() {
            Some(QueryToken { kind: TokenKind::Word(w), .. }) if w == "TO" => {}
            Some(t) => return Err(Error::syntax(t.text, t.position, "expected TO in range")),
            None => return Err(Error::syntax(open.text, open.position, "unterminated range")),
        }
        let upper_token = self.peek().cloned();
        let upper_raw = self.parse_bound_raw()?;
        let inclusive_upper = match self.next() {
            Some(QueryToken { kind: TokenKind::RBracket, .. }) => true,
            Some(QueryToken { kind: TokenKind::RBrace, .. }) => false,
            Some(t) => return Err(Error::syntax(t.text, t.position, "expected ']' or '}'")),
            None => return Err(Error::syntax(open.text, open.position, "unterminated range")),
        };
        let upper = to_bound(upper_raw, inclusive_upper, upper_token.as_ref())?;

        Ok(Query::Range(RangeQuery {
            field: def.name.clone(),
            lower,
            upper,
        }))
    }

    fn parse_bound(&mut self, inclusive: bool) -> Result<Bound<f64>> {
        let token = self.peek().cloned();
        let raw = self.parse_bound_raw()?;
        to_bound(raw, inclusive, token.as_ref())
    }

    fn parse_bound_raw(&mut self) -> Result<String> {
        match self.next() {
            Some(QueryToken { kind: TokenKind::Word(w), .. }) if w != "TO" => Ok(w),
            Some(t) => Err(Error::syntax(t.text, t.position, "expected a range bound")),
            None => Err(self.unexpected("expected a range bound")),
        }
    }
}

fn to_bound(raw: String, inclusive: bool, token: Option<&QueryToken>) -> Result<Bound<f64>> {
    if raw == "*" {
        return Ok(Bound::Unbounded);
    }
    let value = parse_number(&raw).ok_or_else(|| {
        let position = token.map_or(0, |t| t.position);
        Error::syntax(raw.clone(), position, "range bound is not a number")
    })?;
    Ok(if inclusive { Bound::Included(value) } else { Bound::Excluded(value) })
}

fn flatten(mut clauses: Vec<Query>, combine: fn(Vec<Query>) -> Query) -> Query {
    if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        combine(clauses)
    }
}
