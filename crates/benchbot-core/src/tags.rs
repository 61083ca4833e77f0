//! Tag predicates selecting a subset of a benchmark suite.
//!
//! The accepted grammar is deliberately narrow: negation, conjunction,
//! disjunction, call form, the literal `ALL` and string literals. Any other
//! expression shape is rejected before a job is constructed; the validated
//! source text is forwarded verbatim to the benchmark harness.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A node of a validated tag-predicate expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagExpr {
    /// The literal `ALL`: every benchmark entry.
    All,
    /// A string literal naming one tag.
    Tag(String),
    Not(Box<TagExpr>),
    And(Box<TagExpr>, Box<TagExpr>),
    Or(Box<TagExpr>, Box<TagExpr>),
    /// Call form, resolved by the harness (e.g. `startswith("linalg")`).
    Call(String, Vec<TagExpr>),
}

/// A validated tag predicate. Keeps the original source text so it can be
/// passed through to the harness unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagPredicate {
    source: String,
}

impl TagPredicate {
    /// Parse and validate a predicate string.
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = lex(source)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
        };
        parser.expr()?;
        if parser.pos != tokens.len() {
            return Err(Error::InvalidSubmission(format!(
                "trailing input in tag predicate: {source:?}"
            )));
        }
        Ok(Self {
            source: source.trim().to_string(),
        })
    }

    /// Parse into the expression tree.
    pub fn expr(&self) -> TagExpr {
        // The source was validated at construction, so this cannot fail.
        let tokens = lex(&self.source).unwrap_or_default();
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
        };
        parser.expr().unwrap_or(TagExpr::All)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Display for TagPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

/// Whether a string is a structurally valid tag predicate.
pub fn is_valid_predicate(source: &str) -> bool {
    TagPredicate::parse(source).is_ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Not,
    AndAnd,
    OrOr,
    LParen,
    RParen,
    Comma,
    Str(String),
    Ident(String),
}

fn lex(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '&' => {
                chars.next();
                if chars.next_if_eq(&'&').is_none() {
                    return Err(invalid(source, "single `&`"));
                }
                tokens.push(Token::AndAnd);
            }
            '|' => {
                chars.next();
                if chars.next_if_eq(&'|').is_none() {
                    return Err(invalid(source, "single `|`"));
                }
                tokens.push(Token::OrOr);
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(e @ ('"' | '\\')) => s.push(e),
                            _ => return Err(invalid(source, "bad escape in string literal")),
                        },
                        Some(c) => s.push(c),
                        None => return Err(invalid(source, "unterminated string literal")),
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(invalid(source, &format!("unexpected character {other:?}")));
            }
        }
    }

    Ok(tokens)
}

fn invalid(source: &str, what: &str) -> Error {
    Error::InvalidSubmission(format!("invalid tag predicate {source:?}: {what}"))
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<TagExpr> {
        let mut lhs = self.and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.and()?;
            lhs = TagExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<TagExpr> {
        let mut lhs = self.unary()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.unary()?;
            lhs = TagExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<TagExpr> {
        if self.eat(&Token::Not) {
            return Ok(TagExpr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<TagExpr> {
        match self.next() {
            Some(Token::Str(s)) => Ok(TagExpr::Tag(s.clone())),
            Some(Token::Ident(name)) if name == "ALL" => Ok(TagExpr::All),
            Some(Token::Ident(name)) => {
                // A bare identifier is only valid in call form.
                if !self.eat(&Token::LParen) {
                    return Err(Error::InvalidSubmission(format!(
                        "bare identifier {name:?} is not a valid tag predicate"
                    )));
                }
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.expr()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        if !self.eat(&Token::Comma) {
                            return Err(Error::InvalidSubmission(format!(
                                "malformed argument list in call to {name:?}"
                            )));
                        }
                    }
                }
                Ok(TagExpr::Call(name.clone(), args))
            }
            Some(Token::LParen) => {
                let inner = self.expr()?;
                if !self.eat(&Token::RParen) {
                    return Err(Error::InvalidSubmission(
                        "unbalanced parentheses in tag predicate".to_string(),
                    ));
                }
                Ok(inner)
            }
            _ => Err(Error::InvalidSubmission(
                "expected a tag, ALL, negation or call in tag predicate".to_string(),
            )),
        }
    }
}
