// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tokenizer and recursive-descent parser for filter expressions.
//!
//! ```text
//! expr     ::= term ( OR term )*
//! term     ::= factor ( AND factor )*
//! factor   ::= NOT factor | '(' expr ')' | compare
//! compare  ::= field op operand
//! operand  ::= '%' digits | integer | float | 'string' | TRUE | FALSE
//! op       ::= '=' | '<>' | '!=' | '<' | '<=' | '>' | '>='
//! ```

use super::{FieldValue, FilterError};

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(FieldValue),
    /// `%n`, substituted from the reader's filter parameters.
    Param(usize),
}

/// Parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        field: String,
        op: CompareOp,
        operand: Operand,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Field names referenced anywhere in the expression, deduplicated.
    pub fn fields(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut Vec<String>) {
        match self {
            Predicate::Compare { field, .. } => {
                if !out.iter().any(|f| f == field) {
                    out.push(field.clone());
                }
            }
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                a.collect_fields(out);
                b.collect_fields(out);
            }
            Predicate::Not(inner) => inner.collect_fields(out),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Param(usize),
    Op(CompareOp),
    LParen,
    RParen,
    And,
    Or,
    Not,
    True,
    False,
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, FilterError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }
            '(' => {
                tokens.push((start, Token::LParen));
                i += 1;
            }
            ')' => {
                tokens.push((start, Token::RParen));
                i += 1;
            }
            '=' => {
                tokens.push((start, Token::Op(CompareOp::Eq)));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push((start, Token::Op(CompareOp::Ne)));
                i += 2;
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    tokens.push((start, Token::Op(CompareOp::Le)));
                    i += 2;
                }
                Some('>') => {
                    tokens.push((start, Token::Op(CompareOp::Ne)));
                    i += 2;
                }
                _ => {
                    tokens.push((start, Token::Op(CompareOp::Lt)));
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push((start, Token::Op(CompareOp::Ge)));
                    i += 2;
                } else {
                    tokens.push((start, Token::Op(CompareOp::Gt)));
                    i += 1;
                }
            }
            '%' => {
                i += 1;
                let digits_start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let digits: String = chars[digits_start..i].iter().collect();
                let index = digits
                    .parse::<usize>()
                    .map_err(|_| FilterError::parse(start, "expected parameter index after '%'"))?;
                tokens.push((start, Token::Param(index)));
            }
            '\'' => {
                i += 1;
                let text_start = i;
                while i < chars.len() && chars[i] != '\'' {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(FilterError::parse(start, "unterminated string literal"));
                }
                let text: String = chars[text_start..i].iter().collect();
                tokens.push((start, Token::Str(text)));
                i += 1;
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let token = if text.contains('.') {
                    text.parse::<f64>()
                        .map(Token::Float)
                        .map_err(|_| FilterError::parse(start, "malformed number"))?
                } else {
                    text.parse::<i64>()
                        .map(Token::Int)
                        .map_err(|_| FilterError::parse(start, "malformed number"))?
                };
                tokens.push((start, token));
            }
            c if c.is_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.to_ascii_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    "TRUE" => Token::True,
                    "FALSE" => Token::False,
                    _ => Token::Ident(word),
                };
                tokens.push((start, token));
            }
            other => {
                return Err(FilterError::parse(
                    start,
                    &format!("unexpected character '{}'", other),
                ));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<Predicate, FilterError> {
        let mut left = self.term()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.term()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Predicate, FilterError> {
        let mut left = self.factor()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.factor()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Predicate, FilterError> {
        match self.peek() {
            Some(Token::Not) => {
                self.pos += 1;
                Ok(Predicate::Not(Box::new(self.factor()?)))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                let at = self.offset();
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(FilterError::parse(at, "expected ')'")),
                }
            }
            _ => self.compare(),
        }
    }

    fn compare(&mut self) -> Result<Predicate, FilterError> {
        let at = self.offset();
        let field = match self.next() {
            Some(Token::Ident(name)) => name,
            _ => return Err(FilterError::parse(at, "expected field name")),
        };
        let at = self.offset();
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            _ => return Err(FilterError::parse(at, "expected comparison operator")),
        };
        let at = self.offset();
        let operand = match self.next() {
            Some(Token::Param(i)) => Operand::Param(i),
            Some(Token::Int(v)) => Operand::Literal(FieldValue::Int(v)),
            Some(Token::Float(v)) => Operand::Literal(FieldValue::Float(v)),
            Some(Token::Str(s)) => Operand::Literal(FieldValue::Text(s)),
            Some(Token::True) => Operand::Literal(FieldValue::Bool(true)),
            Some(Token::False) => Operand::Literal(FieldValue::Bool(false)),
            _ => return Err(FilterError::parse(at, "expected literal or parameter")),
        };
        Ok(Predicate::Compare { field, op, operand })
    }
}

/// Parse a filter expression into a predicate tree.
pub fn parse_predicate(input: &str) -> Result<Predicate, FilterError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(FilterError::parse(0, "empty expression"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    let predicate = parser.expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(FilterError::parse(parser.offset(), "trailing input"));
    }
    Ok(predicate)
}
