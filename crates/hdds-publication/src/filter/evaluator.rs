// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Predicate evaluation against a sample's field snapshot.

use super::parser::{CompareOp, Operand, Predicate};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Field value extracted from a sample for content filtering.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl FieldValue {
    fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => Some(a.cmp(b)),
            (FieldValue::Int(a), FieldValue::Float(b)) => (*a as f64).partial_cmp(b),
            (FieldValue::Float(a), FieldValue::Int(b)) => a.partial_cmp(&(*b as f64)),
            (FieldValue::Float(a), FieldValue::Float(b)) => a.partial_cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => Some(a.cmp(b)),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Interpret a filter parameter string with the type of `like`.
    fn from_param(raw: &str, like: &FieldValue) -> Option<FieldValue> {
        let raw = raw.trim();
        match like {
            FieldValue::Int(_) => raw
                .parse::<i64>()
                .map(FieldValue::Int)
                .or_else(|_| raw.parse::<f64>().map(FieldValue::Float))
                .ok(),
            FieldValue::Float(_) => raw.parse::<f64>().map(FieldValue::Float).ok(),
            FieldValue::Text(_) => {
                let unquoted = raw
                    .strip_prefix('\'')
                    .and_then(|s| s.strip_suffix('\''))
                    .unwrap_or(raw);
                Some(FieldValue::Text(unquoted.to_string()))
            }
            FieldValue::Bool(_) => match raw.to_ascii_uppercase().as_str() {
                "TRUE" => Some(FieldValue::Bool(true)),
                "FALSE" => Some(FieldValue::Bool(false)),
                _ => None,
            },
        }
    }
}

/// Snapshot of a sample's filterable fields, by name.
pub type FieldMap = HashMap<String, FieldValue>;

/// Errors from filter compilation or evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterError {
    /// Expression could not be parsed.
    Parse { position: usize, message: String },
    /// Sample snapshot lacks a referenced field.
    UnknownField(String),
    /// Expression references `%n` but fewer parameters were supplied.
    MissingParameter(usize),
    /// Operand type cannot be compared with the field type.
    TypeMismatch(String),
}

impl FilterError {
    pub(crate) fn parse(position: usize, message: &str) -> Self {
        FilterError::Parse {
            position,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::Parse { position, message } => {
                write!(f, "filter parse error at {}: {}", position, message)
            }
            FilterError::UnknownField(name) => write!(f, "unknown filter field '{}'", name),
            FilterError::MissingParameter(i) => write!(f, "missing filter parameter %{}", i),
            FilterError::TypeMismatch(name) => write!(f, "type mismatch on field '{}'", name),
        }
    }
}

impl std::error::Error for FilterError {}

/// Evaluate `predicate` against `fields`, substituting `params` for `%n`.
pub fn evaluate(
    predicate: &Predicate,
    fields: &FieldMap,
    params: &[String],
) -> Result<bool, FilterError> {
    match predicate {
        Predicate::And(a, b) => Ok(evaluate(a, fields, params)? && evaluate(b, fields, params)?),
        Predicate::Or(a, b) => Ok(evaluate(a, fields, params)? || evaluate(b, fields, params)?),
        Predicate::Not(inner) => Ok(!evaluate(inner, fields, params)?),
        Predicate::Compare { field, op, operand } => {
            let value = fields
                .get(field)
                .ok_or_else(|| FilterError::UnknownField(field.clone()))?;
            let rhs = match operand {
                Operand::Literal(v) => v.clone(),
                Operand::Param(i) => {
                    let raw = params.get(*i).ok_or(FilterError::MissingParameter(*i))?;
                    FieldValue::from_param(raw, value)
                        .ok_or_else(|| FilterError::TypeMismatch(field.clone()))?
                }
            };
            let ordering = value
                .compare(&rhs)
                .ok_or_else(|| FilterError::TypeMismatch(field.clone()))?;
            Ok(match op {
                CompareOp::Eq => ordering == Ordering::Equal,
                CompareOp::Ne => ordering != Ordering::Equal,
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::Ge => ordering != Ordering::Less,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse_predicate;
    use super::*;

    fn sample() -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("id".into(), FieldValue::Int(7));
        fields.insert("temperature".into(), FieldValue::Float(21.5));
        fields.insert("room".into(), FieldValue::Text("lab".into()));
        fields.insert("active".into(), FieldValue::Bool(true));
        fields
    }

    #[test]
    fn test_literal_comparisons() {
        let fields = sample();
        let p = parse_predicate("id = 7 AND temperature < 22 AND room = 'lab'").unwrap();
        assert_eq!(evaluate(&p, &fields, &[]), Ok(true));
        let p = parse_predicate("active = FALSE OR id > 10").unwrap();
        assert_eq!(evaluate(&p, &fields, &[]), Ok(false));
    }

    #[test]
    fn test_parameters_take_field_type() {
        let fields = sample();
        let p = parse_predicate("id >= %0 AND room <> %1").unwrap();
        let params = vec!["7".to_string(), "'office'".to_string()];
        assert_eq!(evaluate(&p, &fields, &params), Ok(true));
    }

    #[test]
    fn test_evaluation_errors() {
        let fields = sample();
        let p = parse_predicate("missing = 1").unwrap();
        assert_eq!(
            evaluate(&p, &fields, &[]),
            Err(FilterError::UnknownField("missing".into()))
        );
        let p = parse_predicate("id = %3").unwrap();
        assert_eq!(
            evaluate(&p, &fields, &[]),
            Err(FilterError::MissingParameter(3))
        );
        let p = parse_predicate("room = 4").unwrap();
        assert!(matches!(
            evaluate(&p, &fields, &[]),
            Err(FilterError::TypeMismatch(_))
        ));
    }
}
