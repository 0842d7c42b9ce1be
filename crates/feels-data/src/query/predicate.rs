//! Predicate AST and the descriptor parser that produces it
//!
//! All interpretation of `where` shapes happens here. Builders and adapters
//! only ever see the tagged [`Predicate`] tree.

use serde_json::{Map, Value};
use std::fmt;

use crate::core::{DataError, DataResult, Scalar};

/// Ordered comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
        }
    }
}

/// Filter tree over API field names
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `field = value`, case-insensitive on configured address columns
    Eq { field: String, value: Scalar },
    /// `lower(field) = lower(value)`
    EqInsensitive { field: String, value: Scalar },
    IsNull { field: String },
    /// Substring match; the pattern is wrapped in wildcards when rendered
    Contains {
        field: String,
        pattern: String,
        case_insensitive: bool,
    },
    In { field: String, values: Vec<Scalar> },
    Compare {
        field: String,
        op: CompareOp,
        value: Scalar,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    /// The predicate matching every row
    pub fn all() -> Self {
        Predicate::And(Vec::new())
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Predicate::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Predicate::And(children) if children.iter().all(Predicate::is_all))
    }

    /// Conjoin two predicates, flattening nested conjunctions
    pub fn and(self, other: Predicate) -> Predicate {
        let mut children = match self {
            Predicate::And(children) => children,
            single => vec![single],
        };
        match other {
            Predicate::And(more) => children.extend(more),
            single => children.push(single),
        }
        Predicate::And(children)
    }

    /// Parse a `where` mapping into a predicate tree.
    ///
    /// An empty mapping yields [`Predicate::all`].
    pub fn parse(filter: &Map<String, Value>) -> DataResult<Predicate> {
        let mut children = Vec::with_capacity(filter.len());
        for (key, value) in filter {
            match key.as_str() {
                "OR" => children.push(Predicate::Or(parse_branches(key, value)?)),
                "AND" => children.push(Predicate::And(parse_branches(key, value)?)),
                _ => children.push(parse_field(key, value)?),
            }
        }
        Ok(Predicate::And(children))
    }

    /// Parse an optional `where` mapping; `None` matches everything
    pub fn parse_optional(filter: Option<&Map<String, Value>>) -> DataResult<Predicate> {
        match filter {
            Some(filter) => Predicate::parse(filter),
            None => Ok(Predicate::all()),
        }
    }
}

fn parse_branches(key: &str, value: &Value) -> DataResult<Vec<Predicate>> {
    let branches = value
        .as_array()
        .ok_or_else(|| DataError::descriptor(format!("{} expects a list of where-mappings", key)))?;

    branches
        .iter()
        .map(|branch| match branch {
            Value::Object(map) => Predicate::parse(map),
            other => Err(DataError::descriptor(format!(
                "{} branch must be an object, got {}",
                key, other
            ))),
        })
        .collect()
}

fn parse_field(field: &str, value: &Value) -> DataResult<Predicate> {
    match value {
        Value::Null => Ok(Predicate::IsNull {
            field: field.to_string(),
        }),
        Value::Object(ops) => parse_operators(field, ops),
        Value::Array(_) => Err(DataError::descriptor(format!(
            "list value for '{}' is ambiguous; use {{\"in\": [..]}}",
            field
        ))),
        literal => Ok(Predicate::Eq {
            field: field.to_string(),
            value: scalar_from_json(field, literal)?,
        }),
    }
}

fn parse_operators(field: &str, ops: &Map<String, Value>) -> DataResult<Predicate> {
    let case_insensitive = match (ops.get("caseInsensitive"), ops.get("mode")) {
        (Some(Value::Bool(flag)), _) => *flag,
        (Some(other), _) => {
            return Err(DataError::descriptor(format!(
                "caseInsensitive on '{}' must be a boolean, got {}",
                field, other
            )))
        }
        (None, Some(Value::String(mode))) => mode.eq_ignore_ascii_case("insensitive"),
        (None, Some(other)) => {
            return Err(DataError::descriptor(format!(
                "mode on '{}' must be a string, got {}",
                field, other
            )))
        }
        (None, None) => false,
    };

    let mut leaves = Vec::new();
    for (op, operand) in ops {
        let leaf = match op.as_str() {
            "caseInsensitive" | "mode" => continue,
            "contains" => Predicate::Contains {
                field: field.to_string(),
                pattern: operand
                    .as_str()
                    .ok_or_else(|| {
                        DataError::descriptor(format!("contains on '{}' expects a string", field))
                    })?
                    .to_string(),
                case_insensitive,
            },
            "equals" if operand.is_null() => Predicate::IsNull {
                field: field.to_string(),
            },
            "equals" if case_insensitive => Predicate::EqInsensitive {
                field: field.to_string(),
                value: scalar_from_json(field, operand)?,
            },
            "equals" => Predicate::Eq {
                field: field.to_string(),
                value: scalar_from_json(field, operand)?,
            },
            "in" => Predicate::In {
                field: field.to_string(),
                values: operand
                    .as_array()
                    .ok_or_else(|| {
                        DataError::descriptor(format!("in on '{}' expects a list", field))
                    })?
                    .iter()
                    .map(|v| scalar_from_json(field, v))
                    .collect::<DataResult<_>>()?,
            },
            "gt" | "gte" | "lt" | "lte" => Predicate::Compare {
                field: field.to_string(),
                op: match op.as_str() {
                    "gt" => CompareOp::Gt,
                    "gte" => CompareOp::Gte,
                    "lt" => CompareOp::Lt,
                    _ => CompareOp::Lte,
                },
                value: scalar_from_json(field, operand)?,
            },
            unknown => {
                return Err(DataError::descriptor(format!(
                    "unsupported operator '{}' on '{}'",
                    unknown, field
                )))
            }
        };
        leaves.push(leaf);
    }

    match leaves.len() {
        0 => Err(DataError::descriptor(format!(
            "operator object on '{}' has no condition",
            field
        ))),
        1 => Ok(leaves.remove(0)),
        _ => Ok(Predicate::And(leaves)),
    }
}

/// Convert a JSON literal into a bindable scalar
pub fn scalar_from_json(field: &str, value: &Value) -> DataResult<Scalar> {
    match value {
        Value::Null => Ok(Scalar::Null),
        Value::Bool(b) => Ok(Scalar::Bool(*b)),
        Value::String(s) => Ok(Scalar::Text(s.clone())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Scalar::Int(i))
            } else if let Some(u) = n.as_u64() {
                Ok(Scalar::Decimal(u.into()))
            } else {
                n.as_f64().map(Scalar::Float).ok_or_else(|| {
                    DataError::descriptor(format!("unrepresentable number for '{}'", field))
                })
            }
        }
        other => Err(DataError::descriptor(format!(
            "'{}' expects a scalar, got {}",
            field, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> DataResult<Predicate> {
        match value {
            Value::Object(map) => Predicate::parse(&map),
            _ => unreachable!("test input must be an object"),
        }
    }

    #[test]
    fn test_empty_where_matches_all() {
        let predicate = parse(json!({})).unwrap();
        assert!(predicate.is_all());
        assert!(Predicate::parse_optional(None).unwrap().is_all());
    }

    #[test]
    fn test_or_of_literals() {
        let predicate = parse(json!({ "OR": [{ "symbol": "USDT" }, { "symbol": "USDC" }] })).unwrap();
        assert_eq!(
            predicate,
            Predicate::And(vec![Predicate::Or(vec![
                Predicate::And(vec![Predicate::eq("symbol", "USDT")]),
                Predicate::And(vec![Predicate::eq("symbol", "USDC")]),
            ])])
        );
    }

    #[test]
    fn test_contains_with_mode_alias() {
        let predicate = parse(json!({ "name": { "contains": "wrapped", "mode": "insensitive" } })).unwrap();
        assert_eq!(
            predicate,
            Predicate::And(vec![Predicate::Contains {
                field: "name".into(),
                pattern: "wrapped".into(),
                case_insensitive: true,
            }])
        );
    }

    #[test]
    fn test_null_literal_becomes_is_null() {
        let predicate = parse(json!({ "closedAt": null })).unwrap();
        assert_eq!(
            predicate,
            Predicate::And(vec![Predicate::IsNull {
                field: "closedAt".into()
            }])
        );
    }

    #[test]
    fn test_multiple_operators_are_conjoined() {
        let predicate = parse(json!({ "timestamp": { "gte": 10, "lt": 20 } })).unwrap();
        match predicate {
            Predicate::And(children) => assert!(matches!(&children[0], Predicate::And(ops) if ops.len() == 2)),
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_invalid_shapes_are_descriptor_errors() {
        for bad in [
            json!({ "OR": { "symbol": "USDT" } }),
            json!({ "OR": ["USDT"] }),
            json!({ "symbol": ["USDT", "USDC"] }),
            json!({ "symbol": { "startsWith": "US" } }),
            json!({ "symbol": { "caseInsensitive": true } }),
            json!({ "token0": { "symbol": { "nested": true } } }),
        ] {
            assert!(matches!(parse(bad), Err(DataError::Descriptor(_))));
        }
    }

    #[test]
    fn test_and_flattens() {
        let combined = Predicate::all()
            .and(Predicate::eq("a", 1))
            .and(Predicate::And(vec![Predicate::eq("b", 2)]));
        assert_eq!(
            combined,
            Predicate::And(vec![Predicate::eq("a", 1), Predicate::eq("b", 2)])
        );
    }
}
