//! Core domain types

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// A single bindable / decodable value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            Scalar::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Scalar::Decimal(d) => Some(*d),
            Scalar::Int(v) => Some(Decimal::from(*v)),
            Scalar::Float(v) => Decimal::try_from(*v).ok(),
            Scalar::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Stable textual form used to match keys across rows, `None` for null
    pub fn key_string(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(v) => Some(v.to_string()),
            Scalar::Int(v) => Some(v.to_string()),
            Scalar::Float(v) => Some(v.to_string()),
            Scalar::Decimal(v) => Some(v.normalize().to_string()),
            Scalar::Text(v) => Some(v.clone()),
            Scalar::Uuid(v) => Some(v.to_string()),
            Scalar::Timestamp(v) => Some(v.to_rfc3339()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Decimal(v) => write!(f, "{}", v),
            Scalar::Text(v) => write!(f, "'{}'", v),
            Scalar::Uuid(v) => write!(f, "'{}'", v),
            Scalar::Timestamp(v) => write!(f, "'{}'", v.to_rfc3339()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(v as i64)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<Decimal> for Scalar {
    fn from(v: Decimal) -> Self {
        Scalar::Decimal(v)
    }
}

impl From<Uuid> for Scalar {
    fn from(v: Uuid) -> Self {
        Scalar::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(v: DateTime<Utc>) -> Self {
        Scalar::Timestamp(v)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}

/// A field of an entity row: a scalar or a resolved relation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(Scalar),
    Row(Box<Row>),
}

impl FieldValue {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            FieldValue::Scalar(s) => Some(s),
            FieldValue::Row(_) => None,
        }
    }

    pub fn as_row(&self) -> Option<&Row> {
        match self {
            FieldValue::Row(r) => Some(r),
            FieldValue::Scalar(_) => None,
        }
    }
}

impl From<Scalar> for FieldValue {
    fn from(v: Scalar) -> Self {
        FieldValue::Scalar(v)
    }
}

impl From<Row> for FieldValue {
    fn from(v: Row) -> Self {
        FieldValue::Row(Box::new(v))
    }
}

macro_rules! scalar_field {
    ($($ty:ty),*) => {
        $(impl From<$ty> for FieldValue {
            fn from(v: $ty) -> Self {
                FieldValue::Scalar(v.into())
            }
        })*
    };
}

scalar_field!(
    &str,
    String,
    i64,
    i32,
    bool,
    f64,
    Decimal,
    Uuid,
    DateTime<Utc>,
    Option<String>,
    Option<Decimal>,
    Option<i64>
);

/// Immutable snapshot of one entity (or of one raw store row, keyed by column)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row {
    fields: BTreeMap<String, FieldValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn scalar(&self, name: &str) -> Option<&Scalar> {
        self.get(name).and_then(FieldValue::as_scalar)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.scalar(name).and_then(Scalar::as_str)
    }

    pub fn decimal(&self, name: &str) -> Option<Decimal> {
        self.scalar(name).and_then(Scalar::as_decimal)
    }

    pub fn relation(&self, name: &str) -> Option<&Row> {
        self.get(name).and_then(FieldValue::as_row)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Drop every field whose name fails `keep`
    pub fn retain(&mut self, keep: impl Fn(&str) -> bool) {
        self.fields.retain(|name, _| keep(name));
    }

    /// Rebuild the row with every key passed through `rename`
    pub fn rename_keys(self, rename: impl Fn(&str) -> String) -> Row {
        Row {
            fields: self
                .fields
                .into_iter()
                .map(|(k, v)| (rename(&k), v))
                .collect(),
        }
    }
}

impl FromIterator<(String, FieldValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Row {
            fields: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = (String, FieldValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// A fully-formed parameterized statement and its positional bind vector
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Scalar>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Scalar>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
            write!(f, " -- [{}]", params.join(", "))?;
        }
        Ok(())
    }
}

/// Entity kinds served by the adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Token,
    Pair,
    Transaction,
    Position,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Token => write!(f, "token"),
            EntityKind::Pair => write!(f, "pair"),
            EntityKind::Transaction => write!(f, "transaction"),
            EntityKind::Position => write!(f, "position"),
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = crate::core::DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "token" | "tokens" => Ok(EntityKind::Token),
            "pair" | "pairs" => Ok(EntityKind::Pair),
            "transaction" | "transactions" | "swap" | "swaps" => Ok(EntityKind::Transaction),
            "position" | "positions" => Ok(EntityKind::Position),
            other => Err(crate::core::DataError::descriptor(format!(
                "unknown entity kind: {}",
                other
            ))),
        }
    }
}
