//! Query descriptors as accepted from resolvers
//!
//! The shape mirrors an ORM request: `where`, `select`, `orderBy`, `take`,
//! `skip`, `cursor` and `include`. Descriptors are deserialized from JSON or
//! assembled with the builder methods below; they are interpreted only by
//! [`Predicate::parse`](super::Predicate::parse) at the adapter boundary.

use serde::{de, Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::{DataError, DataResult};

/// Sort direction of one `orderBy` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// One `{field: direction}` ordering pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Declarative description of one read operation
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueryDescriptor {
    #[serde(rename = "where", default)]
    pub filter: Option<Map<String, Value>>,
    #[serde(default)]
    pub select: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_order_by")]
    pub order_by: Vec<OrderBy>,
    #[serde(default)]
    pub take: Option<u32>,
    #[serde(default)]
    pub skip: Option<u32>,
    #[serde(default)]
    pub cursor: Option<Value>,
    #[serde(default)]
    pub include: Vec<String>,
}

impl QueryDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a descriptor from its JSON form
    pub fn from_json(json: &str) -> DataResult<Self> {
        serde_json::from_str(json).map_err(|e| DataError::descriptor(e.to_string()))
    }

    /// Add a `where` entry (literal equality or operator object)
    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter
            .get_or_insert_with(Map::new)
            .insert(field.into(), value.into());
        self
    }

    /// Add an `OR` group; each branch is a where-mapping of its own
    pub fn any_of(self, branches: Vec<Map<String, Value>>) -> Self {
        let branches = branches.into_iter().map(Value::Object).collect::<Vec<_>>();
        self.filter("OR", Value::Array(branches))
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn take(mut self, take: u32) -> Self {
        self.take = Some(take);
        self
    }

    pub fn skip(mut self, skip: u32) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn cursor(mut self, cursor: impl Into<Value>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn include(mut self, relation: impl Into<String>) -> Self {
        self.include.push(relation.into());
        self
    }
}

/// Build a where-mapping inline: `where_map([("symbol", "USDT".into())])`
pub fn where_map<I, K>(entries: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OrderByInput {
    One(BTreeMap<String, SortDirection>),
    Many(Vec<BTreeMap<String, SortDirection>>),
}

fn deserialize_order_by<'de, D>(deserializer: D) -> Result<Vec<OrderBy>, D::Error>
where
    D: Deserializer<'de>,
{
    let maps = match Option::<OrderByInput>::deserialize(deserializer)? {
        None => return Ok(Vec::new()),
        Some(OrderByInput::One(map)) => vec![map],
        Some(OrderByInput::Many(maps)) => maps,
    };

    maps.into_iter()
        .map(|map| {
            if map.len() != 1 {
                return Err(de::Error::custom(
                    "each orderBy entry must name exactly one field",
                ));
            }
            let (field, direction) = map.into_iter().next().ok_or_else(|| {
                de::Error::custom("each orderBy entry must name exactly one field")
            })?;
            Ok(OrderBy { field, direction })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_descriptor() {
        let descriptor = QueryDescriptor::from_json(
            r#"{
                "where": { "symbol": "USDC" },
                "select": ["id", "symbol"],
                "orderBy": [{ "volumeUSD": "desc" }, { "symbol": "asc" }],
                "take": 10,
                "skip": 5,
                "cursor": { "id": "0xabc" },
                "include": ["token0"]
            }"#,
        )
        .unwrap();

        assert_eq!(descriptor.filter.unwrap()["symbol"], json!("USDC"));
        assert_eq!(
            descriptor.order_by,
            vec![OrderBy::desc("volumeUSD"), OrderBy::asc("symbol")]
        );
        assert_eq!(descriptor.take, Some(10));
        assert_eq!(descriptor.skip, Some(5));
        assert_eq!(descriptor.include, vec!["token0".to_string()]);
    }

    #[test]
    fn test_single_order_by_object() {
        let descriptor = QueryDescriptor::from_json(r#"{ "orderBy": { "timestamp": "DESC" } }"#).unwrap();
        assert_eq!(descriptor.order_by, vec![OrderBy::desc("timestamp")]);
    }

    #[test]
    fn test_order_by_entry_with_two_fields_is_rejected() {
        let err = QueryDescriptor::from_json(r#"{ "orderBy": { "a": "asc", "b": "desc" } }"#);
        assert!(matches!(err, Err(DataError::Descriptor(_))));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = QueryDescriptor::from_json(r#"{ "distinct": ["symbol"] }"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_builder_any_of() {
        let descriptor = QueryDescriptor::new().any_of(vec![
            where_map([("symbol", json!("USDT"))]),
            where_map([("symbol", json!("USDC"))]),
        ]);
        let filter = descriptor.filter.unwrap();
        assert_eq!(filter["OR"].as_array().map(Vec::len), Some(2));
    }
}
