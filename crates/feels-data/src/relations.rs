//! One-level foreign-key relation resolution
//!
//! For every requested slot the related row is looked up by the foreign key
//! already present on the parent row and attached under the slot name, or
//! `null` when the key is absent or matches nothing. Nested includes are not
//! followed.

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use tracing::debug;

use crate::adapter::{EntityAdapter, Repository};
use crate::core::{DataError, DataResult, FieldValue, Row, Scalar};
use crate::loader::{BatchFn, BatchedLoader};
use crate::query::{Predicate, SelectQuery};
use crate::schema::{EntitySchema, RelationDef};

/// How related rows are fetched. Every mode attaches identical rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    /// One lookup per row per slot, awaited in turn
    Sequential,
    /// The same lookups, awaited together
    Concurrent,
    /// One `IN` lookup per slot over the distinct keys of all rows
    #[default]
    Batched,
}

/// Look up the relation definitions for an include list
pub fn validate_includes<'s>(
    schema: &'s EntitySchema,
    include: &[String],
) -> DataResult<Vec<&'s RelationDef>> {
    include
        .iter()
        .map(|name| {
            schema
                .relation(name)
                .ok_or_else(|| DataError::UnknownRelation {
                    entity: schema.kind.to_string(),
                    relation: name.clone(),
                })
        })
        .collect()
}

/// Attach the requested relations to `rows`
pub async fn resolve(
    repo: &Repository,
    schema: &EntitySchema,
    mut rows: Vec<Row>,
    include: &[String],
) -> DataResult<Vec<Row>> {
    let relations = validate_includes(schema, include)?;
    if relations.is_empty() || rows.is_empty() {
        return Ok(rows);
    }

    for relation in relations {
        let target = repo.entity(relation.target);
        let folded = target
            .schema()
            .matching
            .is_case_insensitive(&repo.translator().to_column(&relation.target_key));
        let keys: Vec<Option<RelationKey>> = rows
            .iter()
            .map(|row| {
                row.scalar(&relation.foreign_key)
                    .and_then(|s| RelationKey::new(s, folded))
            })
            .collect();

        debug!(
            "Resolving {}.{} for {} rows ({:?})",
            schema.kind,
            relation.name,
            rows.len(),
            repo.resolution_mode()
        );
        let related = match repo.resolution_mode() {
            ResolutionMode::Sequential => {
                let mut related = Vec::with_capacity(keys.len());
                for key in &keys {
                    related.push(lookup_one(&target, relation, key.as_ref()).await?);
                }
                related
            }
            ResolutionMode::Concurrent => {
                try_join_all(
                    keys.iter()
                        .map(|key| lookup_one(&target, relation, key.as_ref())),
                )
                .await?
            }
            ResolutionMode::Batched => {
                let loader = BatchedLoader::new(RowLookup {
                    target: &target,
                    relation,
                    folded,
                });
                let present: Vec<RelationKey> = keys.iter().flatten().cloned().collect();
                let mut found = loader.load_many(&present).await?.into_iter();
                keys.iter()
                    .map(|key| key.as_ref().and_then(|_| found.next().flatten()))
                    .collect()
            }
        };

        for (row, related) in rows.iter_mut().zip(related) {
            let value = match related {
                Some(related) => FieldValue::from(related),
                None => FieldValue::Scalar(Scalar::Null),
            };
            row.insert(relation.name.clone(), value);
        }
    }

    Ok(rows)
}

async fn lookup_one(
    target: &EntityAdapter<'_>,
    relation: &RelationDef,
    key: Option<&RelationKey>,
) -> DataResult<Option<Row>> {
    let Some(key) = key else {
        return Ok(None);
    };
    let query = SelectQuery {
        predicate: Some(Predicate::eq(relation.target_key.clone(), key.scalar.clone())),
        limit: Some(1),
        ..SelectQuery::default()
    };
    Ok(target.fetch(&query).await?.into_iter().next())
}

/// Foreign-key value compared by its normalized text
#[derive(Debug, Clone)]
struct RelationKey {
    text: String,
    scalar: Scalar,
}

impl RelationKey {
    fn new(scalar: &Scalar, folded: bool) -> Option<Self> {
        let text = scalar.key_string()?;
        Some(Self {
            text: if folded { text.to_lowercase() } else { text },
            scalar: scalar.clone(),
        })
    }
}

impl PartialEq for RelationKey {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for RelationKey {}

impl Hash for RelationKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

/// Batch function fetching every related row of one slot with one `IN`
struct RowLookup<'a, 'r> {
    target: &'a EntityAdapter<'r>,
    relation: &'a RelationDef,
    folded: bool,
}

#[async_trait]
impl BatchFn<RelationKey, Option<Row>> for RowLookup<'_, '_> {
    async fn load(&self, keys: &[RelationKey]) -> DataResult<Vec<Option<Row>>> {
        let query = SelectQuery {
            predicate: Some(Predicate::In {
                field: self.relation.target_key.clone(),
                values: keys.iter().map(|k| k.scalar.clone()).collect(),
            }),
            ..SelectQuery::default()
        };

        let mut by_key: HashMap<String, Row> = HashMap::new();
        for row in self.target.fetch(&query).await? {
            let key = row
                .scalar(&self.relation.target_key)
                .and_then(|s| RelationKey::new(s, self.folded));
            if let Some(key) = key {
                by_key.entry(key.text).or_insert(row);
            }
        }

        Ok(keys.iter().map(|k| by_key.get(&k.text).cloned()).collect())
    }
}
