//! Entity adapters: `find_many` / `find_first` / `count` / `find_page`
//!
//! Each call parses its descriptor once, executes exactly one statement for
//! the primary rows and then hands the rows to the relation resolver.
//! Store errors are returned as-is; retrying is the store client's job.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::core::{DataError, DataResult, EntityKind, Row, Scalar, Statement, StorePort};
use crate::naming::{CaseTranslator, NamingRules};
use crate::query::{
    scalar_from_json, Cursor, Predicate, QueryDescriptor, SelectQuery, StatementBuilder,
};
use crate::relations::{self, validate_includes, ResolutionMode};
use crate::schema::{EntitySchema, Schema};

/// Shared entry point to every entity adapter.
///
/// Cheap to clone; holds only the pooled store handle and immutable
/// configuration.
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn StorePort>,
    schema: Arc<Schema>,
    translator: Arc<CaseTranslator>,
    mode: ResolutionMode,
}

impl Repository {
    pub fn new(store: Arc<dyn StorePort>, schema: Schema, naming: &NamingRules) -> Self {
        Self {
            store,
            schema: Arc::new(schema),
            translator: Arc::new(CaseTranslator::new(naming)),
            mode: ResolutionMode::default(),
        }
    }

    pub fn with_resolution_mode(mut self, mode: ResolutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn resolution_mode(&self) -> ResolutionMode {
        self.mode
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn translator(&self) -> &CaseTranslator {
        &self.translator
    }

    pub fn store(&self) -> &Arc<dyn StorePort> {
        &self.store
    }

    pub fn entity(&self, kind: EntityKind) -> EntityAdapter<'_> {
        EntityAdapter {
            repo: self,
            schema: self.schema.get(kind),
        }
    }

    pub fn tokens(&self) -> EntityAdapter<'_> {
        self.entity(EntityKind::Token)
    }

    pub fn pairs(&self) -> EntityAdapter<'_> {
        self.entity(EntityKind::Pair)
    }

    pub fn transactions(&self) -> EntityAdapter<'_> {
        self.entity(EntityKind::Transaction)
    }

    pub fn positions(&self) -> EntityAdapter<'_> {
        self.entity(EntityKind::Position)
    }
}

/// One page of a keyset-paginated listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub rows: Vec<Row>,
    pub has_next_page: bool,
    /// Primary key of the last row; pass back as `cursor` for the next page
    pub end_cursor: Option<Scalar>,
}

/// Adapter for one entity kind
#[derive(Clone, Copy)]
pub struct EntityAdapter<'r> {
    repo: &'r Repository,
    schema: &'r EntitySchema,
}

impl<'r> EntityAdapter<'r> {
    pub fn kind(&self) -> EntityKind {
        self.schema.kind
    }

    pub fn schema(&self) -> &'r EntitySchema {
        self.schema
    }

    fn builder(&self) -> StatementBuilder<'r> {
        StatementBuilder::new(&self.repo.translator, &self.schema.matching)
    }

    /// Validate a descriptor and lower it into a renderable query
    pub fn compile(&self, descriptor: &QueryDescriptor) -> DataResult<SelectQuery> {
        let predicate = Predicate::parse_optional(descriptor.filter.as_ref())?;
        let relations = validate_includes(self.schema, &descriptor.include)?;

        // Related rows are found through foreign keys, so those must be fetched
        let projection = descriptor.select.clone().map(|mut fields| {
            for relation in &relations {
                push_missing(&mut fields, &relation.foreign_key);
            }
            fields
        });

        Ok(SelectQuery {
            predicate: Some(predicate),
            projection,
            order_by: descriptor.order_by.clone(),
            cursor: self.cursor(descriptor.cursor.as_ref())?,
            limit: descriptor.take,
            offset: descriptor.skip,
        })
    }

    /// The statement `find_many` would execute
    pub fn explain(&self, descriptor: &QueryDescriptor) -> DataResult<Statement> {
        let query = self.compile(descriptor)?;
        Ok(self.builder().select(&self.schema.table, &query))
    }

    /// The statement `count` would execute
    pub fn explain_count(&self, descriptor: &QueryDescriptor) -> DataResult<Statement> {
        let predicate = Predicate::parse_optional(descriptor.filter.as_ref())?;
        Ok(self.builder().count(&self.schema.table, &predicate))
    }

    pub async fn find_many(&self, descriptor: &QueryDescriptor) -> DataResult<Vec<Row>> {
        let query = self.compile(descriptor)?;
        let rows = self.fetch(&query).await?;
        let rows = relations::resolve(self.repo, self.schema, rows, &descriptor.include).await?;
        Ok(strip_unrequested(descriptor, rows))
    }

    /// First matching row; pagination in the descriptor is ignored
    pub async fn find_first(&self, descriptor: &QueryDescriptor) -> DataResult<Option<Row>> {
        let descriptor = QueryDescriptor {
            take: Some(1),
            skip: None,
            cursor: None,
            ..descriptor.clone()
        };
        Ok(self.find_many(&descriptor).await?.into_iter().next())
    }

    /// Number of rows matching `where`; everything else is ignored
    pub async fn count(&self, descriptor: &QueryDescriptor) -> DataResult<i64> {
        let statement = self.explain_count(descriptor)?;
        debug!("{} count: {}", self.schema.kind, statement);

        let rows = self.repo.store.execute(&statement).await?;
        rows.first()
            .and_then(|row| row.scalar("count"))
            .and_then(Scalar::as_i64)
            .ok_or_else(|| DataError::Decode {
                column: "count".to_string(),
                reason: "count query returned no integer".to_string(),
            })
    }

    /// `find_many` that also reports whether another page exists.
    ///
    /// Fetches one row past `take` to find out.
    pub async fn find_page(&self, descriptor: &QueryDescriptor) -> DataResult<Page> {
        let mut query = self.compile(descriptor)?;
        if let Some(fields) = query.projection.as_mut() {
            push_missing(fields, &self.schema.primary_key);
        }
        query.limit = descriptor.take.map(|take| take.saturating_add(1));

        let mut rows = self.fetch(&query).await?;
        let has_next_page = match descriptor.take {
            Some(take) if rows.len() > take as usize => {
                rows.truncate(take as usize);
                true
            }
            _ => false,
        };
        let end_cursor = rows
            .last()
            .and_then(|row| row.scalar(&self.schema.primary_key))
            .cloned();

        let rows = relations::resolve(self.repo, self.schema, rows, &descriptor.include).await?;
        Ok(Page {
            rows: strip_unrequested(descriptor, rows),
            has_next_page,
            end_cursor,
        })
    }

    /// Execute one select and translate column names back to fields.
    ///
    /// Relations are not resolved here.
    pub(crate) async fn fetch(&self, query: &SelectQuery) -> DataResult<Vec<Row>> {
        let statement = self.builder().select(&self.schema.table, query);
        debug!("{} select: {}", self.schema.kind, statement);

        let rows = self.repo.store.execute(&statement).await?;
        let translator = &self.repo.translator;
        Ok(rows
            .into_iter()
            .map(|row| row.rename_keys(|column| translator.to_field(column)))
            .collect())
    }

    /// A cursor is the last-seen primary key, bare or as `{ "<pk>": value }`
    fn cursor(&self, cursor: Option<&Value>) -> DataResult<Option<Cursor>> {
        let primary_key = &self.schema.primary_key;
        let after = match cursor {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Object(map)) => match (map.len(), map.get(primary_key)) {
                (1, Some(value)) => value,
                _ => {
                    return Err(DataError::descriptor(format!(
                        "cursor on {} must name only its primary key '{}'",
                        self.schema.kind, primary_key
                    )))
                }
            },
            Some(value) => value,
        };

        let after = scalar_from_json(primary_key, after)?;
        if after.is_null() {
            return Ok(None);
        }
        Ok(Some(Cursor {
            field: primary_key.clone(),
            after,
        }))
    }
}

/// Drop the keys and foreign keys fetched only for pagination and relations
fn strip_unrequested(descriptor: &QueryDescriptor, mut rows: Vec<Row>) -> Vec<Row> {
    let Some(select) = descriptor.select.as_ref().filter(|s| !s.is_empty()) else {
        return rows;
    };
    let requested = |field: &str| {
        select.iter().any(|s| s == field) || descriptor.include.iter().any(|i| i == field)
    };
    for row in &mut rows {
        row.retain(requested);
    }
    rows
}

fn push_missing(fields: &mut Vec<String>, field: &str) {
    if !fields.iter().any(|f| f == field) {
        fields.push(field.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct NoStore;

    #[async_trait]
    impl StorePort for NoStore {
        async fn execute(&self, _statement: &Statement) -> DataResult<Vec<Row>> {
            Ok(Vec::new())
        }

        async fn health_check(&self) -> DataResult<()> {
            Ok(())
        }
    }

    fn repo() -> Repository {
        Repository::new(Arc::new(NoStore), Schema::dex(), &NamingRules::default())
    }

    #[test]
    fn test_explain_adds_foreign_keys_for_includes() {
        let repo = repo();
        let descriptor = QueryDescriptor::new()
            .select(["id", "reserveUSD"])
            .include("token0");
        let statement = repo.pairs().explain(&descriptor).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT \"id\", \"reserve_usd\", \"token_0_id\" FROM \"pairs\""
        );
    }

    #[test]
    fn test_cursor_forms() {
        let repo = repo();
        let bare = QueryDescriptor::new().cursor("t5");
        let keyed = QueryDescriptor::new().cursor(json!({ "id": "t5" }));
        assert_eq!(
            repo.tokens().explain(&bare).unwrap(),
            repo.tokens().explain(&keyed).unwrap()
        );
        assert_eq!(
            repo.tokens().explain(&bare).unwrap().sql,
            "SELECT * FROM \"tokens\" WHERE \"id\" > $1"
        );

        let wrong = QueryDescriptor::new().cursor(json!({ "symbol": "USDC" }));
        assert!(matches!(
            repo.tokens().explain(&wrong),
            Err(DataError::Descriptor(_))
        ));
    }

    #[test]
    fn test_unknown_include_is_rejected_before_execution() {
        let repo = repo();
        let descriptor = QueryDescriptor::new().include("token0");
        assert!(matches!(
            repo.tokens().explain(&descriptor),
            Err(DataError::UnknownRelation { .. })
        ));
    }

    #[test]
    fn test_count_ignores_everything_but_where() {
        let repo = repo();
        let descriptor = QueryDescriptor::new()
            .filter("symbol", "USDC")
            .select(["id"])
            .take(3)
            .skip(1);
        let statement = repo.tokens().explain_count(&descriptor).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT COUNT(*) AS \"count\" FROM \"tokens\" WHERE \"symbol\" = $1"
        );
    }
}
