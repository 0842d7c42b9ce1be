//! Shared fixtures: scripted store and cache doubles

#![allow(dead_code)]

use async_trait::async_trait;
use feels_data::core::{CachePort, DataError, DataResult, Row, Scalar, Statement, StorageError, StorePort};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = Box<dyn Fn(&Statement) -> DataResult<Vec<Row>> + Send + Sync>;

/// Store double that answers through a closure and records every statement
pub struct RecordingStore {
    respond: Responder,
    statements: Mutex<Vec<Statement>>,
}

impl RecordingStore {
    pub fn new<F>(respond: F) -> Arc<Self>
    where
        F: Fn(&Statement) -> DataResult<Vec<Row>> + Send + Sync + 'static,
    {
        Arc::new(Self {
            respond: Box::new(respond),
            statements: Mutex::new(Vec::new()),
        })
    }

    /// Store holding no rows at all
    pub fn empty() -> Arc<Self> {
        Self::new(|_| Ok(Vec::new()))
    }

    /// Store whose every statement fails
    pub fn failing() -> Arc<Self> {
        Self::new(|_| {
            Err(DataError::Storage(StorageError::Database(
                "relation does not exist".to_string(),
            )))
        })
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().unwrap().clone()
    }

    pub fn executed(&self) -> usize {
        self.statements.lock().unwrap().len()
    }
}

#[async_trait]
impl StorePort for RecordingStore {
    async fn execute(&self, statement: &Statement) -> DataResult<Vec<Row>> {
        self.statements.lock().unwrap().push(statement.clone());
        (self.respond)(statement)
    }

    async fn health_check(&self) -> DataResult<()> {
        Ok(())
    }
}

/// Table named in a rendered `SELECT ... FROM "table"`
pub fn table_of(statement: &Statement) -> &str {
    statement
        .sql
        .split(" FROM \"")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap_or("")
}

/// Rows of `table` whose `column` text is among the statement's parameters
pub fn rows_matching(rows: &[Row], column: &str, statement: &Statement) -> Vec<Row> {
    rows.iter()
        .filter(|row| {
            row.scalar(column)
                .map(|value| statement.params.contains(value))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}

pub fn token(id: &str, symbol: &str) -> Row {
    Row::new()
        .with("id", id)
        .with("symbol", symbol)
        .with("address", format!("0x{}", id.to_uppercase()))
}

pub fn pair(id: &str, token0: &str, token1: &str, reserve0: i64, reserve1: i64) -> Row {
    Row::new()
        .with("id", id)
        .with("token_0_id", token0)
        .with("token_1_id", token1)
        .with("reserve_0", Scalar::Int(reserve0))
        .with("reserve_1", Scalar::Int(reserve1))
        .with("reserve_usd", Scalar::Int(reserve0 + reserve1))
}

/// Cache double with a scripted content and a failure switch
#[derive(Default)]
pub struct ScriptedCache {
    entries: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<(String, String, Duration)>>,
    down: bool,
}

impl ScriptedCache {
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Self::default()
        })
    }

    /// Cache whose every call fails, as when Redis is unreachable
    pub fn down() -> Arc<Self> {
        Arc::new(Self {
            down: true,
            ..Self::default()
        })
    }

    pub fn writes(&self) -> Vec<(String, String, Duration)> {
        self.writes.lock().unwrap().clone()
    }

    fn check(&self) -> DataResult<()> {
        if self.down {
            return Err(DataError::Storage(StorageError::Cache(
                "connection refused".to_string(),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CachePort for ScriptedCache {
    async fn get(&self, key: &str) -> DataResult<Option<String>> {
        self.check()?;
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn bulk_get(&self, keys: &[String]) -> DataResult<HashMap<String, String>> {
        self.check()?;
        let entries = self.entries.lock().unwrap();
        Ok(keys
            .iter()
            .filter_map(|k| entries.get(k).map(|v| (k.clone(), v.clone())))
            .collect())
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> DataResult<()> {
        self.check()?;
        self.writes
            .lock()
            .unwrap()
            .push((key.to_string(), value.clone(), ttl));
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn health_check(&self) -> DataResult<()> {
        self.check()
    }
}
