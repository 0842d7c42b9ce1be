//! Descriptor-to-SQL translation through the entity adapters

mod common;

use anyhow::Result;
use common::{rows_matching, token, RecordingStore};
use feels_data::core::{DataError, Scalar, StorageError};
use feels_data::query::where_map;
use feels_data::{NamingRules, QueryDescriptor, Repository, Schema};
use serde_json::json;

fn repository(store: std::sync::Arc<RecordingStore>) -> Repository {
    Repository::new(store, Schema::dex(), &NamingRules::default())
}

#[tokio::test]
async fn test_or_of_symbols_returns_only_matching_tokens() -> Result<()> {
    let tokens = vec![token("t1", "USDT"), token("t2", "USDC"), token("t3", "DAI")];
    let store = RecordingStore::new(move |statement| Ok(rows_matching(&tokens, "symbol", statement)));
    let repo = repository(store.clone());

    let descriptor = QueryDescriptor::from_json(
        r#"{ "where": { "OR": [{ "symbol": "USDT" }, { "symbol": "USDC" }] } }"#,
    )?;
    let rows = repo.tokens().find_many(&descriptor).await?;

    let symbols: Vec<&str> = rows.iter().filter_map(|r| r.text("symbol")).collect();
    assert_eq!(symbols, vec!["USDT", "USDC"]);

    let statements = store.statements();
    assert_eq!(statements.len(), 1);
    assert_eq!(
        statements[0].sql,
        "SELECT * FROM \"tokens\" WHERE (\"symbol\" = $1 OR \"symbol\" = $2)"
    );
    assert_eq!(statements[0].params, vec![Scalar::from("USDT"), Scalar::from("USDC")]);
    Ok(())
}

#[tokio::test]
async fn test_parameter_count_matches_leaves_with_cursor_last() -> Result<()> {
    let store = RecordingStore::empty();
    let repo = repository(store.clone());

    let descriptor = QueryDescriptor::new()
        .any_of(vec![
            where_map([("token0Id", json!("a")), ("token1Id", json!("b"))]),
            where_map([("token0Id", json!("b"))]),
        ])
        .cursor("p7");
    repo.pairs().find_many(&descriptor).await?;

    let statement = &store.statements()[0];
    assert_eq!(
        statement.sql,
        "SELECT * FROM \"pairs\" WHERE ((\"token_0_id\" = $1 AND \"token_1_id\" = $2) \
         OR \"token_0_id\" = $3) AND \"id\" > $4"
    );
    assert_eq!(
        statement.params,
        vec![Scalar::from("a"), Scalar::from("b"), Scalar::from("b"), Scalar::from("p7")]
    );
    Ok(())
}

#[tokio::test]
async fn test_projection_order_and_pagination() -> Result<()> {
    let store = RecordingStore::empty();
    let repo = repository(store.clone());

    let descriptor = QueryDescriptor::from_json(
        r#"{
            "select": ["id", "volumeUSD24h"],
            "orderBy": [{ "volumeUSD24h": "desc" }, { "id": "asc" }],
            "take": 20,
            "skip": 40
        }"#,
    )?;
    let statement = repo.pairs().explain(&descriptor)?;

    assert_eq!(
        statement.sql,
        "SELECT \"id\", \"volume_usd_24h\" FROM \"pairs\" \
         ORDER BY \"volume_usd_24h\" DESC NULLS LAST, \"id\" ASC NULLS LAST LIMIT 20 OFFSET 40"
    );
    assert!(statement.params.is_empty());
    assert_eq!(store.executed(), 0);
    Ok(())
}

#[tokio::test]
async fn test_address_and_substring_filters() -> Result<()> {
    let repo = repository(RecordingStore::empty());

    let by_address = QueryDescriptor::new().filter("address", "0xAbC");
    assert_eq!(
        repo.tokens().explain(&by_address)?.sql,
        "SELECT * FROM \"tokens\" WHERE lower(\"address\") = lower($1)"
    );

    let by_name = QueryDescriptor::new().filter("name", json!({ "contains": "wrapped", "caseInsensitive": true }));
    let statement = repo.tokens().explain(&by_name)?;
    assert_eq!(statement.sql, "SELECT * FROM \"tokens\" WHERE \"name\" ILIKE $1");
    assert_eq!(statement.params, vec![Scalar::from("%wrapped%")]);

    let closed = QueryDescriptor::new().filter("closedAt", json!(null));
    let statement = repo.positions().explain(&closed)?;
    assert_eq!(statement.sql, "SELECT * FROM \"positions\" WHERE \"closed_at\" IS NULL");
    assert!(statement.params.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_invalid_descriptor_never_reaches_the_store() {
    let store = RecordingStore::empty();
    let repo = repository(store.clone());

    let descriptor = QueryDescriptor::new().filter("symbol", json!({ "startsWith": "US" }));
    let err = repo.tokens().find_many(&descriptor).await.unwrap_err();

    assert!(matches!(err, DataError::Descriptor(_)));
    assert_eq!(store.executed(), 0);
}

#[tokio::test]
async fn test_store_errors_surface_unchanged() {
    let store = RecordingStore::failing();
    let repo = repository(store.clone());

    let err = repo.tokens().find_many(&QueryDescriptor::new()).await.unwrap_err();
    assert!(matches!(err, DataError::Storage(StorageError::Database(_))));
    // No retry at this layer
    assert_eq!(store.executed(), 1);
}

#[test]
fn test_unknown_descriptor_keys_are_rejected() {
    assert!(matches!(
        QueryDescriptor::from_json(r#"{ "filter": { "symbol": "USDC" } }"#),
        Err(DataError::Descriptor(_))
    ));
}
