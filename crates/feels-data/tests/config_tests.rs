//! Configuration system tests

use anyhow::Result;
use feels_data::config::DataConfig;
use feels_data::core::DataError;
use feels_data::loader::WriteBack;
use feels_data::ResolutionMode;
use rust_decimal::Decimal;
use std::fs;
use tempfile::TempDir;

/// Create a test configuration file
fn create_test_config_content() -> String {
    r#"
[database]
postgres_url = "postgresql://feels:feels@db:5432/feels_test"
max_connections = 8
min_connections = 2

[redis]
enabled = false
url = "redis://cache:6379"

[loader]
cache_ttl_secs = 120
key_prefix = "px:"
write_back = "never"

[loader.price_source]
table = "prices"
key_column = "token"
value_column = "usd"
recency_column = "block"

[pricing]
quote_token_id = "usdc"
quote_price_usd = "1.0"

[relations]
mode = "sequential"

[naming]
acronyms = ["USD", "ETH"]

[matching]
exact = ["address", "owner"]
suffixes = []

[monitoring]
log_level = "debug"
structured_logging = true
"#
    .to_string()
}

#[test]
fn test_config_loading_from_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("feels-data.toml");
    fs::write(&config_path, create_test_config_content())?;

    let config = DataConfig::from_file(&config_path)?;

    assert_eq!(config.database.max_connections, 8);
    assert_eq!(config.database.min_connections, 2);
    // Unspecified fields keep their defaults
    assert_eq!(config.database.acquire_timeout_secs, 30);

    assert!(!config.redis.enabled);
    assert_eq!(config.loader.cache_ttl_secs, 120);
    assert_eq!(config.loader.write_back, WriteBack::Never);
    assert_eq!(config.loader.price_source.table, "prices");
    assert_eq!(config.pricing.quote_token_id, "usdc");
    assert_eq!(config.pricing.quote_price_usd, Decimal::ONE);
    assert_eq!(config.relations.mode, ResolutionMode::Sequential);
    assert_eq!(config.naming.acronyms, vec!["USD", "ETH"]);
    assert!(config.matching.is_case_insensitive("owner"));
    assert!(!config.matching.is_case_insensitive("token_address"));
    assert!(config.monitoring.structured_logging);

    Ok(())
}

#[test]
fn test_partial_file_uses_defaults() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("partial.toml");
    fs::write(&config_path, "[monitoring]\nlog_level = \"warn\"\n")?;

    let config = DataConfig::from_file(&config_path)?;
    assert_eq!(config.monitoring.log_level, "warn");
    assert_eq!(config.relations.mode, ResolutionMode::Batched);
    assert_eq!(config.loader.write_back, WriteBack::Computed);
    Ok(())
}

#[test]
fn test_config_validation() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let bad_range = temp_dir.path().join("bad_range.toml");
    fs::write(&bad_range, "[database]\nmax_connections = 0\n")?;
    assert!(matches!(
        DataConfig::from_file(&bad_range),
        Err(DataError::Configuration(_))
    ));

    let bad_url = temp_dir.path().join("bad_url.toml");
    fs::write(&bad_url, "[redis]\nurl = \"not a url\"\n")?;
    assert!(DataConfig::from_file(&bad_url).is_err());

    let bad_source = temp_dir.path().join("bad_source.toml");
    fs::write(
        &bad_source,
        "[loader.price_source]\ntable = \"\"\nkey_column = \"k\"\nvalue_column = \"v\"\nrecency_column = \"t\"\n",
    )?;
    assert!(DataConfig::from_file(&bad_source).is_err());

    let unknown_mode = temp_dir.path().join("unknown_mode.toml");
    fs::write(&unknown_mode, "[relations]\nmode = \"parallel\"\n")?;
    assert!(DataConfig::from_file(&unknown_mode).is_err());

    assert!(DataConfig::from_file(temp_dir.path().join("missing.toml")).is_err());
    Ok(())
}

#[test]
fn test_layered_loading_with_environment_override() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("layered.toml");
    fs::write(&config_path, "[loader]\ncache_ttl_secs = 90\nkey_prefix = \"file:\"\n")?;

    std::env::set_var("FEELS_DATA__LOADER__KEY_PREFIX", "env:");
    let config = DataConfig::load(Some(&config_path));
    std::env::remove_var("FEELS_DATA__LOADER__KEY_PREFIX");
    let config = config?;

    assert_eq!(config.loader.cache_ttl_secs, 90);
    assert_eq!(config.loader.key_prefix, "env:");
    assert_eq!(config.database.max_connections, 20);
    Ok(())
}
