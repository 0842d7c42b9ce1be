//! Feels data console
//!
//! Turns query descriptors into SQL and runs them against the configured
//! store, printing JSON rows. Useful for checking what a resolver's
//! descriptor actually executes.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use feels_data::adapters::storage::PostgresStore;
use feels_data::config::DataConfig;
use feels_data::core::EntityKind;
use feels_data::infrastructure::ServiceContainer;
use feels_data::query::QueryDescriptor;
use feels_data::{Repository, Schema};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "feels-data")]
#[command(about = "Feels query descriptor console")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "feels-data.toml")]
    config: String,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the statement a descriptor compiles to, without connecting
    Explain {
        /// token, pair, transaction or position
        entity: EntityKind,
        /// Descriptor JSON
        #[arg(default_value = "{}")]
        descriptor: String,
        /// Show the count statement instead
        #[arg(long)]
        count: bool,
    },
    /// Run find_many (or find_page) and print the rows
    Query {
        entity: EntityKind,
        #[arg(default_value = "{}")]
        descriptor: String,
        /// Report hasNextPage / endCursor as well
        #[arg(long)]
        page: bool,
    },
    /// Count the rows matching the descriptor's where
    Count {
        entity: EntityKind,
        #[arg(default_value = "{}")]
        descriptor: String,
    },
    /// Resolve token prices through the cached loader
    Prices {
        #[arg(required = true)]
        tokens: Vec<String>,
    },
    /// Check store and cache connectivity
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = Path::new(&cli.config);
    let config_found = config_path.exists();
    let mut config = DataConfig::load(config_found.then_some(config_path))
        .with_context(|| format!("loading configuration from {}", cli.config))?;

    // Override log level if provided
    if let Some(log_level) = cli.log_level {
        config.monitoring.log_level = log_level;
    }

    // Initialize logging
    init_logging(&config);
    if !config_found {
        warn!("Config file not found, using defaults: {}", cli.config);
    }

    match cli.command {
        Command::Explain {
            entity,
            descriptor,
            count,
        } => {
            let repository = offline_repository(&config)?;
            let descriptor = QueryDescriptor::from_json(&descriptor)?;
            let adapter = repository.entity(entity);
            let statement = if count {
                adapter.explain_count(&descriptor)?
            } else {
                adapter.explain(&descriptor)?
            };
            println!("{}", statement.sql);
            print_json(&statement.params)?;
        }
        Command::Query {
            entity,
            descriptor,
            page,
        } => {
            let services = ServiceContainer::new(config).await?;
            let descriptor = QueryDescriptor::from_json(&descriptor)?;
            let adapter = services.repository.entity(entity);
            if page {
                print_json(&adapter.find_page(&descriptor).await?)?;
            } else {
                let rows = adapter.find_many(&descriptor).await?;
                info!("{} {} rows", rows.len(), entity);
                print_json(&rows)?;
            }
        }
        Command::Count { entity, descriptor } => {
            let services = ServiceContainer::new(config).await?;
            let descriptor = QueryDescriptor::from_json(&descriptor)?;
            println!("{}", services.repository.entity(entity).count(&descriptor).await?);
        }
        Command::Prices { tokens } => {
            let services = ServiceContainer::new(config).await?;
            let loader = services.price_loader()?;
            let prices = loader.load_many(&tokens).await?;
            print_json(&tokens.iter().zip(prices).collect::<Vec<_>>())?;
        }
        Command::Health => {
            let services = ServiceContainer::new(config).await?;
            services.health_check().await?;
            println!("ok");
        }
    }

    Ok(())
}

/// Repository over a lazily connecting pool; `explain` never touches it
fn offline_repository(config: &DataConfig) -> Result<Repository> {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_lazy(&config.database.postgres_url)
        .context("invalid postgres_url")?;
    let schema = Schema::dex().with_matching(&config.matching);

    Ok(
        Repository::new(Arc::new(PostgresStore::from_pool(pool)), schema, &config.naming)
            .with_resolution_mode(config.relations.mode),
    )
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging(config: &DataConfig) {
    let log_level = config
        .monitoring
        .log_level
        .parse()
        .unwrap_or(tracing::Level::INFO);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("feels_data={},sqlx=warn", log_level).into());

    // Logs go to stderr so stdout stays machine-readable
    if config.monitoring.structured_logging {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
