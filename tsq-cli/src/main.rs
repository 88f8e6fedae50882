use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tsq::config::LoggingConfig;
use tsq::{Aggregation, Config};

mod commands;

use commands::QueryArgs;

#[derive(Parser, Debug)]
#[command(name = "tsq")]
#[command(about = "tsq - time-series queries against an analytic query backend")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "~/.tsq/config.toml", env = "TSQ_CONFIG")]
    config: PathBuf,

    /// YAML catalog of environments, issues and entity owners
    #[arg(long, env = "TSQ_CATALOG")]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Event counts per key and time bucket
    Range(QueryArgs),

    /// Total event count per key
    Sums(QueryArgs),

    /// Distinct counts per key and time bucket
    DistinctSeries(QueryArgs),

    /// Distinct count per key over the whole range
    DistinctTotals(QueryArgs),

    /// Distinct count across all keys
    DistinctUnion(QueryArgs),

    /// Top values per key with their scores
    MostFrequent {
        #[command(flatten)]
        query: QueryArgs,

        /// Number of values to rank
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Top values per key and time bucket
    MostFrequentSeries {
        #[command(flatten)]
        query: QueryArgs,

        /// Number of values to rank
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Nested frequencies per key and time bucket
    FrequencySeries(QueryArgs),

    /// Nested frequencies per key
    FrequencyTotals(QueryArgs),

    /// Show the rollup used for a query starting at the given time
    Rollup {
        /// Range start (RFC 3339), defaults to now
        #[arg(long)]
        start: Option<DateTime<Utc>>,
    },

    /// Print the backend request a query would send, without sending it
    Plan {
        #[command(flatten)]
        query: QueryArgs,

        /// Aggregation: count, uniq or topK(N)
        #[arg(short, long, default_value = "count")]
        aggregation: Aggregation,

        /// Do not group by the model column
        #[arg(long)]
        no_group_model: bool,

        /// Do not group by time bucket
        #[arg(long)]
        no_group_time: bool,
    },
}

/// Logs go to stderr so stdout stays valid JSON.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| logging.level.clone()),
    );
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| logging.format.clone());
    let registry = tracing_subscriber::registry().with(filter);

    if format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    init_tracing(&config.logging);

    tracing::debug!("Query endpoint: {}", config.backend.query_url());
    let engine = commands::connect(&config, cli.catalog.as_deref())?;

    let output = match cli.command {
        Commands::Range(query) => commands::run_range(&engine, &query).await?,
        Commands::Sums(query) => commands::run_sums(&engine, &query).await?,
        Commands::DistinctSeries(query) => commands::run_distinct_series(&engine, &query).await?,
        Commands::DistinctTotals(query) => commands::run_distinct_totals(&engine, &query).await?,
        Commands::DistinctUnion(query) => commands::run_distinct_union(&engine, &query).await?,
        Commands::MostFrequent { query, limit } => {
            commands::run_most_frequent(&engine, &query, limit).await?
        }
        Commands::MostFrequentSeries { query, limit } => {
            commands::run_most_frequent_series(&engine, &query, limit).await?
        }
        Commands::FrequencySeries(query) => {
            commands::run_frequency_series(&engine, &query).await?
        }
        Commands::FrequencyTotals(query) => {
            commands::run_frequency_totals(&engine, &query).await?
        }
        Commands::Rollup { start } => {
            commands::run_rollup(&engine, start.unwrap_or_else(Utc::now))
        }
        Commands::Plan {
            query,
            aggregation,
            no_group_model,
            no_group_time,
        } => {
            commands::run_plan(&engine, &query, aggregation, !no_group_model, !no_group_time)
                .await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
