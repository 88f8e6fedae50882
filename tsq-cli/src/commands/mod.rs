pub mod plan;
pub mod query;

pub use plan::{run_plan, run_rollup};
pub use query::{
    run_distinct_series, run_distinct_totals, run_distinct_union, run_frequency_series,
    run_frequency_totals, run_most_frequent, run_most_frequent_series, run_range, run_sums,
    QueryArgs,
};

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tsq::engine::Resolvers;
use tsq::{Config, StaticCatalog, TsdbEngine};

/// Build an engine over HTTP, resolving lookups from the catalog if one is given
pub fn connect(config: &Config, catalog: Option<&Path>) -> Result<TsdbEngine> {
    let catalog = match catalog {
        Some(path) => StaticCatalog::load(path)
            .with_context(|| format!("Failed to load catalog from {:?}", path))?,
        None => {
            tracing::debug!("No catalog given, environment and issue lookups will be empty");
            StaticCatalog::default()
        }
    };

    let engine = TsdbEngine::connect(config, Resolvers::shared(Arc::new(catalog)))
        .context("Failed to create HTTP client")?;
    Ok(engine)
}
