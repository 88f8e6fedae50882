use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tsq::{Key, KeySet, SeriesQuery, TsdbEngine, TsdbModel};

/// Arguments shared by every query command
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Model to query, e.g. `group` or `users_affected_by_project`
    #[arg(short, long)]
    pub model: TsdbModel,

    /// Keys as JSON: a list of ids, or an object mapping ids to lists
    #[arg(short, long)]
    pub keys: String,

    /// Range start (RFC 3339)
    #[arg(long)]
    pub start: DateTime<Utc>,

    /// Range end (RFC 3339)
    #[arg(long)]
    pub end: DateTime<Utc>,

    /// Bucket width in seconds
    #[arg(short, long)]
    pub rollup: Option<u64>,

    /// Restrict to one environment id
    #[arg(short, long)]
    pub environment: Option<u64>,
}

impl QueryArgs {
    pub fn to_query(&self) -> Result<SeriesQuery> {
        let value: Value = serde_json::from_str(&self.keys)
            .map_err(|e| anyhow!("--keys is not valid JSON: {}", e))?;
        let keys = KeySet::from_json(&value).map_err(|e| anyhow!("Invalid --keys: {}", e))?;
        if keys == KeySet::Unsupported {
            tracing::warn!("--keys is neither a list nor an object, no key filter applies");
        }

        let mut query = SeriesQuery::new(self.model, keys, self.start, self.end);
        query.rollup = self.rollup;
        query.environment_id = self.environment;
        Ok(query)
    }
}

/// Render a per-key result with string keys, sorted for stable output.
/// An unsupported model renders as `null`.
fn keyed<V: Serialize>(result: Option<HashMap<Key, V>>) -> Result<Value> {
    let Some(result) = result else {
        return Ok(Value::Null);
    };
    let sorted: BTreeMap<Key, V> = result.into_iter().collect();
    let mut out = Map::new();
    for (key, value) in sorted {
        out.insert(key.to_string(), serde_json::to_value(value)?);
    }
    Ok(Value::Object(out))
}

pub async fn run_range(engine: &TsdbEngine, args: &QueryArgs) -> Result<Value> {
    keyed(engine.get_range(&args.to_query()?).await?)
}

pub async fn run_sums(engine: &TsdbEngine, args: &QueryArgs) -> Result<Value> {
    keyed(engine.get_sums(&args.to_query()?).await?)
}

pub async fn run_distinct_series(engine: &TsdbEngine, args: &QueryArgs) -> Result<Value> {
    keyed(engine.get_distinct_counts_series(&args.to_query()?).await?)
}

pub async fn run_distinct_totals(engine: &TsdbEngine, args: &QueryArgs) -> Result<Value> {
    keyed(engine.get_distinct_counts_totals(&args.to_query()?).await?)
}

pub async fn run_distinct_union(engine: &TsdbEngine, args: &QueryArgs) -> Result<Value> {
    let count = engine.get_distinct_counts_union(&args.to_query()?).await?;
    Ok(count.map(Value::from).unwrap_or(Value::Null))
}

pub async fn run_most_frequent(
    engine: &TsdbEngine,
    args: &QueryArgs,
    limit: usize,
) -> Result<Value> {
    keyed(engine.get_most_frequent(&args.to_query()?, limit).await?)
}

pub async fn run_most_frequent_series(
    engine: &TsdbEngine,
    args: &QueryArgs,
    limit: usize,
) -> Result<Value> {
    let result = engine
        .get_most_frequent_series(&args.to_query()?, limit)
        .await?;

    // Score maps are keyed by value, which may be null.
    let result = result.map(|series| {
        series
            .into_iter()
            .map(|(key, points)| {
                let points: Vec<(i64, BTreeMap<String, f64>)> = points
                    .into_iter()
                    .map(|(ts, scores)| {
                        let scores = scores.into_iter().map(|(k, v)| (k.to_string(), v));
                        (ts, scores.collect())
                    })
                    .collect();
                (key, points)
            })
            .collect::<HashMap<_, _>>()
    });
    keyed(result)
}

pub async fn run_frequency_series(engine: &TsdbEngine, args: &QueryArgs) -> Result<Value> {
    keyed(engine.get_frequency_series(&args.to_query()?).await?)
}

pub async fn run_frequency_totals(engine: &TsdbEngine, args: &QueryArgs) -> Result<Value> {
    keyed(engine.get_frequency_totals(&args.to_query()?).await?)
}
