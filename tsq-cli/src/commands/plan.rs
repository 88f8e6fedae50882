use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tsq::{Aggregation, TsdbEngine};

use super::QueryArgs;

/// The request body an operation would send, with the endpoint it goes to
pub async fn run_plan(
    engine: &TsdbEngine,
    args: &QueryArgs,
    aggregation: Aggregation,
    group_on_model: bool,
    group_on_time: bool,
) -> Result<Value> {
    let query = args.to_query()?;
    let request = engine
        .build_request(&query, aggregation, group_on_model, group_on_time)
        .await?;

    match request {
        Some(request) => Ok(json!({
            "url": engine.query_url(),
            "request": request,
        })),
        None => {
            tracing::warn!("Model '{}' has no backend columns", query.model);
            Ok(Value::Null)
        }
    }
}

pub fn run_rollup(engine: &TsdbEngine, start: DateTime<Utc>) -> Value {
    json!({
        "rollup": engine.get_optimal_rollup(start),
        "rollups": engine.get_rollups(),
    })
}
