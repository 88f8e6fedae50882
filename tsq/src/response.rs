//! Validation and scrubbing of backend query responses

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::model::{AGGREGATE_COLUMN, TIME_COLUMN};

/// A single result row: every group-by column, `aggregate`, maybe `time`
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColumnMeta {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryResponse {
    pub meta: Vec<ColumnMeta>,
    pub data: Vec<Row>,
}

impl QueryResponse {
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::InvalidResponse(format!("unexpected response body: {}", e)))
    }
}

/// Check the returned columns against the request and normalize rows.
///
/// Any column outside `groupby + ["aggregate"]` aborts with
/// [`Error::UnexpectedColumn`]. `time` values become epoch seconds and null
/// or missing aggregates become `0`.
pub fn validate_and_scrub(response: QueryResponse, groupby: &[String]) -> Result<Vec<Row>> {
    for column in &response.meta {
        let expected =
            column.name == AGGREGATE_COLUMN || groupby.iter().any(|g| *g == column.name);
        if !expected {
            let mut expected: Vec<String> = groupby.to_vec();
            expected.push(AGGREGATE_COLUMN.to_string());
            return Err(Error::UnexpectedColumn {
                column: column.name.clone(),
                expected,
            });
        }
    }

    let mut rows = response.data;
    for row in &mut rows {
        if let Some(time) = row.get_mut(TIME_COLUMN) {
            *time = Value::from(epoch_seconds(time)?);
        }
        match row.get(AGGREGATE_COLUMN) {
            None | Some(Value::Null) => {
                row.insert(AGGREGATE_COLUMN.to_string(), Value::from(0));
            }
            Some(_) => {}
        }
    }

    Ok(rows)
}

fn epoch_seconds(value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| Error::InvalidResponse(format!("invalid time value: {}", n))),
        Value::String(s) => parse_timestamp(s),
        other => Err(Error::InvalidResponse(format!(
            "invalid time value: {}",
            other
        ))),
    }
}

/// Parse a backend timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(s: &str) -> Result<i64> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(dt.timestamp());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(naive.and_utc().timestamp());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc().timestamp());
        }
    }
    Err(Error::InvalidResponse(format!("invalid timestamp: '{}'", s)))
}
