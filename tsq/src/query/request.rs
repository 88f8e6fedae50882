//! Wire types for the backend query endpoint

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::keys::Key;

/// Aggregation function applied per group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Count,
    Uniq,
    TopK(usize),
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Count => f.write_str("count"),
            Aggregation::Uniq => f.write_str("uniq"),
            Aggregation::TopK(limit) => write!(f, "topK({})", limit),
        }
    }
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "count" => Ok(Aggregation::Count),
            "uniq" => Ok(Aggregation::Uniq),
            other => other
                .strip_prefix("topK(")
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(|limit| limit.parse().ok())
                .map(Aggregation::TopK)
                .ok_or_else(|| format!("unknown aggregation '{}'", other)),
        }
    }
}

impl Serialize for Aggregation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "=")]
    Eq,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Set(Vec<Key>),
    Single(Key),
}

/// A filter condition, encoded as `[column, operator, value]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    pub value: ConditionValue,
}

impl Condition {
    pub fn is_in(column: &str, values: Vec<Key>) -> Self {
        Self {
            column: column.to_string(),
            operator: Operator::In,
            value: ConditionValue::Set(values),
        }
    }

    pub fn equals(column: &str, value: impl Into<Key>) -> Self {
        Self {
            column: column.to_string(),
            operator: Operator::Eq,
            value: ConditionValue::Single(value.into()),
        }
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.column, self.operator, &self.value).serialize(serializer)
    }
}

/// Request body posted to the query endpoint.
///
/// Optional fields are left out of the JSON entirely when unset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    pub from_date: String,
    pub to_date: String,
    pub conditions: Vec<Condition>,
    pub groupby: Vec<String>,
    pub project: Vec<Key>,
    pub aggregation: Aggregation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregateby: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<(Key, Vec<String>)>>,
}
