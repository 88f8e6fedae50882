//! Folds flat result rows into a tree keyed by each group-by column

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::keys::Key;
use crate::model::AGGREGATE_COLUMN;
use crate::response::Row;

/// One level of the nested result.
///
/// Groups keep the order in which each value first appeared in the rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Nested {
    Leaf(Value),
    Groups(Vec<(Key, Nested)>),
}

impl Nested {
    pub fn get(&self, key: &Key) -> Option<&Nested> {
        match self {
            Nested::Groups(groups) => groups.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            Nested::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&Value> {
        match self {
            Nested::Leaf(value) => Some(value),
            Nested::Groups(_) => None,
        }
    }

    /// Child groups; a leaf has none.
    pub fn into_groups(self) -> Vec<(Key, Nested)> {
        match self {
            Nested::Groups(groups) => groups,
            Nested::Leaf(_) => Vec::new(),
        }
    }

    /// Read a leaf as a non-negative count
    pub fn count(&self) -> Result<u64> {
        match self {
            Nested::Leaf(value) => value_to_count(value),
            Nested::Groups(_) => Err(Error::InvalidResponse(
                "expected an aggregate value, found further grouping".to_string(),
            )),
        }
    }

    /// Sum of every leaf count below this node
    pub fn total(&self) -> Result<u64> {
        match self {
            Nested::Leaf(value) => value_to_count(value),
            Nested::Groups(groups) => groups.iter().map(|(_, child)| child.total()).sum(),
        }
    }

    /// Read a leaf as a ranked top-K list, most frequent first
    pub fn ranked(&self) -> Result<Vec<Key>> {
        match self {
            Nested::Leaf(Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(Key::Null),
                    other => Key::from_value(other).ok_or_else(|| {
                        Error::InvalidResponse(format!("invalid top-K value: {}", other))
                    }),
                })
                .collect(),
            // A zero-filled aggregate means no values were ranked.
            Nested::Leaf(Value::Number(_)) => Ok(Vec::new()),
            _ => Err(Error::InvalidResponse(
                "expected a top-K list aggregate".to_string(),
            )),
        }
    }
}

impl Serialize for Nested {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Nested::Leaf(value) => value.serialize(serializer),
            Nested::Groups(groups) => {
                let mut map = serializer.serialize_map(Some(groups.len()))?;
                for (key, child) in groups {
                    map.serialize_entry(&key.to_string(), child)?;
                }
                map.end()
            }
        }
    }
}

pub(crate) fn value_to_count(value: &Value) -> Result<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .ok_or_else(|| Error::InvalidResponse(format!("invalid count: {}", n))),
        Value::Null => Ok(0),
        other => Err(Error::InvalidResponse(format!("invalid count: {}", other))),
    }
}

/// Nest `rows` by each column of `groups` in order.
///
/// With no columns left the result is the first row's aggregate, or `None`
/// when there are no rows. Callers expecting a scalar treat `None` as zero.
pub fn nest(rows: Vec<Row>, groups: &[String]) -> Result<Option<Nested>> {
    let Some((group, rest)) = groups.split_first() else {
        return Ok(rows.into_iter().next().map(|mut row| {
            Nested::Leaf(row.remove(AGGREGATE_COLUMN).unwrap_or_else(|| Value::from(0)))
        }));
    };

    let mut partitions: Vec<(Key, Vec<Row>)> = Vec::new();
    let mut index: HashMap<Key, usize> = HashMap::new();

    for row in rows {
        let key = match row.get(group.as_str()) {
            Some(Value::Null) => Key::Null,
            Some(value) => Key::from_value(value).ok_or_else(|| {
                Error::InvalidResponse(format!("invalid value for '{}': {}", group, value))
            })?,
            None => {
                return Err(Error::InvalidResponse(format!(
                    "row is missing group column '{}'",
                    group
                )))
            }
        };

        match index.get(&key) {
            Some(&i) => partitions[i].1.push(row),
            None => {
                index.insert(key.clone(), partitions.len());
                partitions.push((key, vec![row]));
            }
        }
    }

    let mut nested = Vec::with_capacity(partitions.len());
    for (key, rows) in partitions {
        if let Some(child) = nest(rows, rest)? {
            nested.push((key, child));
        }
    }

    Ok(Some(Nested::Groups(nested)))
}
