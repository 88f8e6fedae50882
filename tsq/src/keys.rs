//! Caller-supplied keys and their normalization into filter values

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// An identifier as used by callers and returned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// A missing group value in a backend row (e.g. an event without a release)
    Null,
    Int(i64),
    Str(String),
}

impl Key {
    /// Parse a textual key, preferring the integer form.
    ///
    /// JSON object keys are always strings, so `{"101": [...]}` must still
    /// address issue `101`.
    pub fn parse(s: &str) -> Self {
        s.parse::<i64>()
            .map(Key::Int)
            .unwrap_or_else(|_| Key::Str(s.to_string()))
    }

    /// Convert a backend cell into a key. Returns `None` for nulls, floats,
    /// unsigned integers above `i64::MAX`, arrays and objects.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Key::Int),
            Value::String(s) => Some(Key::Str(s.clone())),
            Value::Bool(b) => Some(Key::Str(b.to_string())),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Key::Int(i) => Some(*i),
            Key::Null | Key::Str(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Null => f.write_str("null"),
            Key::Int(i) => write!(f, "{}", i),
            Key::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(value)
    }
}

/// The two key shapes accepted by every operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum KeySet {
    /// Top-level keys only, e.g. a list of issue ids
    Flat(Vec<Key>),
    /// Top-level keys each narrowed to a set of second-level keys,
    /// e.g. `{issue: [release, ...]}`
    Nested(BTreeMap<Key, Vec<Key>>),
    /// Any other shape. Contributes no filter.
    #[serde(skip_serializing)]
    Unsupported,
}

impl KeySet {
    pub fn flat<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        KeySet::Flat(keys.into_iter().map(Into::into).collect())
    }

    /// Decode a JSON list or object. Anything else is `Unsupported`.
    pub fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|v| Key::from_value(v).ok_or_else(|| format!("invalid key: {}", v)))
                .collect::<Result<Vec<_>, _>>()
                .map(KeySet::Flat),
            Value::Object(map) => {
                let mut nested = BTreeMap::new();
                for (top, second) in map {
                    let second = match second {
                        Value::Array(items) => items
                            .iter()
                            .map(|v| {
                                Key::from_value(v).ok_or_else(|| format!("invalid key: {}", v))
                            })
                            .collect::<Result<Vec<_>, _>>()?,
                        other => return Err(format!("expected a list under '{}', got {}", top, other)),
                    };
                    nested.insert(Key::parse(top), second);
                }
                Ok(KeySet::Nested(nested))
            }
            _ => Ok(KeySet::Unsupported),
        }
    }

    pub fn normalize(&self) -> NormalizedKeys {
        normalize(self)
    }
}

impl<'de> Deserialize<'de> for KeySet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        KeySet::from_json(&value).map_err(de::Error::custom)
    }
}

/// `(top_keys, union_of_second_keys)` as used to build filter conditions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedKeys {
    pub top: Option<Vec<Key>>,
    pub second: Option<Vec<Key>>,
}

pub fn normalize(keys: &KeySet) -> NormalizedKeys {
    match keys {
        KeySet::Flat(top) => NormalizedKeys {
            top: Some(top.clone()),
            second: None,
        },
        KeySet::Nested(map) => {
            // An empty mapping yields an empty union, not an absent one.
            let union: BTreeSet<&Key> = map.values().flatten().collect();
            NormalizedKeys {
                top: Some(map.keys().cloned().collect()),
                second: Some(union.into_iter().cloned().collect()),
            }
        }
        KeySet::Unsupported => NormalizedKeys::default(),
    }
}
