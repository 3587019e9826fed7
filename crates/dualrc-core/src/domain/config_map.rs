//! The key/value map held by a store, plus key-query parsing for `get`.
//!
//! A [`ConfigMap`] is a JSON object.  `serde_json` is built with the
//! `preserve_order` feature, so keys keep their insertion order and the
//! serialized form of a map is stable from one save to the next.
//!
//! # Key queries
//!
//! `get` accepts either one key or a comma-separated list of keys:
//!
//! | Query          | Parsed as                      |
//! |----------------|--------------------------------|
//! | `"port"`       | single key `port`              |
//! | `" port "`     | single key `port`              |
//! | `"port,host"`  | list `[port, host]`            |
//! | `"a , b,,a"`   | list `[a, b]`                  |
//! | `"port,"`      | list `[port]`                  |
//! | `""` or `","`  | empty list                     |
//!
//! A query is a list exactly when it contains a comma.  Segments are trimmed,
//! empty segments are dropped and repeated keys are kept once (first wins).

use serde_json::Value;

/// Mapping from key to an arbitrary JSON value.
pub type ConfigMap = serde_json::Map<String, Value>;

/// A parsed `get` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyQuery {
    /// Exactly one key; answered with the bare value.
    Single(String),
    /// Zero or more keys; answered with a key → value mapping.
    List(Vec<String>),
}

impl KeyQuery {
    /// Parses a query string according to the rules in the module docs.
    pub fn parse(query: &str) -> Self {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return KeyQuery::List(Vec::new());
        }
        if !trimmed.contains(',') {
            return KeyQuery::Single(trimmed.to_string());
        }

        let mut keys: Vec<String> = Vec::new();
        for segment in trimmed.split(',').map(str::trim) {
            if segment.is_empty() || keys.iter().any(|k| k == segment) {
                continue;
            }
            keys.push(segment.to_string());
        }
        KeyQuery::List(keys)
    }

    /// Resolves the query against `config`.
    pub fn resolve(&self, config: &ConfigMap) -> Lookup {
        match self {
            KeyQuery::Single(key) => Lookup::One(config.get(key).cloned()),
            KeyQuery::List(keys) => Lookup::Many(
                keys.iter()
                    .map(|key| (key.clone(), config.get(key).cloned()))
                    .collect(),
            ),
        }
    }
}

/// Result of a `get`.
///
/// `None` marks an absent key and is distinct from a stored JSON `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Answer to a single-key query.
    One(Option<Value>),
    /// Answer to a key-list query, in request order.
    Many(Vec<(String, Option<Value>)>),
}

impl Lookup {
    /// Returns the bare value of a single-key answer.
    pub fn one(&self) -> Option<&Value> {
        match self {
            Lookup::One(value) => value.as_ref(),
            Lookup::Many(_) => None,
        }
    }

    /// Returns the value recorded for `key` in a key-list answer.
    ///
    /// The outer `Option` is `None` when `key` was not requested.
    pub fn field(&self, key: &str) -> Option<Option<&Value>> {
        match self {
            Lookup::One(_) => None,
            Lookup::Many(entries) => entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_ref()),
        }
    }

    /// Converts the answer to JSON, rendering absent keys as `null`.
    pub fn to_json(&self) -> Value {
        match self {
            Lookup::One(value) => value.clone().unwrap_or(Value::Null),
            Lookup::Many(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone().unwrap_or(Value::Null)))
                    .collect(),
            ),
        }
    }
}

/// Serializes `config` as a pretty-printed JSON document (2-space indent),
/// keys in map order.
pub fn to_document(config: &ConfigMap) -> String {
    format!("{:#}", Value::Object(config.clone()))
}

/// Merges every key of `overrides` into `target`, overwriting collisions.
pub fn merge_into(target: &mut ConfigMap, overrides: ConfigMap) {
    for (key, value) in overrides {
        target.insert(key, value);
    }
}
