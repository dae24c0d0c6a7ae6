//! Typed property multimap: the payload of a published service and the
//! subject of every subscription filter.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A single property value. Filters fail (rather than error) when a leaf
/// relation is compared against the wrong variant — see [`crate::filter`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Str(String),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Int(_) => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

/// A multimap from property key to the set of values published under it.
///
/// Keys and values are kept in sorted (`BTreeMap`/`BTreeSet`) containers so
/// that two props with the same logical content compare equal regardless of
/// insertion order, and so that `services`/`subscriptions` snapshots are
/// emitted deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Props(BTreeMap<String, BTreeSet<Value>>);

impl Props {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert `value` under `key`, adding to any existing value set.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.entry(key.into()).or_default().insert(value.into());
    }

    /// All values published under `key`, or an empty slice-equivalent if the
    /// key is absent.
    pub fn get(&self, key: &str) -> impl Iterator<Item = &Value> {
        self.0.get(key).into_iter().flatten()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<Value>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<(String, Value)> for Props {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut props = Props::new();
        for (k, v) in iter {
            props.insert(k, v);
        }
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_accumulates_multivalue() {
        let mut p = Props::new();
        p.insert("name", "foo");
        p.insert("name", "bar");
        let values: Vec<_> = p.get("name").cloned().collect();
        assert_eq!(values, vec![Value::from("bar"), Value::from("foo")]);
    }

    #[test]
    fn equality_is_order_independent() {
        let mut a = Props::new();
        a.insert("x", 1i64);
        a.insert("y", "z");

        let mut b = Props::new();
        b.insert("y", "z");
        b.insert("x", 1i64);

        assert_eq!(a, b);
    }

    #[test]
    fn missing_key_yields_empty_iterator() {
        let p = Props::new();
        assert_eq!(p.get("nope").count(), 0);
    }

    #[test]
    fn json_round_trip() {
        let mut p = Props::new();
        p.insert("color", "green");
        p.insert("port", 8080i64);
        let json = serde_json::to_string(&p).unwrap();
        let back: Props = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
