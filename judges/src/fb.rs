//! Minimal in-memory fact store.
//!
//! Judges read and mutate a shared repository of facts. The scheduler only
//! needs the narrow interface consumed here: insert, equality query, bulk
//! delete, per-fact property get/set, size, and import/export of an opaque
//! checkpoint blob (serialized JSON). There is no query language, no
//! transactions, and no indexing.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable handle to one fact within a [`Factbase`].
pub type FactId = u64;

/// One fact: a bag of multi-valued properties.
///
/// Setting a property appends a value rather than replacing it; the summary
/// record relies on this to carry several `error` values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fact {
    props: BTreeMap<String, Vec<Value>>,
}

impl Fact {
    /// Append a value under `key`.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.props.entry(key.to_string()).or_default().push(value.into());
    }

    /// First value under `key`, if any.
    pub fn first(&self, key: &str) -> Option<&Value> {
        self.props.get(key).and_then(|values| values.first())
    }

    /// All values under `key`, possibly empty.
    pub fn all(&self, key: &str) -> &[Value] {
        self.props.get(key).map_or(&[], Vec::as_slice)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    facts: Vec<Fact>,
}

/// The shared fact repository.
#[derive(Debug, Clone, Default)]
pub struct Factbase {
    facts: BTreeMap<FactId, Fact>,
    next_id: FactId,
}

impl Factbase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an empty fact and return its handle.
    pub fn insert(&mut self) -> FactId {
        let id = self.next_id;
        self.next_id += 1;
        self.facts.insert(id, Fact::default());
        id
    }

    pub fn fact(&self, id: FactId) -> Option<&Fact> {
        self.facts.get(&id)
    }

    pub fn fact_mut(&mut self, id: FactId) -> Option<&mut Fact> {
        self.facts.get_mut(&id)
    }

    /// Iterate all facts in insertion order.
    pub fn facts(&self) -> impl Iterator<Item = (FactId, &Fact)> {
        self.facts.iter().map(|(id, fact)| (*id, fact))
    }

    /// Handles of all facts whose first `key` value equals `value`.
    pub fn query_eq(&self, key: &str, value: &Value) -> Vec<FactId> {
        self.facts()
            .filter(|(_, fact)| fact.first(key) == Some(value))
            .map(|(id, _)| id)
            .collect()
    }

    /// Delete the given facts; unknown handles are ignored.
    pub fn delete(&mut self, ids: &[FactId]) {
        for id in ids {
            self.facts.remove(id);
        }
    }

    pub fn size(&self) -> usize {
        self.facts.len()
    }

    /// Serialize the whole store to a checkpoint blob.
    pub fn export(&self) -> Result<Vec<u8>> {
        let snapshot = Snapshot {
            facts: self.facts.values().cloned().collect(),
        };
        let mut bytes = serde_json::to_vec_pretty(&snapshot).context("serialize factbase")?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Extend the store with the facts of a checkpoint blob.
    pub fn import(&mut self, bytes: &[u8]) -> Result<()> {
        let snapshot: Snapshot = serde_json::from_slice(bytes).context("parse factbase blob")?;
        for fact in snapshot.facts {
            let id = self.insert();
            self.facts.insert(id, fact);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inserts_and_counts_facts() {
        let mut fb = Factbase::new();
        assert_eq!(fb.size(), 0);
        fb.insert();
        fb.insert();
        assert_eq!(fb.size(), 2);
    }

    #[test]
    fn properties_accumulate_values() {
        let mut fb = Factbase::new();
        let id = fb.insert();
        let fact = fb.fact_mut(id).expect("fact");
        fact.set("error", "first");
        fact.set("error", "second");
        assert_eq!(fact.first("error"), Some(&json!("first")));
        assert_eq!(fact.all("error").len(), 2);
        assert!(fact.all("missing").is_empty());
    }

    #[test]
    fn queries_by_first_value_equality() {
        let mut fb = Factbase::new();
        let a = fb.insert();
        fb.fact_mut(a).expect("fact").set("what", "summary");
        let b = fb.insert();
        fb.fact_mut(b).expect("fact").set("what", "other");
        assert_eq!(fb.query_eq("what", &json!("summary")), vec![a]);
        assert!(fb.query_eq("what", &json!("nope")).is_empty());
    }

    #[test]
    fn bulk_delete_removes_query_results() {
        let mut fb = Factbase::new();
        for _ in 0..3 {
            let id = fb.insert();
            fb.fact_mut(id).expect("fact").set("kind", "junk");
        }
        let keep = fb.insert();
        fb.fact_mut(keep).expect("fact").set("kind", "real");
        let junk = fb.query_eq("kind", &json!("junk"));
        fb.delete(&junk);
        assert_eq!(fb.size(), 1);
        assert!(fb.fact(keep).is_some());
    }

    #[test]
    fn export_import_extends_the_store() {
        let mut fb = Factbase::new();
        let id = fb.insert();
        fb.fact_mut(id).expect("fact").set("zzz", 43);
        let blob = fb.export().expect("export");

        let mut other = Factbase::new();
        other.insert();
        other.import(&blob).expect("import");
        assert_eq!(other.size(), 2);
        assert_eq!(other.query_eq("zzz", &json!(43)).len(), 1);
    }

    #[test]
    fn import_rejects_garbage() {
        let mut fb = Factbase::new();
        assert!(fb.import(b"not json").is_err());
    }
}
