//! Roll-data contexts: the key-value snapshots formulas evaluate against.
//!
//! A context is built from an actor (optionally merged with one of its
//! items), cached per actor, and invalidated on any mutation. It is a
//! superset of the paths formulas may reference; lookups on missing paths
//! resolve to nothing and the evaluator substitutes zero.

mod builder;
mod value;

pub use builder::{build_actor_context, build_item_context};
pub use value::Value;

pub(crate) use value::format_number as value_render;

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::ActorId;

/// The evaluation environment for formulas.
///
/// Wraps a [`Value`] tree root and provides dotted-path access.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RollData {
    root: BTreeMap<String, Value>,
}

impl RollData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a dotted path, e.g. `abilities.str.mod`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.root.get(first)?;
        for segment in segments {
            match current {
                Value::Object(map) => current = map.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Numeric lookup with the zero-on-missing policy.
    pub fn number(&self, path: &str) -> f64 {
        self.get(path).map(Value::as_number).unwrap_or(0.0)
    }

    /// Set a dotted path, creating intermediate objects as needed.
    ///
    /// Intermediate non-object nodes are replaced; combat changes are
    /// allowed to overwrite scalar destinations.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let last = match segments.pop() {
            Some(last) if !last.is_empty() => last,
            _ => return,
        };
        let mut map = &mut self.root;
        for segment in segments {
            let entry = map
                .entry(segment.to_string())
                .or_insert_with(Value::object);
            if !matches!(entry, Value::Object(_)) {
                *entry = Value::object();
            }
            match entry {
                Value::Object(inner) => map = inner,
                _ => unreachable!(),
            }
        }
        map.insert(last.to_string(), value.into());
    }

    /// Merge another tree into this one under an optional prefix key.
    ///
    /// Used to surface item-local fields under `item`/`self` when building
    /// an item-level context.
    pub fn merge(&mut self, prefix: Option<&str>, other: &RollData) {
        match prefix {
            Some(prefix) => {
                self.root.insert(
                    prefix.to_string(),
                    Value::Object(other.root.clone()),
                );
            }
            None => {
                for (key, value) in &other.root {
                    self.root.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// Actor-level context cache.
///
/// Owned by the component that drives recomputation; every mutation of an
/// actor or one of its owned items must invalidate that actor's entry
/// before the next formula evaluation.
#[derive(Debug, Default)]
pub struct ContextCache {
    entries: HashMap<ActorId, Arc<RollData>>,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the cached context for an actor, building it on miss.
    pub fn get_or_build(
        &mut self,
        actor_id: ActorId,
        build: impl FnOnce() -> RollData,
    ) -> Arc<RollData> {
        self.entries
            .entry(actor_id)
            .or_insert_with(|| Arc::new(build()))
            .clone()
    }

    /// Drop the cached context after a mutation.
    pub fn invalidate(&mut self, actor_id: ActorId) {
        self.entries.remove(&actor_id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_set_nested_paths() {
        let mut data = RollData::new();
        data.set("abilities.str.mod", 2);
        data.set("abilities.str.total", 14);
        assert_eq!(data.number("abilities.str.mod"), 2.0);
        assert_eq!(data.number("abilities.str.total"), 14.0);
        assert_eq!(data.number("abilities.dex.mod"), 0.0);
    }

    #[test]
    fn set_replaces_scalar_intermediate() {
        let mut data = RollData::new();
        data.set("attack", 5);
        data.set("attack.bonus", 3);
        assert_eq!(data.number("attack.bonus"), 3.0);
    }

    #[test]
    fn merge_under_prefix() {
        let mut actor = RollData::new();
        actor.set("attributes.bab.total", 5);
        let mut item = RollData::new();
        item.set("level", 3);
        actor.merge(Some("item"), &item);
        assert_eq!(actor.number("item.level"), 3.0);
        assert_eq!(actor.number("attributes.bab.total"), 5.0);
    }

    #[test]
    fn cache_invalidation_forces_rebuild() {
        let mut cache = ContextCache::new();
        let id = ActorId(7);
        let first = cache.get_or_build(id, || {
            let mut data = RollData::new();
            data.set("x", 1);
            data
        });
        assert_eq!(first.number("x"), 1.0);
        // Cached: the second closure must not run.
        let second = cache.get_or_build(id, || unreachable!());
        assert_eq!(second.number("x"), 1.0);
        cache.invalidate(id);
        let third = cache.get_or_build(id, || {
            let mut data = RollData::new();
            data.set("x", 2);
            data
        });
        assert_eq!(third.number("x"), 2.0);
    }
}
