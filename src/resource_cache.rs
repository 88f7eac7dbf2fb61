//! Process-wide cache of resources keyed by absolute URL.
//!
//! Each entry holds an optional value plus the URLs it depends on (a
//! stylesheet and the images it references, for instance). Dependency graphs
//! may contain cycles; traversal visits every key at most once.

use dashmap::DashMap;
use std::collections::{BTreeMap, HashSet};

use crate::types::Resource;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: Option<V>,
    dependencies: Vec<String>,
}

impl<V> Default for Entry<V> {
    fn default() -> Self {
        Self {
            value: None,
            dependencies: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct ResourceCache<V = Resource> {
    entries: DashMap<String, Entry<V>>,
}

impl<V> Default for ResourceCache<V> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<V: Clone> ResourceCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_value(&self, key: &str) -> Option<V> {
        self.entries.get(key).and_then(|entry| entry.value.clone())
    }

    /// Store `value` under `key`, keeping any dependencies already recorded.
    pub fn set_value(&self, key: &str, value: V) -> V {
        self.entries.entry(key.to_string()).or_default().value = Some(value.clone());
        value
    }

    pub fn set_dependencies(&self, key: &str, dependencies: Vec<String>) {
        self.entries.entry(key.to_string()).or_default().dependencies = dependencies;
    }

    /// Return the cached value, or atomically insert the one built by `make`.
    ///
    /// `make` runs while the key's shard is locked; it must not touch the
    /// cache.
    pub fn get_or_insert_with(&self, key: &str, make: impl FnOnce() -> V) -> V {
        let mut entry = self.entries.entry(key.to_string()).or_default();
        if let Some(value) = &entry.value {
            return value.clone();
        }
        let value = make();
        entry.value = Some(value.clone());
        value
    }

    /// Value of `key` and of everything reachable through its dependencies.
    /// Keys without a value are left out, as is anything reachable only
    /// through them.
    pub fn get_with_dependencies(&self, key: &str) -> BTreeMap<String, V> {
        let mut found = BTreeMap::new();
        let mut visited = HashSet::new();
        let mut pending = vec![key.to_string()];

        while let Some(current) = pending.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(entry) = self.entries.get(&current) else {
                continue;
            };
            let (value, dependencies) = (entry.value.clone(), entry.dependencies.clone());
            drop(entry);

            // a key without a value contributes neither itself nor its dependencies
            let Some(value) = value else {
                continue;
            };
            found.insert(current, value);
            pending.extend(
                dependencies
                    .into_iter()
                    .filter(|dependency| !visited.contains(dependency)),
            );
        }
        found
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.remove(key).and_then(|(_, entry)| entry.value)
    }

    /// Remove `key` only if its value still satisfies `predicate`, checked
    /// under the shard lock. A caller that settled an older value must not
    /// evict a newer one stored in the meantime.
    pub fn remove_if(&self, key: &str, predicate: impl FnOnce(&V) -> bool) -> Option<V> {
        self.entries
            .remove_if(key, |_, entry| entry.value.as_ref().is_some_and(predicate))
            .and_then(|(_, entry)| entry.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.value.is_some())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
