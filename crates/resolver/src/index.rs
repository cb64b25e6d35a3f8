//! Per-call ledger of fetched resources and requested URLs

use std::collections::{HashMap, HashSet};

use fhir_graph_core::ResourceKey;
use serde_json::Value as JsonValue;

/// Deduplication ledger for one resolution call.
///
/// Guarantees at most one fetch per `(resourceType, id)` and per URL, which
/// is also what stops the walker on cyclic references. Lives only as long as
/// the call that created it.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    resolved: HashMap<ResourceKey, JsonValue>,
    order: Vec<ResourceKey>,
    requested: HashSet<String>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, key: &ResourceKey) -> bool {
        self.resolved.contains_key(key)
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&JsonValue> {
        self.resolved.get(key)
    }

    /// Record a freshly fetched resource. Returns `false` and keeps the first
    /// value when the key was already recorded.
    pub fn record(&mut self, key: ResourceKey, resource: JsonValue) -> bool {
        if self.resolved.contains_key(&key) {
            return false;
        }
        self.order.push(key.clone());
        self.resolved.insert(key, resource);
        true
    }

    /// Replace a recorded resource with its dereferenced form.
    /// Unknown keys are ignored.
    pub fn settle(&mut self, key: &ResourceKey, resource: JsonValue) -> bool {
        match self.resolved.get_mut(key) {
            Some(slot) => {
                *slot = resource;
                true
            }
            None => false,
        }
    }

    pub fn has_requested(&self, url: &str) -> bool {
        self.requested.contains(url)
    }

    /// Returns `false` if the URL had already been requested
    pub fn mark_requested(&mut self, url: &str) -> bool {
        self.requested.insert(url.to_string())
    }

    /// Number of recorded resources
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Recorded resources in the order they were first fetched
    pub fn fetched(&self) -> impl Iterator<Item = (&ResourceKey, &JsonValue)> {
        self.order
            .iter()
            .filter_map(|key| self.resolved.get(key).map(|resource| (key, resource)))
    }

    pub fn into_fetched(mut self) -> Vec<(ResourceKey, JsonValue)> {
        self.order
            .into_iter()
            .filter_map(|key| self.resolved.remove(&key).map(|resource| (key, resource)))
            .collect()
    }
}
