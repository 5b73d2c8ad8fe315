use std::collections::BTreeMap;

use serde::Serialize;

use crate::disclosure::{project, FunctionInfo};
use crate::registry::BehaviorRegistry;

/// Last projection computed for an inspected object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryRecord {
    pub object: String,
    pub kind: String,
    pub functions: Vec<FunctionInfo>,
}

/// Records keyed by object name. A record exists only for objects that were
/// inspected and are still live.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryStore {
    records: BTreeMap<String, DiscoveryRecord>,
}

impl DiscoveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute and store the record for `object`.
    pub fn refresh(
        &mut self,
        object: &str,
        kind: &str,
        registry: &BehaviorRegistry,
    ) -> &DiscoveryRecord {
        let record = DiscoveryRecord {
            object: object.to_string(),
            kind: kind.to_string(),
            functions: project(registry),
        };
        self.records.insert(object.to_string(), record);
        &self.records[object]
    }

    pub fn contains(&self, object: &str) -> bool {
        self.records.contains_key(object)
    }

    pub fn get(&self, object: &str) -> Option<&DiscoveryRecord> {
        self.records.get(object)
    }

    pub fn invalidate(&mut self, object: &str) -> Option<DiscoveryRecord> {
        self.records.remove(object)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiscoveryRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PermissionLevel;

    #[test]
    fn refresh_overwrites_with_current_projection() {
        let mut registry = BehaviorRegistry::new();
        registry.register("open", "return 1", Some(PermissionLevel::Sealed), None);
        let mut store = DiscoveryStore::new();
        assert_eq!(store.refresh("Vault", "Vault", &registry).functions[0].display_name, "o***");

        registry.raise("open", PermissionLevel::Editable);
        store.refresh("Vault", "Vault", &registry);
        assert_eq!(store.get("Vault").unwrap().functions[0].display_name, "open");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn invalidate_removes_record() {
        let registry = BehaviorRegistry::new();
        let mut store = DiscoveryStore::new();
        store.refresh("Coin_1", "Coin", &registry);
        assert!(store.invalidate("Coin_1").is_some());
        assert!(!store.contains("Coin_1"));
        assert!(store.invalidate("Coin_1").is_none());
    }
}
