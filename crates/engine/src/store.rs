use std::collections::BTreeMap;

use crate::model::FieldMapping;

/// Read-only lookup of field mappings by id.
pub trait MappingStore: Send + Sync {
    fn get(&self, id: &str) -> Option<FieldMapping>;

    /// All ids, sorted.
    fn ids(&self) -> Vec<String>;
}

/// In-memory store, mainly for callers that already hold their mappings.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    mappings: BTreeMap<String, FieldMapping>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later mappings with the same id replace earlier ones.
    pub fn insert(&mut self, mapping: FieldMapping) {
        self.mappings.insert(mapping.id.clone(), mapping);
    }
}

impl FromIterator<FieldMapping> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = FieldMapping>>(iter: I) -> Self {
        let mut store = Self::new();
        for mapping in iter {
            store.insert(mapping);
        }
        store
    }
}

impl MappingStore for MemoryStore {
    fn get(&self, id: &str) -> Option<FieldMapping> {
        self.mappings.get(id).cloned()
    }

    fn ids(&self) -> Vec<String> {
        self.mappings.keys().cloned().collect()
    }
}
