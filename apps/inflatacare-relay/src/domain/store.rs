//! Latest-Value Store
//!
//! Process-wide mapping from property name to the last value reported by the
//! cloud. Values are overwritten in place and never removed. Only the sync
//! pipeline writes; the REST handlers and the fanout broadcaster read.

use std::collections::BTreeMap;

use inflatacare_core::{PropertyName, PropertySnapshot, PropertyValue};
use parking_lot::RwLock;

/// Thread-safe latest-value cache.
#[derive(Debug, Default)]
pub struct PropertyStore {
    values: RwLock<BTreeMap<PropertyName, PropertyValue>>,
}

impl PropertyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value reported for a property.
    #[must_use]
    pub fn get(&self, name: PropertyName) -> Option<PropertyValue> {
        self.values.read().get(&name).copied()
    }

    /// Overwrite a property's value.
    pub fn set(&self, name: PropertyName, value: PropertyValue) {
        self.values.write().insert(name, value);
    }

    /// Copy of every known value.
    #[must_use]
    pub fn snapshot(&self) -> PropertySnapshot {
        self.values.read().iter().map(|(k, v)| (*k, *v)).collect()
    }

    /// Number of properties with a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Whether nothing has been reported yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}
