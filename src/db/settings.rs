/// Settings store collaborator
///
/// Values are kept as strings keyed by `[Group]` + name, the same shape the
/// station's preference file uses. Parsing into typed config happens in
/// `scheduler::autodj`.
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigKey {
    pub group: String,
    pub name: String,
}

impl ConfigKey {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self { group: group.into(), name: name.into() }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.group, self.name)
    }
}

pub trait SettingsStore: Send {
    fn get(&self, key: &ConfigKey) -> Option<String>;
    fn set(&mut self, key: &ConfigKey, value: String);
}

/// Cloneable in-memory store. Clones share the same map, so a caller can keep
/// a handle to inspect what the scheduler wrote.
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    values: Arc<Mutex<HashMap<ConfigKey, String>>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(self, key: ConfigKey, value: impl Into<String>) -> Self {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.into());
        self
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &ConfigKey) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&mut self, key: &ConfigKey, value: String) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), value);
    }
}
