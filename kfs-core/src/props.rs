//! Process-wide configuration properties
//!
//! A mutable table consulted by [`crate::S3Config`] between the overrides
//! map and the environment. Entries apply to every configuration created
//! afterwards in this process.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::RwLock;

static PROPERTIES: Lazy<RwLock<HashMap<String, String>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Set a property for the whole process.
pub fn set_property(name: impl Into<String>, value: impl Into<String>) {
    PROPERTIES
        .write()
        .expect("property table poisoned")
        .insert(name.into(), value.into());
}

/// Look up a property.
pub fn property(name: &str) -> Option<String> {
    PROPERTIES
        .read()
        .expect("property table poisoned")
        .get(name)
        .cloned()
}

/// Remove a property; no-op when absent.
pub fn remove_property(name: &str) {
    PROPERTIES
        .write()
        .expect("property table poisoned")
        .remove(name);
}
