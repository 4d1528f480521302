//! Per-operation identifier remapping
//!
//! Pull, restore and import never reuse the identifiers of their source: every
//! entity gets a fresh id, and each cross-reference is rewritten through the
//! map built while the referenced entities were created.

use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct IdMap {
    entries: HashMap<String, String>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh id for `source_id` and remember the pairing
    pub fn mint(&mut self, source_id: &str) -> String {
        let fresh = Uuid::new_v4().to_string();
        self.entries.insert(source_id.to_string(), fresh.clone());
        fresh
    }

    pub fn record(&mut self, source_id: impl Into<String>, target_id: impl Into<String>) {
        self.entries.insert(source_id.into(), target_id.into());
    }

    pub fn resolve(&self, source_id: &str) -> Option<&str> {
        self.entries.get(source_id).map(String::as_str)
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.entries.contains_key(source_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
