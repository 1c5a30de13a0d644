//! Service discovery seam

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

/// Service type bidders register under
pub const BIDDER_SERVICE: &str = "bidder";

/// Resolves a service type to the addresses currently offering it
pub trait Discovery: Send + Sync {
    fn resolve(&self, service_type: &str) -> BTreeSet<String>;
}

/// In-memory directory, shareable between the component that registers
/// services and the one that resolves them
#[derive(Clone, Default)]
pub struct StaticDirectory {
    entries: Arc<RwLock<BTreeMap<String, BTreeSet<String>>>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, service_type: &str, address: impl Into<String>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(service_type.to_string())
            .or_default()
            .insert(address.into());
    }

    pub fn deregister(&self, service_type: &str, address: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(addresses) = entries.get_mut(service_type) {
            addresses.remove(address);
            if addresses.is_empty() {
                entries.remove(service_type);
            }
        }
    }

    /// Remove `address` from every service type
    pub fn deregister_all(&self, address: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, addresses| {
            addresses.remove(address);
            !addresses.is_empty()
        });
    }
}

impl Discovery for StaticDirectory {
    fn resolve(&self, service_type: &str) -> BTreeSet<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(service_type)
            .cloned()
            .unwrap_or_default()
    }
}
