//! Vendor adapters for Trygr
//!
//! Every vendor integration implements [`VendorAdapter`]: a stable vendor
//! tag plus `perform_action`. The [`AdapterRegistry`] maps vendor tags to
//! adapter instances and is handed to the trigger engine at construction,
//! so the engine never special-cases a vendor.

pub mod kasa;

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, instrument};
use trygr_core::{ActionOutcome, Device, TriggerValue};

/// Capability every vendor integration exposes to the trigger engine
///
/// Implementations must not fail past this boundary: any internal error is
/// reported as [`ActionOutcome::no_op`] with an explanatory text. Repeating
/// an identical request must be safe.
#[async_trait]
pub trait VendorAdapter: Send + Sync {
    /// Vendor tag, matched against [`Device::vendor`]
    fn vendor(&self) -> &str;

    /// Perform `action` with `action_value` on `device`
    async fn perform_action(
        &self,
        device: &Device,
        action: &str,
        action_value: &TriggerValue,
    ) -> ActionOutcome;
}

/// Dispatch table from vendor tag to adapter
pub struct AdapterRegistry {
    adapters: DashMap<String, Arc<dyn VendorAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            adapters: DashMap::new(),
        }
    }

    /// Create a registry holding the given adapters
    pub fn from_adapters(adapters: impl IntoIterator<Item = Arc<dyn VendorAdapter>>) -> Self {
        let registry = Self::new();
        for adapter in adapters {
            registry.register(adapter);
        }
        registry
    }

    /// Register an adapter under its vendor tag
    ///
    /// Returns the adapter previously registered for that tag, if any.
    #[instrument(skip(self, adapter), fields(vendor = %adapter.vendor()))]
    pub fn register(&self, adapter: Arc<dyn VendorAdapter>) -> Option<Arc<dyn VendorAdapter>> {
        debug!("Registering vendor adapter");
        self.adapters.insert(adapter.vendor().to_string(), adapter)
    }

    /// Get the adapter for a vendor tag
    pub fn get(&self, vendor: &str) -> Option<Arc<dyn VendorAdapter>> {
        self.adapters.get(vendor).map(|a| Arc::clone(a.value()))
    }

    /// Check if a vendor tag has an adapter
    pub fn has_vendor(&self, vendor: &str) -> bool {
        self.adapters.contains_key(vendor)
    }

    /// Get all registered vendor tags, sorted
    pub fn vendors(&self) -> Vec<String> {
        let mut vendors: Vec<_> = self.adapters.iter().map(|a| a.key().clone()).collect();
        vendors.sort();
        vendors
    }

    /// Remove the adapter for a vendor tag
    pub fn unregister(&self, vendor: &str) -> bool {
        self.adapters.remove(vendor).is_some()
    }

    /// Get the number of registered adapters
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Check if no adapter is registered
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for AdapterRegistry
pub type SharedAdapterRegistry = Arc<AdapterRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(&'static str);

    #[async_trait]
    impl VendorAdapter for Echo {
        fn vendor(&self) -> &str {
            self.0
        }

        async fn perform_action(
            &self,
            device: &Device,
            action: &str,
            _action_value: &TriggerValue,
        ) -> ActionOutcome {
            ActionOutcome::applied(format!("{} {} {}", self.0, device.id, action))
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_vendor_tag() {
        let registry =
            AdapterRegistry::from_adapters([Arc::new(Echo("kasa")) as Arc<dyn VendorAdapter>]);

        let adapter = registry.get("kasa").unwrap();
        let outcome = adapter
            .perform_action(&Device::new("D1", "kasa"), "turnOn", &1.into())
            .await;

        assert_eq!(outcome.result_text, "kasa D1 turnOn");
        assert!(registry.get("ring").is_none());
    }

    #[test]
    fn test_register_replaces_and_unregister() {
        let registry = AdapterRegistry::new();

        assert!(registry.register(Arc::new(Echo("kasa"))).is_none());
        assert!(registry.register(Arc::new(Echo("kasa"))).is_some());
        registry.register(Arc::new(Echo("ecoflow")));

        assert_eq!(registry.vendors(), vec!["ecoflow", "kasa"]);
        assert!(registry.unregister("kasa"));
        assert!(!registry.unregister("kasa"));
        assert!(!registry.has_vendor("kasa"));
        assert_eq!(registry.len(), 1);
    }
}
