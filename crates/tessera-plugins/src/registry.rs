//! In-memory plugin registry
//!
//! Maps plugin id to [`PluginDescriptor`]. Clones of a registry share the
//! same map.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info};

use crate::descriptor::PluginDescriptor;
use crate::{PluginError, PluginResult};

/// Shared registry of plugin descriptors
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: Arc<RwLock<BTreeMap<String, PluginDescriptor>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from already-discovered descriptors
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = PluginDescriptor>) -> Self {
        let plugins = descriptors
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect::<BTreeMap<_, _>>();
        Self {
            plugins: Arc::new(RwLock::new(plugins)),
        }
    }

    /// Register a descriptor, replacing any existing one with the same id
    ///
    /// Returns the replaced descriptor, if any.
    pub async fn register(&self, descriptor: PluginDescriptor) -> Option<PluginDescriptor> {
        let id = descriptor.id.clone();
        let version = descriptor.version.to_string();
        let previous = self.plugins.write().await.insert(id.clone(), descriptor);

        match &previous {
            Some(old) => info!(
                plugin = %id,
                version = %version,
                previous = %old.version,
                "Replaced plugin registration"
            ),
            None => info!(plugin = %id, version = %version, "Registered plugin"),
        }

        previous
    }

    /// Remove a plugin from the registry
    pub async fn unregister(&self, id: &str) -> Option<PluginDescriptor> {
        let removed = self.plugins.write().await.remove(id);
        if removed.is_some() {
            info!(plugin = %id, "Unregistered plugin");
        }
        removed
    }

    pub async fn get(&self, id: &str) -> Option<PluginDescriptor> {
        self.plugins.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.plugins.read().await.contains_key(id)
    }

    pub async fn enable(&self, id: &str) -> PluginResult<()> {
        self.set_enabled(id, true).await
    }

    pub async fn disable(&self, id: &str) -> PluginResult<()> {
        self.set_enabled(id, false).await
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> PluginResult<()> {
        let mut plugins = self.plugins.write().await;
        let descriptor = plugins
            .get_mut(id)
            .ok_or_else(|| PluginError::PluginNotFound(id.to_string()))?;

        if descriptor.enabled != enabled {
            descriptor.enabled = enabled;
            debug!(plugin = %id, enabled, "Plugin enabled state changed");
        }
        Ok(())
    }

    /// Registered plugin ids in sorted order
    pub async fn ids(&self) -> Vec<String> {
        self.plugins.read().await.keys().cloned().collect()
    }

    /// Descriptors of all registered plugins in id order
    pub async fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.plugins.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.plugins.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.plugins.read().await.is_empty()
    }

    /// Hold a read view of the registry
    ///
    /// Writers wait until the guard is dropped, so everything read through it
    /// belongs to one consistent state.
    pub(crate) async fn snapshot(&self) -> RwLockReadGuard<'_, BTreeMap<String, PluginDescriptor>> {
        self.plugins.read().await
    }
}
