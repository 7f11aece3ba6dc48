//! Plugin loading gated on dependency resolution

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::capability::Capability;
use crate::config::PluginsConfig;
use crate::descriptor::PluginDescriptor;
use crate::resolver::{DependencyResolver, ResolutionResult};
use crate::{PluginError, PluginResult};

/// Builds a plugin's capability object
pub trait CapabilityFactory: Send + Sync {
    fn create(&self, descriptor: &PluginDescriptor) -> PluginResult<Arc<dyn Capability>>;
}

impl<F> CapabilityFactory for F
where
    F: Fn(&PluginDescriptor) -> PluginResult<Arc<dyn Capability>> + Send + Sync,
{
    fn create(&self, descriptor: &PluginDescriptor) -> PluginResult<Arc<dyn Capability>> {
        self(descriptor)
    }
}

/// Instantiates capabilities for registered plugins
///
/// Every successful [`PluginLoader::load`] builds a new capability object;
/// nothing is cached here.
pub struct PluginLoader {
    resolver: DependencyResolver,
    factories: HashMap<String, Arc<dyn CapabilityFactory>>,
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.factories.keys().collect();
        ids.sort();
        f.debug_struct("PluginLoader")
            .field("resolver", &self.resolver)
            .field("factories", &ids)
            .finish()
    }
}

impl PluginLoader {
    pub fn new(resolver: DependencyResolver) -> Self {
        Self {
            resolver,
            factories: HashMap::new(),
        }
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    /// Register the factory for `plugin_id`, replacing any previous one
    pub fn register_factory(
        &mut self,
        plugin_id: impl Into<String>,
        factory: impl CapabilityFactory + 'static,
    ) {
        self.factories.insert(plugin_id.into(), Arc::new(factory));
    }

    /// Load with dependency checking enabled
    pub async fn load_checked(&self, plugin_id: &str) -> PluginResult<Arc<dyn Capability>> {
        self.load(plugin_id, true).await
    }

    /// Load using the configured dependency-check setting
    pub async fn load_configured(
        &self,
        plugin_id: &str,
        config: &PluginsConfig,
    ) -> PluginResult<Arc<dyn Capability>> {
        self.load(plugin_id, config.check_dependencies).await
    }

    /// Load a plugin's capability
    ///
    /// With `check_dependencies` set, unsatisfied dependencies fail the load.
    /// When several kinds of problem are present the error reports them in
    /// the order invalid spec, missing, incompatible. Passing `false` skips
    /// resolution entirely.
    pub async fn load(
        &self,
        plugin_id: &str,
        check_dependencies: bool,
    ) -> PluginResult<Arc<dyn Capability>> {
        let descriptor = self
            .resolver
            .registry()
            .get(plugin_id)
            .await
            .ok_or_else(|| PluginError::PluginNotFound(plugin_id.to_string()))?;

        if !descriptor.enabled {
            return Err(PluginError::PluginDisabled(plugin_id.to_string()));
        }

        if check_dependencies {
            let resolution = self.resolver.resolve(plugin_id).await?;
            if !resolution.satisfied {
                return Err(dependency_error(resolution));
            }
        } else {
            warn!(plugin = %plugin_id, "Loading plugin without dependency check");
        }

        let factory = self
            .factories
            .get(plugin_id)
            .ok_or_else(|| PluginError::FactoryMissing(plugin_id.to_string()))?;
        let capability = factory.create(&descriptor)?;

        info!(
            plugin = %plugin_id,
            version = %descriptor.version,
            checked = check_dependencies,
            "Loaded plugin"
        );
        Ok(capability)
    }
}

fn dependency_error(resolution: ResolutionResult) -> PluginError {
    let ResolutionResult {
        plugin_id,
        version,
        missing_plugins,
        missing_libraries,
        incompatible_plugins,
        incompatible_libraries,
        invalid_specs,
        ..
    } = resolution;
    let version = version.to_string();

    if !invalid_specs.is_empty() {
        PluginError::InvalidDependencySpecification {
            plugin_id,
            version,
            invalid_specs,
        }
    } else if !missing_plugins.is_empty() || !missing_libraries.is_empty() {
        PluginError::MissingDependency {
            plugin_id,
            version,
            missing_plugins,
            missing_libraries,
        }
    } else {
        PluginError::IncompatibleDependency {
            plugin_id,
            version,
            incompatible_plugins,
            incompatible_libraries,
        }
    }
}
