//! Dependency resolution against the registry and installed libraries
//!
//! Resolution checks one level of declared dependencies. Problems with them
//! are returned as data in a [`ResolutionResult`]; the only error is
//! [`PluginError::PluginNotFound`] for the plugin being resolved.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::descriptor::PluginDescriptor;
use crate::registry::PluginRegistry;
use crate::version::{Version, VersionConstraint};
use crate::{PluginError, PluginResult};

/// Source of installed library versions
pub trait LibraryVersionProvider: Send + Sync {
    /// Installed version of `name`, or `None` when it is not installed
    fn get_version(&self, name: &str) -> Option<Version>;
}

impl<F> LibraryVersionProvider for F
where
    F: Fn(&str) -> Option<Version> + Send + Sync,
{
    fn get_version(&self, name: &str) -> Option<Version> {
        self(name)
    }
}

/// Fixed table of library versions
#[derive(Debug, Clone, Default)]
pub struct StaticLibraryVersions {
    versions: HashMap<String, Version>,
}

impl StaticLibraryVersions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, version: Version) -> Self {
        self.versions.insert(name.into(), version);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, version: Version) {
        self.versions.insert(name.into(), version);
    }

    /// Build from `name -> version string` pairs, failing on the first bad version
    pub fn from_strings<'a>(
        entries: impl IntoIterator<Item = (&'a String, &'a String)>,
    ) -> PluginResult<Self> {
        let versions = entries
            .into_iter()
            .map(|(name, raw)| Ok((name.clone(), Version::parse(raw)?)))
            .collect::<PluginResult<HashMap<_, _>>>()?;
        Ok(Self { versions })
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl LibraryVersionProvider for StaticLibraryVersions {
    fn get_version(&self, name: &str) -> Option<Version> {
        self.versions.get(name).cloned()
    }
}

/// A dependency that is present at the wrong version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMismatch {
    pub required: String,
    pub found: String,
}

/// Problems found for one side (required or optional) of a dependency spec
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReport {
    pub missing_plugins: BTreeSet<String>,
    pub missing_libraries: BTreeSet<String>,
    pub incompatible_plugins: BTreeMap<String, VersionMismatch>,
    pub incompatible_libraries: BTreeMap<String, VersionMismatch>,
    pub invalid_specs: BTreeMap<String, String>,
}

impl DependencyReport {
    pub fn is_clean(&self) -> bool {
        self.missing_plugins.is_empty()
            && self.missing_libraries.is_empty()
            && self.incompatible_plugins.is_empty()
            && self.incompatible_libraries.is_empty()
            && self.invalid_specs.is_empty()
    }
}

/// Outcome of resolving one plugin's dependencies
///
/// Computed fresh on every call and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub plugin_id: String,
    pub version: Version,
    pub satisfied: bool,
    pub missing_plugins: BTreeSet<String>,
    pub missing_libraries: BTreeSet<String>,
    pub incompatible_plugins: BTreeMap<String, VersionMismatch>,
    pub incompatible_libraries: BTreeMap<String, VersionMismatch>,
    /// Keyed by dependency name. Each reason starts with `plugin:` or
    /// `library:`; a plugin and a library sharing a name and both invalid
    /// get one entry with both reasons joined by `; `.
    pub invalid_specs: BTreeMap<String, String>,
    /// Informational only; never affects `satisfied`
    pub optional: DependencyReport,
}

impl ResolutionResult {
    fn new(descriptor: &PluginDescriptor, required: DependencyReport, optional: DependencyReport) -> Self {
        let satisfied = required.is_clean();
        let DependencyReport {
            missing_plugins,
            missing_libraries,
            incompatible_plugins,
            incompatible_libraries,
            invalid_specs,
        } = required;

        Self {
            plugin_id: descriptor.id.clone(),
            version: descriptor.version.clone(),
            satisfied,
            missing_plugins,
            missing_libraries,
            incompatible_plugins,
            incompatible_libraries,
            invalid_specs,
            optional,
        }
    }

    pub fn has_missing(&self) -> bool {
        !self.missing_plugins.is_empty() || !self.missing_libraries.is_empty()
    }

    pub fn has_incompatible(&self) -> bool {
        !self.incompatible_plugins.is_empty() || !self.incompatible_libraries.is_empty()
    }

    pub fn has_invalid_specs(&self) -> bool {
        !self.invalid_specs.is_empty()
    }
}

/// Evaluates a plugin's declared dependencies
#[derive(Clone)]
pub struct DependencyResolver {
    registry: PluginRegistry,
    libraries: Arc<dyn LibraryVersionProvider>,
}

impl std::fmt::Debug for DependencyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyResolver")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl DependencyResolver {
    pub fn new(registry: PluginRegistry, libraries: Arc<dyn LibraryVersionProvider>) -> Self {
        Self { registry, libraries }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Resolve the declared dependencies of `plugin_id`
    ///
    /// Reads a single consistent view of the registry; plugins registered
    /// while this runs are not seen.
    pub async fn resolve(&self, plugin_id: &str) -> PluginResult<ResolutionResult> {
        let plugins = self.registry.snapshot().await;
        let descriptor = plugins
            .get(plugin_id)
            .ok_or_else(|| PluginError::PluginNotFound(plugin_id.to_string()))?;

        let deps = &descriptor.dependencies;
        let lookup_plugin = |id: &str| {
            plugins
                .get(id)
                .filter(|d| d.enabled)
                .map(|d| d.version.clone())
        };
        let lookup_library = |name: &str| self.libraries.get_version(name);

        let mut required = DependencyReport::default();
        check_side(
            &deps.plugins,
            lookup_plugin,
            &mut required.missing_plugins,
            &mut required.incompatible_plugins,
            &mut required.invalid_specs,
            DependencyKind::Plugin,
        );
        check_side(
            &deps.libraries,
            lookup_library,
            &mut required.missing_libraries,
            &mut required.incompatible_libraries,
            &mut required.invalid_specs,
            DependencyKind::Library,
        );

        let mut optional = DependencyReport::default();
        check_side(
            &deps.optional.plugins,
            lookup_plugin,
            &mut optional.missing_plugins,
            &mut optional.incompatible_plugins,
            &mut optional.invalid_specs,
            DependencyKind::Plugin,
        );
        check_side(
            &deps.optional.libraries,
            lookup_library,
            &mut optional.missing_libraries,
            &mut optional.incompatible_libraries,
            &mut optional.invalid_specs,
            DependencyKind::Library,
        );

        let result = ResolutionResult::new(descriptor, required, optional);
        info!(
            plugin = %result.plugin_id,
            version = %result.version,
            satisfied = result.satisfied,
            missing = result.missing_plugins.len() + result.missing_libraries.len(),
            incompatible = result.incompatible_plugins.len() + result.incompatible_libraries.len(),
            invalid = result.invalid_specs.len(),
            "Resolved plugin dependencies"
        );
        Ok(result)
    }
}

#[derive(Debug, Clone, Copy)]
enum DependencyKind {
    Plugin,
    Library,
}

impl DependencyKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Plugin => "plugin",
            Self::Library => "library",
        }
    }
}

/// Check one map of `name -> constraint` against a version lookup
///
/// An unparsable constraint is recorded only as an invalid spec; the
/// dependency is not additionally reported as missing or incompatible.
fn check_side(
    declared: &BTreeMap<String, String>,
    lookup: impl Fn(&str) -> Option<Version>,
    missing: &mut BTreeSet<String>,
    incompatible: &mut BTreeMap<String, VersionMismatch>,
    invalid: &mut BTreeMap<String, String>,
    kind: DependencyKind,
) {
    for (name, raw) in declared {
        let constraint = match VersionConstraint::parse(raw) {
            Ok(constraint) => constraint,
            Err(e) => {
                debug!(dependency = %name, kind = kind.as_str(), constraint = %raw, error = %e, "Invalid dependency spec");
                let reason = format!("{}: {}", kind.as_str(), e);
                invalid
                    .entry(name.clone())
                    .and_modify(|existing| {
                        existing.push_str("; ");
                        existing.push_str(&reason);
                    })
                    .or_insert(reason);
                continue;
            }
        };

        match lookup(name) {
            None => {
                debug!(dependency = %name, "Dependency missing");
                missing.insert(name.clone());
            }
            Some(found) if !constraint.matches(&found) => {
                debug!(
                    dependency = %name,
                    required = %constraint,
                    found = %found,
                    "Dependency version incompatible"
                );
                incompatible.insert(
                    name.clone(),
                    VersionMismatch {
                        required: constraint.to_string(),
                        found: found.to_string(),
                    },
                );
            }
            Some(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DependencySpec;

    fn descriptor(id: &str, version: &str, deps: DependencySpec) -> PluginDescriptor {
        PluginDescriptor::new(id, Version::parse(version).unwrap()).with_dependencies(deps)
    }

    fn resolver(registry: &PluginRegistry, libs: StaticLibraryVersions) -> DependencyResolver {
        DependencyResolver::new(registry.clone(), Arc::new(libs))
    }

    #[tokio::test]
    async fn test_no_dependencies_is_satisfied() {
        let registry = PluginRegistry::from_descriptors([descriptor(
            "solo",
            "1.0.0",
            DependencySpec::new(),
        )]);
        let result = resolver(&registry, StaticLibraryVersions::new())
            .resolve("solo")
            .await
            .unwrap();

        assert!(result.satisfied);
        assert!(!result.has_missing());
        assert!(!result.has_incompatible());
        assert!(!result.has_invalid_specs());
    }

    #[tokio::test]
    async fn test_unknown_plugin_is_fatal() {
        let registry = PluginRegistry::new();
        let err = resolver(&registry, StaticLibraryVersions::new())
            .resolve("ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::PluginNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_incompatible_plugin_version() {
        let registry = PluginRegistry::from_descriptors([
            descriptor(
                "main",
                "1.0.0",
                DependencySpec::new().require_plugin("dep", ">=1.0.0"),
            ),
            descriptor("dep", "0.5.0", DependencySpec::new()),
        ]);
        let result = resolver(&registry, StaticLibraryVersions::new())
            .resolve("main")
            .await
            .unwrap();

        assert!(!result.satisfied);
        assert_eq!(
            result.incompatible_plugins,
            BTreeMap::from([(
                "dep".to_string(),
                VersionMismatch {
                    required: ">=1.0.0".to_string(),
                    found: "0.5.0".to_string(),
                }
            )])
        );
        assert!(result.missing_plugins.is_empty());
    }

    #[tokio::test]
    async fn test_missing_plugin() {
        let registry = PluginRegistry::from_descriptors([descriptor(
            "main",
            "1.0.0",
            DependencySpec::new().require_plugin("dep", ">=1.0.0"),
        )]);
        let result = resolver(&registry, StaticLibraryVersions::new())
            .resolve("main")
            .await
            .unwrap();

        assert!(!result.satisfied);
        assert_eq!(result.missing_plugins, BTreeSet::from(["dep".to_string()]));
        assert!(result.incompatible_plugins.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_dependency_counts_as_missing() {
        let mut dep = descriptor("dep", "1.2.0", DependencySpec::new());
        dep.enabled = false;
        let registry = PluginRegistry::from_descriptors([
            descriptor(
                "main",
                "1.0.0",
                DependencySpec::new().require_plugin("dep", ">=1.0.0"),
            ),
            dep,
        ]);
        let result = resolver(&registry, StaticLibraryVersions::new())
            .resolve("main")
            .await
            .unwrap();

        assert!(result.missing_plugins.contains("dep"));
    }

    #[tokio::test]
    async fn test_library_checks() {
        let registry = PluginRegistry::from_descriptors([descriptor(
            "main",
            "1.0.0",
            DependencySpec::new()
                .require_library("present", ">=1.0.0, <2.0.0")
                .require_library("old", ">=3.0.0")
                .require_library("absent", ">=0.1.0"),
        )]);
        let libs = StaticLibraryVersions::new()
            .with("present", Version::new(1, 4, 2))
            .with("old", Version::new(2, 9, 0));
        let result = resolver(&registry, libs).resolve("main").await.unwrap();

        assert!(!result.satisfied);
        assert_eq!(result.missing_libraries, BTreeSet::from(["absent".to_string()]));
        assert_eq!(result.incompatible_libraries["old"].found, "2.9.0");
        assert!(!result.incompatible_libraries.contains_key("present"));
    }

    #[tokio::test]
    async fn test_invalid_spec_is_not_also_missing() {
        let registry = PluginRegistry::from_descriptors([descriptor(
            "main",
            "1.0.0",
            DependencySpec::new()
                .require_plugin("ghost", "~>1.0")
                .require_library("lib", "not-a-version"),
        )]);
        let result = resolver(&registry, StaticLibraryVersions::new())
            .resolve("main")
            .await
            .unwrap();

        assert!(!result.satisfied);
        assert!(result.invalid_specs.contains_key("ghost"));
        assert!(result.invalid_specs.contains_key("lib"));
        assert!(!result.missing_plugins.contains("ghost"));
        assert!(!result.incompatible_plugins.contains_key("ghost"));
        assert!(!result.missing_libraries.contains("lib"));
    }

    #[tokio::test]
    async fn test_invalid_specs_tagged_by_dependency_kind() {
        let registry = PluginRegistry::from_descriptors([descriptor(
            "main",
            "1.0.0",
            DependencySpec::new()
                .require_plugin("shared", "~>1.0")
                .require_library("shared", "about 2")
                .require_plugin("codec", ">=1.0.0")
                .require_library("codec", "latest"),
        )]);
        let result = resolver(&registry, StaticLibraryVersions::new())
            .resolve("main")
            .await
            .unwrap();

        let shared = &result.invalid_specs["shared"];
        assert!(shared.starts_with("plugin: "), "{shared}");
        assert!(shared.contains("; library: "), "{shared}");

        assert!(result.missing_plugins.contains("codec"));
        assert!(result.invalid_specs["codec"].starts_with("library: "));
        assert!(!result.missing_libraries.contains("codec"));
    }

    #[tokio::test]
    async fn test_optional_dependencies_never_affect_satisfied() {
        let registry = PluginRegistry::from_descriptors([
            descriptor(
                "main",
                "1.0.0",
                DependencySpec::new()
                    .optional_plugin("nice-to-have", ">=1.0.0")
                    .optional_plugin("old", ">=2.0.0")
                    .optional_library("broken", "??"),
            ),
            descriptor("old", "1.0.0", DependencySpec::new()),
        ]);
        let result = resolver(&registry, StaticLibraryVersions::new())
            .resolve("main")
            .await
            .unwrap();

        assert!(result.satisfied);
        assert!(result.optional.missing_plugins.contains("nice-to-have"));
        assert!(result.optional.incompatible_plugins.contains_key("old"));
        assert!(result.optional.invalid_specs.contains_key("broken"));
        assert!(result.invalid_specs.is_empty());
    }

    #[tokio::test]
    async fn test_closure_provider() {
        let registry = PluginRegistry::from_descriptors([descriptor(
            "main",
            "1.0.0",
            DependencySpec::new().require_library("tokio", ">=1.0.0"),
        )]);
        let provider = |name: &str| (name == "tokio").then(|| Version::new(1, 43, 0));
        let result = DependencyResolver::new(registry, Arc::new(provider))
            .resolve("main")
            .await
            .unwrap();
        assert!(result.satisfied);
    }

    #[tokio::test]
    async fn test_resolution_sees_registry_changes() {
        let registry = PluginRegistry::from_descriptors([descriptor(
            "main",
            "1.0.0",
            DependencySpec::new().require_plugin("dep", ">=1.0.0"),
        )]);
        let resolver = resolver(&registry, StaticLibraryVersions::new());
        assert!(!resolver.resolve("main").await.unwrap().satisfied);

        registry
            .register(descriptor("dep", "1.1.0", DependencySpec::new()))
            .await;
        assert!(resolver.resolve("main").await.unwrap().satisfied);
    }

    #[test]
    fn test_static_versions_from_strings() {
        let raw = BTreeMap::from([
            ("serde".to_string(), "1.0.200".to_string()),
            ("tokio".to_string(), "1.43.0".to_string()),
        ]);
        let libs = StaticLibraryVersions::from_strings(&raw).unwrap();
        assert_eq!(libs.len(), 2);
        assert_eq!(libs.get_version("serde"), Some(Version::new(1, 0, 200)));

        let bad = BTreeMap::from([("x".to_string(), "latest".to_string())]);
        assert!(StaticLibraryVersions::from_strings(&bad).is_err());
    }
}
