//! Plugin descriptors and their declared dependencies

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Optional dependencies; checked for reporting only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalDependencies {
    #[serde(default)]
    pub plugins: BTreeMap<String, String>,
    #[serde(default)]
    pub libraries: BTreeMap<String, String>,
}

impl OptionalDependencies {
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty() && self.libraries.is_empty()
    }
}

/// Declared plugin and library dependencies
///
/// Constraint strings are kept as written. They are parsed during
/// resolution so a malformed one is reported against the owning plugin
/// instead of failing descriptor construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    #[serde(default)]
    pub plugins: BTreeMap<String, String>,
    #[serde(default)]
    pub libraries: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "OptionalDependencies::is_empty")]
    pub optional: OptionalDependencies,
}

impl DependencySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_plugin(mut self, id: impl Into<String>, constraint: impl Into<String>) -> Self {
        self.plugins.insert(id.into(), constraint.into());
        self
    }

    pub fn require_library(
        mut self,
        name: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        self.libraries.insert(name.into(), constraint.into());
        self
    }

    pub fn optional_plugin(mut self, id: impl Into<String>, constraint: impl Into<String>) -> Self {
        self.optional.plugins.insert(id.into(), constraint.into());
        self
    }

    pub fn optional_library(
        mut self,
        name: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        self.optional.libraries.insert(name.into(), constraint.into());
        self
    }

    /// Number of required dependencies (plugins and libraries)
    pub fn required_count(&self) -> usize {
        self.plugins.len() + self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.required_count() == 0 && self.optional.is_empty()
    }
}

/// Plugin descriptor as produced by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub id: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub dependencies: DependencySpec,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PluginDescriptor {
    /// Create an enabled descriptor with no dependencies
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
            name: None,
            description: None,
            dependencies: DependencySpec::default(),
            enabled: true,
        }
    }

    pub fn with_dependencies(mut self, dependencies: DependencySpec) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_from_manifest_json() {
        let json = r#"{
            "id": "main",
            "version": "1.0.0",
            "dependencies": {
                "plugins": {"dep": ">=1.0.0"},
                "libraries": {"serde": ">=1.0.0, <2.0.0"},
                "optional": {"plugins": {"extra": "==0.3.0"}}
            }
        }"#;

        let descriptor: PluginDescriptor = serde_json::from_str(json).expect("deserialize");
        assert_eq!(descriptor.id, "main");
        assert_eq!(descriptor.version, Version::new(1, 0, 0));
        assert!(descriptor.enabled);
        assert_eq!(descriptor.dependencies.plugins["dep"], ">=1.0.0");
        assert_eq!(descriptor.dependencies.libraries["serde"], ">=1.0.0, <2.0.0");
        assert_eq!(descriptor.dependencies.optional.plugins["extra"], "==0.3.0");
        assert!(descriptor.dependencies.optional.libraries.is_empty());
        assert_eq!(descriptor.dependencies.required_count(), 2);
    }

    #[test]
    fn test_descriptor_without_dependencies() {
        let json = r#"{"id": "solo", "version": "0.1.0", "enabled": false}"#;
        let descriptor: PluginDescriptor = serde_json::from_str(json).expect("deserialize");
        assert!(descriptor.dependencies.is_empty());
        assert!(!descriptor.enabled);
        assert_eq!(descriptor.display_name(), "solo");
    }

    #[test]
    fn test_descriptor_rejects_bad_version() {
        let json = r#"{"id": "broken", "version": "one"}"#;
        assert!(serde_json::from_str::<PluginDescriptor>(json).is_err());
    }

    #[test]
    fn test_invalid_constraint_survives_deserialization() {
        let json = r#"{"id": "p", "version": "1.0.0", "dependencies": {"plugins": {"q": "~>bogus"}}}"#;
        let descriptor: PluginDescriptor = serde_json::from_str(json).expect("deserialize");
        assert_eq!(descriptor.dependencies.plugins["q"], "~>bogus");
    }

    #[test]
    fn test_builder_helpers() {
        let spec = DependencySpec::new()
            .require_plugin("a", ">=1.0.0")
            .require_library("tokio", ">=1.0.0")
            .optional_library("rayon", ">=1.0.0");
        let descriptor = PluginDescriptor::new("p", Version::new(2, 0, 0))
            .with_name("Pretty")
            .with_dependencies(spec);

        assert_eq!(descriptor.display_name(), "Pretty");
        assert_eq!(descriptor.dependencies.required_count(), 2);
        assert!(!descriptor.dependencies.optional.is_empty());
    }
}
