//! Error types for the plugin system

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::resolver::VersionMismatch;

/// Result type alias using [`PluginError`]
pub type PluginResult<T> = Result<T, PluginError>;

/// Plugin system errors
///
/// Dependency problems found during resolution are data (see
/// [`crate::resolver::ResolutionResult`]); only [`crate::loader::PluginLoader`]
/// turns them into the `*Dependency*` variants below.
#[derive(Error, Debug)]
pub enum PluginError {
    // Registry errors (P001-P099)
    #[error("Plugin '{0}' not found in registry")]
    PluginNotFound(String),

    #[error("Plugin '{0}' is disabled")]
    PluginDisabled(String),

    #[error("No capability factory registered for plugin '{0}'")]
    FactoryMissing(String),

    // Version errors (P100-P199)
    #[error("Invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("Invalid version constraint '{input}': {reason}")]
    InvalidConstraint { input: String, reason: String },

    // Dependency errors (P200-P299)
    #[error(
        "Plugin '{plugin_id}' v{version} has missing dependencies (plugins: {}, libraries: {})",
        join(.missing_plugins),
        join(.missing_libraries)
    )]
    MissingDependency {
        plugin_id: String,
        version: String,
        missing_plugins: BTreeSet<String>,
        missing_libraries: BTreeSet<String>,
    },

    #[error(
        "Plugin '{plugin_id}' v{version} has incompatible dependencies (plugins: {}, libraries: {})",
        join_mismatches(.incompatible_plugins),
        join_mismatches(.incompatible_libraries)
    )]
    IncompatibleDependency {
        plugin_id: String,
        version: String,
        incompatible_plugins: BTreeMap<String, VersionMismatch>,
        incompatible_libraries: BTreeMap<String, VersionMismatch>,
    },

    #[error(
        "Plugin '{plugin_id}' v{version} declares invalid dependency specifications: {}",
        join_specs(.invalid_specs)
    )]
    InvalidDependencySpecification {
        plugin_id: String,
        version: String,
        invalid_specs: BTreeMap<String, String>,
    },

    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    // Action errors (P300-P399)
    #[error("Action '{action}' not found on plugin '{plugin_id}'")]
    PluginActionNotFound { plugin_id: String, action: String },

    #[error("Action '{action}' on plugin '{plugin_id}' does not support streaming")]
    StreamingNotSupported { plugin_id: String, action: String },

    #[error("Action execution failed: {0}")]
    ExecutionFailed(String),

    // Stream errors (P400-P499)
    #[error("Stream transformation failed: {0}")]
    StreamTransformation(String),

    #[error("Stream composition failed: {0}")]
    StreamComposition(String),

    #[error("Stream persistence failed: {0}")]
    StreamPersistence(String),

    // Manifest errors (P500-P599)
    #[error("Manifest invalid: {0}")]
    ManifestInvalid(String),

    #[error("Plugin IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PluginError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::PluginNotFound(_) => "P001",
            Self::PluginDisabled(_) => "P002",
            Self::FactoryMissing(_) => "P003",
            Self::InvalidVersion { .. } => "P100",
            Self::InvalidConstraint { .. } => "P101",
            Self::MissingDependency { .. } => "P200",
            Self::IncompatibleDependency { .. } => "P201",
            Self::InvalidDependencySpecification { .. } => "P202",
            Self::DependencyCycle(_) => "P203",
            Self::PluginActionNotFound { .. } => "P300",
            Self::StreamingNotSupported { .. } => "P301",
            Self::ExecutionFailed(_) => "P302",
            Self::StreamTransformation(_) => "P400",
            Self::StreamComposition(_) => "P401",
            Self::StreamPersistence(_) => "P402",
            Self::ManifestInvalid(_) => "P500",
            Self::Io(_) | Self::Serialization(_) => "P999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::PluginNotFound(_) => Some("tessera list".to_string()),
            Self::PluginDisabled(id) => Some(format!("Enable plugin '{}' before loading it", id)),
            Self::MissingDependency { plugin_id, .. } => Some(format!("tessera resolve {}", plugin_id)),
            Self::IncompatibleDependency { plugin_id, .. } => {
                Some(format!("tessera resolve {}", plugin_id))
            }
            Self::InvalidDependencySpecification { .. } => {
                Some("Use constraints like '>=1.2.0' or '>=1.0.0, <2.0.0'".to_string())
            }
            Self::DependencyCycle(_) => Some("tessera order".to_string()),
            _ => None,
        }
    }

    /// Whether this error was caused by unsatisfied dependencies
    pub fn is_dependency_error(&self) -> bool {
        matches!(
            self,
            Self::MissingDependency { .. }
                | Self::IncompatibleDependency { .. }
                | Self::InvalidDependencySpecification { .. }
        )
    }
}

fn join(items: &BTreeSet<String>) -> String {
    if items.is_empty() {
        return "none".to_string();
    }
    items.iter().cloned().collect::<Vec<_>>().join(", ")
}

fn join_mismatches(items: &BTreeMap<String, VersionMismatch>) -> String {
    if items.is_empty() {
        return "none".to_string();
    }
    items
        .iter()
        .map(|(name, m)| format!("{} requires {} found {}", name, m.required, m.found))
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_specs(items: &BTreeMap<String, String>) -> String {
    items
        .iter()
        .map(|(name, reason)| format!("{} ({})", name, reason))
        .collect::<Vec<_>>()
        .join(", ")
}
