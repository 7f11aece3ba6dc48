//! Tessera Plugin System
//!
//! Provides dependency-checked plugin loading and streaming actions with:
//! - Plugin descriptors, manifests and an in-memory registry
//! - Version constraints and dependency resolution against plugins and libraries
//! - Load-order planning with cycle detection
//! - Capability loading through per-plugin factories
//! - Cancellable action streams with progress reporting
//! - Stream transformation (map, filter, batch) and composition (merge, zip)
//! - Checkpoints for resuming streams

pub mod capability;
pub mod checkpoint;
pub mod compose;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod graph;
pub mod loader;
pub mod manifest;
pub mod progress;
pub mod registry;
pub mod resolver;
pub mod stream;
pub mod transform;
pub mod version;

pub use error::{PluginError, PluginResult};


/// Re-export commonly used types
pub mod prelude {
    pub use crate::capability::{ActionExecutor, Capability, StreamSupport};
    pub use crate::checkpoint::{Checkpoint, CheckpointManager};
    pub use crate::compose::{CompositionKind, compose};
    pub use crate::config::Config;
    pub use crate::descriptor::{DependencySpec, PluginDescriptor};
    pub use crate::error::{PluginError, PluginResult};
    pub use crate::loader::{CapabilityFactory, PluginLoader};
    pub use crate::progress::{Progress, ProgressObserver, ProgressStatus};
    pub use crate::registry::PluginRegistry;
    pub use crate::resolver::{
        DependencyResolver, LibraryVersionProvider, ResolutionResult, StaticLibraryVersions,
    };
    pub use crate::stream::{ActionSource, ActionStream, StreamOptions};
    pub use crate::transform::{TransformKind, TransformParams, transform};
    pub use crate::version::{Version, VersionConstraint};
}
