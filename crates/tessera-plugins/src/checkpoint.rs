//! Checkpoints for resumable streaming actions
//!
//! A [`Checkpoint`] is a plain serializable value. Where it is stored is up
//! to the caller; this module only produces checkpoints and resumes from them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::capability::{Capability, StreamSupport, ensure_action};
use crate::stream::{ActionStream, StreamOptions};
use crate::{PluginError, PluginResult};

/// Snapshot of a stream's position and producer-defined state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    stream_id: String,
    position: u64,
    state: Map<String, Value>,
    captured_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Capture a checkpoint, timestamped now
    pub fn new(stream_id: impl Into<String>, position: u64, state: Map<String, Value>) -> Self {
        Self {
            stream_id: stream_id.into(),
            position,
            state,
            captured_at: Utc::now(),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Number of items already produced
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn to_json(&self) -> PluginResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> PluginResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Creates checkpoints and resumes streaming actions of one capability
#[derive(Clone)]
pub struct CheckpointManager {
    capability: Arc<dyn Capability>,
}

impl std::fmt::Debug for CheckpointManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointManager")
            .field("plugin_id", &self.capability.plugin_id())
            .finish()
    }
}

impl CheckpointManager {
    pub fn new(capability: Arc<dyn Capability>) -> Self {
        Self { capability }
    }

    pub fn create_checkpoint(
        &self,
        stream_id: impl Into<String>,
        position: u64,
        state: Map<String, Value>,
    ) -> Checkpoint {
        Checkpoint::new(stream_id, position, state)
    }

    /// Re-invoke `action` logically starting at `checkpoint.position()`
    ///
    /// The new stream keeps the checkpoint's stream id and its position
    /// counter starts at the checkpoint position.
    pub fn resume_from_checkpoint(
        &self,
        action: &str,
        checkpoint: &Checkpoint,
        params: Value,
        options: StreamOptions,
    ) -> PluginResult<ActionStream> {
        ensure_action(self.capability.as_ref(), action)?;

        match self
            .capability
            .resume_stream(action, params, checkpoint, &options)?
        {
            StreamSupport::Stream(source) => {
                info!(
                    plugin = %self.capability.plugin_id(),
                    action,
                    stream = %checkpoint.stream_id(),
                    position = checkpoint.position(),
                    "Resumed action stream from checkpoint"
                );
                Ok(ActionStream::drive(
                    checkpoint.stream_id().to_string(),
                    action.to_string(),
                    source,
                    options,
                    checkpoint.position(),
                ))
            }
            StreamSupport::Unsupported => Err(PluginError::StreamPersistence(format!(
                "action '{}' on plugin '{}' does not support resumption",
                action,
                self.capability.plugin_id()
            ))),
        }
    }
}
