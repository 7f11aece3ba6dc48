//! Capability contract and action execution
//!
//! A capability exposes named actions. Every action has a sync form; an
//! action may additionally stream by returning [`StreamSupport::Stream`] from
//! [`Capability::execute_stream`]. The default returns
//! [`StreamSupport::Unsupported`], which [`ActionExecutor::stream`] reports as
//! [`PluginError::StreamingNotSupported`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::checkpoint::Checkpoint;
use crate::stream::{ActionSource, ActionStream, StreamOptions, new_stream_id};
use crate::{PluginError, PluginResult};

/// Whether an action can produce a stream
#[derive(Debug)]
pub enum StreamSupport {
    Stream(ActionSource),
    Unsupported,
}

/// The object a loaded plugin exposes
#[async_trait]
pub trait Capability: Send + Sync {
    /// Id of the plugin this capability belongs to
    fn plugin_id(&self) -> &str;

    /// Names of the actions this capability implements
    fn actions(&self) -> Vec<&str>;

    fn has_action(&self, action: &str) -> bool {
        self.actions().iter().any(|name| *name == action)
    }

    /// Run an action to completion and return its single result
    async fn execute_sync(&self, action: &str, params: Value) -> PluginResult<Value>;

    /// Start a streaming run of an action
    fn execute_stream(
        &self,
        _action: &str,
        _params: Value,
        _options: &StreamOptions,
    ) -> PluginResult<StreamSupport> {
        Ok(StreamSupport::Unsupported)
    }

    /// Restart a streaming action from a checkpoint
    ///
    /// Implementations interpret `checkpoint.position()` and
    /// `checkpoint.state()` to skip items already produced.
    fn resume_stream(
        &self,
        _action: &str,
        _params: Value,
        _checkpoint: &Checkpoint,
        _options: &StreamOptions,
    ) -> PluginResult<StreamSupport> {
        Ok(StreamSupport::Unsupported)
    }
}

pub(crate) fn ensure_action(capability: &dyn Capability, action: &str) -> PluginResult<()> {
    if capability.has_action(action) {
        Ok(())
    } else {
        Err(PluginError::PluginActionNotFound {
            plugin_id: capability.plugin_id().to_string(),
            action: action.to_string(),
        })
    }
}

/// Runs actions on one capability
#[derive(Clone)]
pub struct ActionExecutor {
    capability: Arc<dyn Capability>,
}

impl std::fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("plugin_id", &self.capability.plugin_id())
            .finish()
    }
}

impl ActionExecutor {
    pub fn new(capability: Arc<dyn Capability>) -> Self {
        Self { capability }
    }

    pub fn capability(&self) -> &Arc<dyn Capability> {
        &self.capability
    }

    /// Run the sync form of `action`
    pub async fn execute(&self, action: &str, params: Value) -> PluginResult<Value> {
        ensure_action(self.capability.as_ref(), action)?;
        debug!(plugin = %self.capability.plugin_id(), action, "Executing action");
        self.capability.execute_sync(action, params).await
    }

    /// Start the streaming form of `action`
    ///
    /// Fails immediately when the action does not exist or cannot stream.
    pub fn stream(
        &self,
        action: &str,
        params: Value,
        options: StreamOptions,
    ) -> PluginResult<ActionStream> {
        ensure_action(self.capability.as_ref(), action)?;

        match self.capability.execute_stream(action, params, &options)? {
            StreamSupport::Stream(source) => {
                let id = new_stream_id();
                info!(
                    plugin = %self.capability.plugin_id(),
                    action,
                    stream = %id,
                    total = ?source.total(),
                    "Started action stream"
                );
                Ok(ActionStream::drive(id, action.to_string(), source, options, 0))
            }
            StreamSupport::Unsupported => Err(PluginError::StreamingNotSupported {
                plugin_id: self.capability.plugin_id().to_string(),
                action: action.to_string(),
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Capabilities shared by unit tests

    use super::*;
    use serde_json::json;

    /// `count` streams 0..n (n from params, default 5) and supports resume;
    /// `echo` is sync only.
    pub struct Counter;

    impl Counter {
        fn limit(params: &Value) -> u64 {
            params.get("n").and_then(Value::as_u64).unwrap_or(5)
        }

        fn source(from: u64, to: u64) -> ActionSource {
            let items =
                futures_util::stream::iter((from..to).map(|i| Ok::<_, PluginError>(json!(i))));
            ActionSource::new(items).with_total(to)
        }
    }

    #[async_trait]
    impl Capability for Counter {
        fn plugin_id(&self) -> &str {
            "counter"
        }

        fn actions(&self) -> Vec<&str> {
            vec!["count", "echo"]
        }

        async fn execute_sync(&self, action: &str, params: Value) -> PluginResult<Value> {
            match action {
                "count" => Ok(json!((0..Self::limit(&params)).collect::<Vec<_>>())),
                "echo" => Ok(params),
                other => Err(PluginError::ExecutionFailed(format!("unknown action {other}"))),
            }
        }

        fn execute_stream(
            &self,
            action: &str,
            params: Value,
            _options: &StreamOptions,
        ) -> PluginResult<StreamSupport> {
            match action {
                "count" => Ok(StreamSupport::Stream(Self::source(0, Self::limit(&params)))),
                _ => Ok(StreamSupport::Unsupported),
            }
        }

        fn resume_stream(
            &self,
            action: &str,
            params: Value,
            checkpoint: &Checkpoint,
            _options: &StreamOptions,
        ) -> PluginResult<StreamSupport> {
            match action {
                "count" => Ok(StreamSupport::Stream(Self::source(
                    checkpoint.position(),
                    Self::limit(&params),
                ))),
                _ => Ok(StreamSupport::Unsupported),
            }
        }
    }
}
