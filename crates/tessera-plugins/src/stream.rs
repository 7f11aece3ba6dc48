//! Cancellable, progress-reporting action streams
//!
//! An [`ActionStream`] is a single-consumer sequence of results produced by a
//! streaming action. Production is pull-driven: the producer does no work
//! until the consumer asks for the next item.
//!
//! Cancellation is cooperative. The token is checked before each item is
//! pulled from the producer; a producer stuck inside one item cannot be
//! interrupted.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::checkpoint::Checkpoint;
use crate::progress::{
    Progress, ProgressObserver, ProgressStatus, SharedObserver, percent_complete,
};
use crate::{PluginError, PluginResult};

/// Per-call options for a streaming action
#[derive(Clone)]
pub struct StreamOptions {
    pub cancel: CancellationToken,
    pub progress: Option<SharedObserver>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            cancel: CancellationToken::new(),
            progress: None,
        }
    }
}

impl std::fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOptions")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.progress = Some(Arc::new(observer));
        self
    }

    /// Forward a progress update to the observer, if any
    ///
    /// Producers without a known total can use this to report their own
    /// estimates.
    pub fn report(&self, progress: Progress) {
        if let Some(observer) = &self.progress {
            observer.on_progress(&progress);
        }
    }
}

/// What a capability hands back for a streaming action
pub struct ActionSource {
    items: BoxStream<'static, PluginResult<Value>>,
    total: Option<u64>,
}

impl ActionSource {
    pub fn new(items: impl Stream<Item = PluginResult<Value>> + Send + 'static) -> Self {
        Self {
            items: items.boxed(),
            total: None,
        }
    }

    /// Total item count of the whole action, used for percentages
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    /// A source over fixed values; the total is the number of values
    pub fn from_values(values: Vec<Value>) -> Self {
        let total = values.len() as u64;
        Self::new(futures_util::stream::iter(
            values.into_iter().map(Ok::<Value, PluginError>),
        ))
        .with_total(total)
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }
}

impl std::fmt::Debug for ActionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionSource")
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}

/// Single-consumer stream of action results
///
/// Terminates on exhaustion, cancellation or the first error. Cannot be
/// restarted; resume from a [`Checkpoint`] to get a new stream.
pub struct ActionStream {
    id: String,
    position: u64,
    cancel: CancellationToken,
    inner: BoxStream<'static, PluginResult<Value>>,
}

impl std::fmt::Debug for ActionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionStream")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ActionStream {
    /// Drive a producer with cancellation checks and progress reporting
    pub(crate) fn drive(
        id: String,
        label: String,
        source: ActionSource,
        options: StreamOptions,
        start: u64,
    ) -> Self {
        let ActionSource { mut items, total } = source;
        let StreamOptions { cancel, progress } = options;
        let token = cancel.clone();
        let stream_id = id.clone();

        let notify = move |progress_update: Progress| {
            if let Some(observer) = &progress {
                observer.on_progress(&progress_update);
            }
        };

        let stream = async_stream::stream! {
            let mut index = start;
            loop {
                if token.is_cancelled() {
                    debug!(stream = %stream_id, action = %label, position = index, "Stream cancelled");
                    notify(Progress::new(
                        None,
                        format!("{} cancelled after {} items", label, index),
                        ProgressStatus::Cancelled,
                    ));
                    break;
                }

                match items.next().await {
                    Some(Ok(value)) => {
                        notify(Progress::running(
                            total.map(|t| percent_complete(index, t)),
                            format!("{} produced item {}", label, index.saturating_add(1)),
                        ));
                        index = index.saturating_add(1);
                        yield Ok(value);
                    }
                    Some(Err(e)) => {
                        warn!(stream = %stream_id, action = %label, position = index, error = %e, "Stream failed");
                        notify(Progress::new(
                            None,
                            format!("{} failed: {}", label, e),
                            ProgressStatus::Failed,
                        ));
                        yield Err(e);
                        break;
                    }
                    None => {
                        debug!(stream = %stream_id, action = %label, items = index, "Stream exhausted");
                        notify(Progress::new(
                            Some(100.0),
                            format!("{} completed", label),
                            ProgressStatus::Completed,
                        ));
                        break;
                    }
                }
            }
        };

        Self::from_parts(id, cancel, stream.boxed(), start)
    }

    pub(crate) fn from_parts(
        id: String,
        cancel: CancellationToken,
        inner: BoxStream<'static, PluginResult<Value>>,
        start: u64,
    ) -> Self {
        Self {
            id,
            position: start,
            cancel,
            inner,
        }
    }

    /// A stream over fixed values with a fresh id and token
    ///
    /// Useful for feeding transformers and composers from plain data.
    pub fn from_values(values: Vec<Value>) -> Self {
        Self::drive(
            new_stream_id(),
            "values".to_string(),
            ActionSource::from_values(values),
            StreamOptions::default(),
            0,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of items yielded so far (plus the resume offset, if any)
    ///
    /// Saturates at `u64::MAX`.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Capture the current position together with producer state
    pub fn checkpoint(&self, state: Map<String, Value>) -> Checkpoint {
        Checkpoint::new(self.id.clone(), self.position, state)
    }

    /// Drain the stream, stopping at the first error
    pub async fn collect_values(mut self) -> PluginResult<Vec<Value>> {
        let mut values = Vec::new();
        while let Some(item) = self.next().await {
            values.push(item?);
        }
        Ok(values)
    }
}

impl Stream for ActionStream {
    type Item = PluginResult<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let poll = self.inner.as_mut().poll_next(cx);
        if let Poll::Ready(Some(Ok(_))) = &poll {
            self.position = self.position.saturating_add(1);
        }
        poll
    }
}

pub(crate) fn new_stream_id() -> String {
    Uuid::new_v4().to_string()
}
