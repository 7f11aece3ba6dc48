//! Merge and zip over several [`ActionStream`]s
//!
//! `merge` drains inputs one after another in the given order; it does not
//! interleave. `zip` pulls one item from every input per step and stops as
//! soon as any input is exhausted.
//!
//! The composed stream gets its own cancellation token, checked once per step.

use std::fmt;
use std::str::FromStr;

use futures_util::StreamExt;
use futures_util::future::join_all;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::stream::ActionStream;
use crate::{PluginError, PluginResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionKind {
    Merge,
    Zip,
}

impl CompositionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Zip => "zip",
        }
    }
}

impl fmt::Display for CompositionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompositionKind {
    type Err = PluginError;

    fn from_str(s: &str) -> PluginResult<Self> {
        match s {
            "merge" => Ok(Self::Merge),
            "zip" => Ok(Self::Zip),
            other => Err(PluginError::StreamComposition(format!(
                "unknown composition '{}'",
                other
            ))),
        }
    }
}

/// Compose streams by a kind named by string (`merge`, `zip`)
pub fn compose_named(streams: Vec<ActionStream>, kind: &str) -> PluginResult<ActionStream> {
    compose(streams, kind.parse()?)
}

/// Compose `streams` into one
pub fn compose(streams: Vec<ActionStream>, kind: CompositionKind) -> PluginResult<ActionStream> {
    if streams.is_empty() {
        return Err(PluginError::StreamComposition(format!(
            "'{}' needs at least one input stream",
            kind
        )));
    }

    let id = format!("{}({})", kind, streams.len());
    let cancel = CancellationToken::new();
    debug!(
        kind = %kind,
        inputs = ?streams.iter().map(ActionStream::id).collect::<Vec<_>>(),
        "Building stream composition"
    );

    let output = match kind {
        CompositionKind::Merge => merge_stream(streams, cancel.clone()),
        CompositionKind::Zip => zip_stream(streams, cancel.clone()),
    };

    Ok(ActionStream::from_parts(id, cancel, output, 0))
}

type Boxed = futures_util::stream::BoxStream<'static, PluginResult<Value>>;

fn merge_stream(streams: Vec<ActionStream>, cancel: CancellationToken) -> Boxed {
    let output = async_stream::stream! {
        'inputs: for mut input in streams {
            loop {
                if cancel.is_cancelled() {
                    break 'inputs;
                }
                match input.next().await {
                    Some(Ok(value)) => {
                        yield Ok(value);
                    }
                    Some(Err(e)) => {
                        yield Err(e);
                        break 'inputs;
                    }
                    None => break,
                }
            }
        }
    };
    output.boxed()
}

/// Inputs are pulled concurrently within a step; results keep input order.
fn zip_stream(mut streams: Vec<ActionStream>, cancel: CancellationToken) -> Boxed {
    let output = async_stream::stream! {
        'steps: while !cancel.is_cancelled() {
            let pulled = join_all(streams.iter_mut().map(|s| s.next())).await;

            let mut tuple = Vec::with_capacity(pulled.len());
            for item in pulled {
                match item {
                    Some(Ok(value)) => tuple.push(value),
                    Some(Err(e)) => {
                        yield Err(e);
                        break 'steps;
                    }
                    None => break 'steps,
                }
            }
            yield Ok(Value::Array(tuple));
        }
    };
    output.boxed()
}
