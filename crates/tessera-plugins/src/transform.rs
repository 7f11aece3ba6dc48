//! Map, filter and batch operators over an [`ActionStream`]
//!
//! The output stream shares the input's cancellation token and checks it
//! once per input item pulled.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tracing::debug;

use crate::stream::ActionStream;
use crate::{PluginError, PluginResult};

pub type TransformFn = Arc<dyn Fn(Value) -> PluginResult<Value> + Send + Sync>;
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    Map,
    Filter,
    Batch,
}

impl TransformKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Map => "map",
            Self::Filter => "filter",
            Self::Batch => "batch",
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransformKind {
    type Err = PluginError;

    fn from_str(s: &str) -> PluginResult<Self> {
        match s {
            "map" => Ok(Self::Map),
            "filter" => Ok(Self::Filter),
            "batch" => Ok(Self::Batch),
            other => Err(PluginError::StreamTransformation(format!(
                "unknown transformation '{}'",
                other
            ))),
        }
    }
}

/// Parameters for a transformation; only the field for the chosen kind is read
#[derive(Clone, Default)]
pub struct TransformParams {
    pub transform_fn: Option<TransformFn>,
    pub predicate: Option<Predicate>,
    pub batch_size: Option<usize>,
}

impl fmt::Debug for TransformParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformParams")
            .field("transform_fn", &self.transform_fn.is_some())
            .field("predicate", &self.predicate.is_some())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl TransformParams {
    pub fn map(f: impl Fn(Value) -> PluginResult<Value> + Send + Sync + 'static) -> Self {
        Self {
            transform_fn: Some(Arc::new(f)),
            ..Self::default()
        }
    }

    pub fn filter(predicate: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Some(Arc::new(predicate)),
            ..Self::default()
        }
    }

    pub fn batch(batch_size: usize) -> Self {
        Self {
            batch_size: Some(batch_size),
            ..Self::default()
        }
    }
}

/// Apply a transformation named by string (`map`, `filter`, `batch`)
pub fn transform_named(
    stream: ActionStream,
    kind: &str,
    params: TransformParams,
) -> PluginResult<ActionStream> {
    transform(stream, kind.parse()?, params)
}

/// Apply a transformation to `stream`
///
/// Missing or invalid parameters fail here, before anything is pulled.
pub fn transform(
    stream: ActionStream,
    kind: TransformKind,
    params: TransformParams,
) -> PluginResult<ActionStream> {
    let id = format!("{}/{}", stream.id(), kind);
    let cancel = stream.cancellation_token();
    debug!(input = %stream.id(), kind = %kind, "Building stream transformation");

    let output = match kind {
        TransformKind::Map => {
            let f = params.transform_fn.ok_or_else(|| missing_param(kind, "transform_fn"))?;
            map_stream(stream, f)
        }
        TransformKind::Filter => {
            let predicate = params.predicate.ok_or_else(|| missing_param(kind, "predicate"))?;
            filter_stream(stream, predicate)
        }
        TransformKind::Batch => {
            let size = params.batch_size.ok_or_else(|| missing_param(kind, "batch_size"))?;
            if size == 0 {
                return Err(PluginError::StreamTransformation(
                    "batch_size must be greater than zero".to_string(),
                ));
            }
            batch_stream(stream, size)
        }
    };

    Ok(ActionStream::from_parts(id, cancel, output, 0))
}

fn missing_param(kind: TransformKind, name: &str) -> PluginError {
    PluginError::StreamTransformation(format!("'{}' requires the '{}' parameter", kind, name))
}

type Boxed = futures_util::stream::BoxStream<'static, PluginResult<Value>>;

fn map_stream(mut input: ActionStream, f: TransformFn) -> Boxed {
    let cancel = input.cancellation_token();
    let output = async_stream::stream! {
        while !cancel.is_cancelled() {
            match input.next().await {
                Some(Ok(value)) => match f(value) {
                    Ok(mapped) => {
                        yield Ok(mapped);
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                },
                Some(Err(e)) => {
                    yield Err(e);
                    break;
                }
                None => break,
            }
        }
    };
    output.boxed()
}

fn filter_stream(mut input: ActionStream, predicate: Predicate) -> Boxed {
    let cancel = input.cancellation_token();
    let output = async_stream::stream! {
        while !cancel.is_cancelled() {
            match input.next().await {
                Some(Ok(value)) => {
                    if predicate(&value) {
                        yield Ok(value);
                    }
                }
                Some(Err(e)) => {
                    yield Err(e);
                    break;
                }
                None => break,
            }
        }
    };
    output.boxed()
}

/// Full batches as soon as they fill, then one trailing partial batch at end
///
/// A batch still being filled when the stream is cancelled or fails is
/// dropped.
fn batch_stream(mut input: ActionStream, size: usize) -> Boxed {
    let cancel = input.cancellation_token();
    let output = async_stream::stream! {
        let mut batch = Vec::with_capacity(size);
        while !cancel.is_cancelled() {
            match input.next().await {
                Some(Ok(value)) => {
                    batch.push(value);
                    if batch.len() == size {
                        yield Ok(Value::Array(std::mem::replace(
                            &mut batch,
                            Vec::with_capacity(size),
                        )));
                    }
                }
                Some(Err(e)) => {
                    yield Err(e);
                    break;
                }
                None => {
                    if !batch.is_empty() {
                        yield Ok(Value::Array(std::mem::take(&mut batch)));
                    }
                    break;
                }
            }
        }
    };
    output.boxed()
}
