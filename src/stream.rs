//! Event streams and composable stream transforms.
//!
//! Streaming backends emit [`StreamEvent`]s. Plugins can contribute
//! [`StreamTransform`]s which are composed left-to-right in registration
//! order as a decorator chain over the outgoing stream, independent of
//! whichever backend ultimately drives it.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::types::{FinishReason, Usage};

/// One event on a streaming call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Emitted once when the backend accepted the call.
    StreamStart { model_id: String },
    /// Incremental text output.
    TextDelta { delta: String },
    /// Incremental tool-call arguments.
    ToolCallDelta {
        id: String,
        name: String,
        arguments_delta: String,
    },
    /// Incremental structured-object output.
    ObjectDelta { delta: serde_json::Value },
    /// Terminal event.
    Finish {
        reason: FinishReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    /// Backend-reported error carried in-band.
    Error { message: String },
}

/// Boxed stream of events, as returned by streaming invocation shapes.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, RelayError>> + Send>>;

/// A composable rewrite of an event stream.
pub trait StreamTransform: Send + Sync {
    fn name(&self) -> &str;

    /// Wrap the given stream, returning the transformed stream.
    fn transform(&self, stream: EventStream) -> EventStream;
}

/// Compose transforms left-to-right: the first transform sees the raw backend
/// stream, the last produces the stream handed to the caller.
pub fn apply_stream_transforms(
    transforms: &[Arc<dyn StreamTransform>],
    mut stream: EventStream,
) -> EventStream {
    for transform in transforms {
        stream = transform.transform(stream);
    }
    stream
}

/// Build an [`EventStream`] from a fixed sequence of events.
pub fn stream_from_events(events: Vec<StreamEvent>) -> EventStream {
    Box::pin(futures::stream::iter(events.into_iter().map(Ok)))
}

/// Coalesce consecutive text deltas until at least `min_chars` accumulate.
///
/// Backends that emit token-sized deltas cause excessive downstream churn;
/// this buffers them without reordering non-text events. Buffered text is
/// flushed before any non-text event and at end of stream.
pub fn coalesce_text(stream: EventStream, min_chars: usize) -> EventStream {
    use futures_util::StreamExt;

    Box::pin(async_stream::stream! {
        let mut stream = stream;
        let mut buffer = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(StreamEvent::TextDelta { delta }) => {
                    buffer.push_str(&delta);
                    if buffer.len() >= min_chars {
                        yield Ok(StreamEvent::TextDelta {
                            delta: std::mem::take(&mut buffer),
                        });
                    }
                }
                other => {
                    if !buffer.is_empty() {
                        yield Ok(StreamEvent::TextDelta {
                            delta: std::mem::take(&mut buffer),
                        });
                    }
                    yield other;
                }
            }
        }
        if !buffer.is_empty() {
            yield Ok(StreamEvent::TextDelta { delta: buffer });
        }
    })
}
