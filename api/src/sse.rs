//! SSE decoding for the `/api/ai/*/stream` endpoints.
//!
//! Frames follow `event: <name>\ndata: <json>\n\n`. The decoder runs in a
//! spawned task feeding an [`EventStream`]; it reassembles frames across
//! arbitrary read boundaries, ignores `:` keep-alive comments, skips events
//! whose data fails to parse, treats a server `error` event as terminal,
//! and hands the `done` payload back as the stream's terminal value.

use crate::common::ChunkChannel;
use crate::common::EventStream;
use crate::common::StreamChunk;
use crate::common::StreamEvent;
use crate::common::StreamOutcome;
use crate::error::ApiError;
use curator_client::StreamResponse;
use curator_client::TransportError;
use eventsource_stream::Eventsource;
use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    text: String,
    #[serde(default)]
    channel: ChunkChannel,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    code: String,
    message: String,
    #[serde(default)]
    retryable: bool,
}

pub(crate) fn spawn_event_stream(
    stream_response: StreamResponse,
    idle_grace: Duration,
    cancel: CancellationToken,
) -> EventStream {
    let (tx_event, rx_event) = mpsc::channel::<Result<StreamEvent, ApiError>>(1600);
    tokio::spawn(async move {
        process_sse(stream_response.bytes, tx_event, idle_grace, cancel).await;
    });
    EventStream { rx_event }
}

pub async fn process_sse<S>(
    stream: S,
    tx_event: mpsc::Sender<Result<StreamEvent, ApiError>>,
    idle_grace: Duration,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<bytes::Bytes, TransportError>> + Unpin,
{
    let mut stream = stream.eventsource();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = tx_event.send(Err(ApiError::Aborted)).await;
                return;
            }
            polled = timeout(idle_grace, stream.next()) => polled,
        };

        let sse = match next {
            // Slow generation is normal: keep waiting, stay responsive to
            // the cancel token above.
            Err(_) => {
                trace!("no SSE data within idle grace; still waiting");
                continue;
            }
            Ok(None) => {
                // Server closed the stream without a done event; resolve to
                // the empty-but-valid result.
                let _ = tx_event
                    .send(Ok(StreamEvent::Done(StreamOutcome::default())))
                    .await;
                return;
            }
            Ok(Some(Err(e))) => {
                let err = if cancel.is_cancelled() {
                    ApiError::Aborted
                } else {
                    ApiError::Stream(e.to_string())
                };
                let _ = tx_event.send(Err(err)).await;
                return;
            }
            Ok(Some(Ok(sse))) => sse,
        };

        trace!("SSE event {}: {}", sse.event, sse.data);

        match sse.event.as_str() {
            // `message` is the SSE default when a frame carries no event
            // name; some providers emit chunks that way.
            "chunk" | "message" => match serde_json::from_str::<ChunkPayload>(&sse.data) {
                Ok(payload) => {
                    let chunk = StreamChunk {
                        text: payload.text,
                        channel: payload.channel,
                    };
                    if tx_event.send(Ok(StreamEvent::Chunk(chunk))).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    debug!("skipping malformed chunk event: {err}, data: {}", sse.data);
                }
            },
            "done" => {
                let outcome = match serde_json::from_str::<StreamOutcome>(&sse.data) {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        debug!("malformed done payload: {err}, data: {}", sse.data);
                        StreamOutcome::default()
                    }
                };
                let _ = tx_event.send(Ok(StreamEvent::Done(outcome))).await;
                return;
            }
            "error" => {
                // Terminal: stop consuming immediately.
                let err = match serde_json::from_str::<ErrorPayload>(&sse.data) {
                    Ok(payload) => ApiError::Server {
                        code: payload.code,
                        message: payload.message,
                        retryable: payload.retryable,
                    },
                    Err(_) => ApiError::Stream(sse.data),
                };
                let _ = tx_event.send(Err(err)).await;
                return;
            }
            other => {
                debug!("ignoring unknown SSE event: {other}");
            }
        }
    }
}

/// Drains an [`EventStream`], handing each chunk to `on_chunk` and
/// returning the terminal [`StreamOutcome`].
///
/// `on_chunk` may return [`ControlFlow::Break`] to stop early: the cancel
/// token is fired (tearing down the reader) and whatever terminal result
/// has been collected so far is returned — possibly the empty default.
pub async fn collect_stream<F>(
    mut stream: EventStream,
    cancel: &CancellationToken,
    mut on_chunk: F,
) -> Result<StreamOutcome, ApiError>
where
    F: FnMut(&StreamChunk) -> ControlFlow<()> + Send,
{
    let mut terminal: Option<StreamOutcome> = None;
    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Chunk(chunk) => {
                if on_chunk(&chunk).is_break() {
                    cancel.cancel();
                    break;
                }
            }
            StreamEvent::Done(outcome) => {
                terminal = Some(outcome);
                break;
            }
        }
    }
    Ok(terminal.unwrap_or_default())
}
