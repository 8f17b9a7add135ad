//! Relays completion deltas to the client as an event stream.
//!
//! A spawned task walks a small state machine and pushes `ServerEvent`s into
//! a channel; the HTTP response body drains that channel. Whatever happens
//! upstream, the channel ends with exactly one `Done` and then closes.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use clarify_shared::{encode_frame, ServerEvent};
use futures_util::StreamExt;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, warn};

use crate::llm::DeltaStream;

/// Text appended to the visible answer when the upstream stream fails.
pub const STREAM_ERROR_MARKER: &str = "\n[Stream error]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Streaming,
    Errored,
    Done,
}

/// How a relay run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySummary {
    pub tokens: usize,
    pub errored: bool,
    pub client_gone: bool,
}

/// Start relaying `deltas` on a background task and return the event receiver.
pub fn spawn_relay(deltas: DeltaStream) -> mpsc::UnboundedReceiver<ServerEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let summary = run_relay(deltas, tx).await;
        debug!(
            "Relay finished: tokens={} errored={} client_gone={}",
            summary.tokens, summary.errored, summary.client_gone
        );
    });
    rx
}

/// Drive the relay to completion. The sender is dropped on return, which
/// closes the channel.
pub async fn run_relay(
    mut deltas: DeltaStream,
    tx: mpsc::UnboundedSender<ServerEvent>,
) -> RelaySummary {
    let mut summary = RelaySummary {
        tokens: 0,
        errored: false,
        client_gone: false,
    };
    let mut state = RelayState::Streaming;

    loop {
        state = match state {
            RelayState::Streaming => match deltas.next().await {
                Some(Ok(delta)) => {
                    if !delta.is_empty() {
                        if tx.send(ServerEvent::token(delta)).is_err() {
                            warn!("Client disconnected mid-stream, dropping completion");
                            summary.client_gone = true;
                            return summary;
                        }
                        summary.tokens += 1;
                    }
                    RelayState::Streaming
                }
                Some(Err(e)) => {
                    error!("Upstream stream failed after {} tokens: {}", summary.tokens, e);
                    RelayState::Errored
                }
                None => RelayState::Done,
            },
            RelayState::Errored => {
                summary.errored = true;
                if tx.send(ServerEvent::token(STREAM_ERROR_MARKER)).is_err() {
                    summary.client_gone = true;
                }
                RelayState::Done
            }
            RelayState::Done => {
                if tx.send(ServerEvent::Done).is_err() {
                    summary.client_gone = true;
                }
                return summary;
            }
        };
    }
}

/// Wrap a relay receiver in a streaming `text/event-stream` response.
pub fn sse_response(rx: mpsc::UnboundedReceiver<ServerEvent>) -> Response {
    let frames = UnboundedReceiverStream::new(rx).filter_map(|event| async move {
        match encode_frame(&event) {
            Ok(frame) => Some(Ok::<_, Infallible>(frame)),
            Err(e) => {
                error!("Failed to encode {:?}: {}", event, e);
                None
            }
        }
    });

    (
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/event-stream; charset=utf-8"),
            ),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-cache, no-transform"),
            ),
            (header::CONNECTION, HeaderValue::from_static("keep-alive")),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}
