use anyhow::{Context, Result};
use clarify_shared::{ChatMessage, ChatRequest, ErrorBody, FrameDecoder, ServerEvent};
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// What the UI learns about one in-flight turn, in order. `Closed` is
/// always the last event of a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The server chose to stream; tokens will follow.
    StreamStarted,
    Server(ServerEvent),
    Failed(String),
    Closed,
}

/// How a response body must be read, decided from its content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// One JSON object, read whole.
    Json,
    /// A `data:` frame stream, read incrementally.
    EventStream,
}

impl ResponseKind {
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.contains("application/json") {
            ResponseKind::Json
        } else {
            ResponseKind::EventStream
        }
    }
}

#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    chat_url: String,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            chat_url: format!("{}/api/chat", base_url.trim_end_matches('/')),
        }
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }

    /// Send the conversation on a background task and return the events of
    /// this turn.
    pub fn send(&self, messages: Vec<ChatMessage>) -> mpsc::UnboundedReceiver<ClientEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.clone();

        tokio::spawn(async move {
            if let Err(e) = client.run_turn(messages, &tx).await {
                error!("Chat request failed: {:#}", e);
                let _ = tx.send(ClientEvent::Failed(format!("{:#}", e)));
            }
            let _ = tx.send(ClientEvent::Closed);
        });

        rx
    }

    async fn run_turn(
        &self,
        messages: Vec<ChatMessage>,
        tx: &mpsc::UnboundedSender<ClientEvent>,
    ) -> Result<()> {
        info!("Sending {} messages to {}", messages.len(), self.chat_url);
        let response = self
            .http
            .post(&self.chat_url)
            .json(&ChatRequest { messages })
            .send()
            .await
            .context("could not reach chat server")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or(text);
            anyhow::bail!("server returned {}: {}", status, reason);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        match ResponseKind::from_content_type(&content_type) {
            ResponseKind::Json => {
                let event: ServerEvent = response
                    .json()
                    .await
                    .context("clarification payload was not a server event")?;
                let _ = tx.send(ClientEvent::Server(event));
            }
            ResponseKind::EventStream => {
                let _ = tx.send(ClientEvent::StreamStarted);
                read_event_stream(response.bytes_stream(), tx).await?;
            }
        }
        Ok(())
    }
}

/// Decode frames from `chunks` as they arrive and forward each event.
/// Returns once the body ends; events after `done` are not expected and are
/// ignored.
pub async fn read_event_stream<S, B, E>(
    chunks: S,
    tx: &mpsc::UnboundedSender<ClientEvent>,
) -> Result<()>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut chunks = std::pin::pin!(chunks);
    let mut decoder = FrameDecoder::new();
    let mut done = false;

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| anyhow::anyhow!("stream interrupted: {}", e))?;
        for event in decoder.push(chunk.as_ref()) {
            match event {
                Ok(_) if done => debug!("Ignoring event after done"),
                Ok(event) => {
                    done = matches!(event, ServerEvent::Done);
                    let _ = tx.send(ClientEvent::Server(event));
                }
                Err(e) => warn!("Skipping bad frame: {}", e),
            }
        }
    }

    if decoder.pending() > 0 {
        warn!("Stream ended with {} bytes of incomplete frame", decoder.pending());
    }
    Ok(())
}
