use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clarify_shared::{ChatMessage, ChatRequest, ClassificationResult, MessageRole, ServerEvent};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::llm::CompletionGateway;
use crate::relay::{spawn_relay, sse_response};

pub const CLASSIFY_INSTRUCTION: &str = "You review the latest message a user sent to a chat assistant \
and decide whether it is too ambiguous to answer well. Reply with a single JSON object and nothing else, \
with exactly these fields: \"needs_clarification\" (boolean, true only if the request cannot be answered \
without more information), \"clarifying_question\" (string, one short question to ask the user, empty if \
not needed), \"rewrite\" (string, the user's request restated clearly and specifically).";

pub const CHAT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Be concise, accurate, and ask for clarification only if strictly needed.";

pub const FALLBACK_QUESTION: &str = "Could you clarify?";

const PLANNING_PREFIX: &str = "Rewritten intent: ";

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn CompletionGateway>,
}

pub fn build_router(gateway: Arc<dyn CompletionGateway>) -> Router {
    let state = AppState { gateway };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// POST /api/chat
///
/// Classifies the latest turn, then either answers with a single clarify
/// payload or streams the completion as `token` frames ending in `done`.
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = payload.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    let messages = request.messages;
    let Some(latest) = messages.last() else {
        return Err(AppError::InvalidRequest("No messages".to_string()));
    };
    info!("Chat request with {} messages", messages.len());

    let classification = classify(state.gateway.as_ref(), &latest.content).await;

    if classification.needs_clarification {
        let event = ServerEvent::Clarify {
            question: classification
                .question()
                .unwrap_or(FALLBACK_QUESTION)
                .to_string(),
            rewrite: classification
                .rewrite()
                .unwrap_or(&latest.content)
                .to_string(),
        };
        info!("Latest turn needs clarification, skipping completion");
        return Ok(Json(event).into_response());
    }

    let augmented = augment_messages(messages, classification.rewrite());
    let deltas = state.gateway.stream_completion(augmented).await?;
    Ok(sse_response(spawn_relay(deltas)))
}

/// Ask the gateway about `content`. Any failure, either of the call or of
/// decoding its reply, counts as "no clarification needed".
async fn classify(gateway: &dyn CompletionGateway, content: &str) -> ClassificationResult {
    match gateway.classify(CLASSIFY_INSTRUCTION, content).await {
        Ok(text) => {
            let result = ClassificationResult::parse_lenient(&text);
            info!(
                "Classification: needs_clarification={} rewrite={}",
                result.needs_clarification,
                result.rewrite().is_some()
            );
            result
        }
        Err(e) => {
            warn!("Classification call failed, continuing without it: {}", e);
            ClassificationResult::default()
        }
    }
}

/// System preamble, then the conversation verbatim, then the rewrite as
/// hidden planning context when there is one.
pub fn augment_messages(conversation: Vec<ChatMessage>, rewrite: Option<&str>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(conversation.len() + 2);
    messages.push(ChatMessage::new(MessageRole::System, CHAT_SYSTEM_PROMPT));
    messages.extend(conversation);
    if let Some(rewrite) = rewrite {
        messages.push(ChatMessage::new(
            MessageRole::Assistant,
            format!("{PLANNING_PREFIX}{rewrite}"),
        ));
    }
    messages
}
