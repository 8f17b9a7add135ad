// Drives ChatClient against a small axum server bound to an ephemeral port
// and checks the ClientEvent sequence of one turn for each response shape.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use clarify_cli::{ChatClient, ClientEvent, Conversation};
use clarify_shared::{encode_frame, ChatMessage, ChatRequest, ErrorBody, MessageRole, ServerEvent};
use futures_util::stream;
use std::convert::Infallible;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Infrastructure
// ---------------------------------------------------------------------------

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn drain(mut rx: mpsc::UnboundedReceiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn fix_it() -> Vec<ChatMessage> {
    vec![
        ChatMessage::new(MessageRole::System, "You are a helpful assistant."),
        ChatMessage::new(MessageRole::User, "fix it"),
    ]
}

async fn reject_empty() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: "No messages".to_string(),
        }),
    )
        .into_response()
}

async fn clarify() -> Json<ServerEvent> {
    Json(ServerEvent::Clarify {
        question: "Fix what specifically?".to_string(),
        rewrite: "Explain how to fix X".to_string(),
    })
}

/// Streams the latest user message back as two tokens, with every frame
/// boundary falling in the middle of a network chunk.
async fn echo_stream(Json(request): Json<ChatRequest>) -> Response {
    let latest = request
        .messages
        .last()
        .map(|msg| msg.content.clone())
        .unwrap_or_default();

    let mut wire = String::new();
    for event in [
        ServerEvent::token("echo: "),
        ServerEvent::token(latest),
        ServerEvent::Done,
    ] {
        wire.push_str(&encode_frame(&event).unwrap());
    }
    let chunks: Vec<Result<String, Infallible>> = wire
        .as_bytes()
        .chunks(7)
        .map(|chunk| Ok(String::from_utf8(chunk.to_vec()).unwrap()))
        .collect();

    (
        [(header::CONTENT_TYPE, "text/event-stream; charset=utf-8")],
        Body::from_stream(stream::iter(chunks)),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Turns
// ---------------------------------------------------------------------------

#[tokio::test]
async fn error_status_surfaces_server_error_text() {
    let base = serve(Router::new().route("/api/chat", post(reject_empty))).await;
    let events = drain(ChatClient::new(&base).send(fix_it())).await;

    assert_eq!(events.len(), 2, "events: {events:?}");
    match &events[0] {
        ClientEvent::Failed(reason) => {
            assert!(reason.contains("400"), "reason: {reason}");
            assert!(reason.contains("No messages"), "reason: {reason}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(events[1], ClientEvent::Closed);
}

#[tokio::test]
async fn error_becomes_notice_not_history() {
    let base = serve(Router::new().route("/api/chat", post(reject_empty))).await;
    let mut conversation = Conversation::new();
    let messages = conversation.submit("fix it").unwrap();

    for event in drain(ChatClient::new(&base).send(messages)).await {
        conversation.apply(event);
    }

    assert!(!conversation.in_flight());
    assert!(conversation.notice().unwrap().contains("No messages"));
    assert_eq!(conversation.messages().len(), 2);
    assert!(conversation
        .messages()
        .iter()
        .all(|msg| !msg.content.contains("No messages")));
}

#[tokio::test]
async fn json_response_is_read_as_single_clarification() {
    let base = serve(Router::new().route("/api/chat", post(clarify))).await;
    let events = drain(ChatClient::new(&base).send(fix_it())).await;

    assert_eq!(
        events,
        vec![
            ClientEvent::Server(ServerEvent::Clarify {
                question: "Fix what specifically?".into(),
                rewrite: "Explain how to fix X".into(),
            }),
            ClientEvent::Closed,
        ]
    );
}

#[tokio::test]
async fn event_stream_starts_before_first_token() {
    let base = serve(Router::new().route("/api/chat", post(echo_stream))).await;
    let events = drain(ChatClient::new(&base).send(fix_it())).await;

    assert_eq!(
        events,
        vec![
            ClientEvent::StreamStarted,
            ClientEvent::Server(ServerEvent::token("echo: ")),
            ClientEvent::Server(ServerEvent::token("fix it")),
            ClientEvent::Server(ServerEvent::Done),
            ClientEvent::Closed,
        ]
    );
}

#[tokio::test]
async fn streamed_turn_fills_assistant_placeholder() {
    let base = serve(Router::new().route("/api/chat", post(echo_stream))).await;
    let mut conversation = Conversation::new();
    let messages = conversation.submit("fix it").unwrap();

    for event in drain(ChatClient::new(&base).send(messages)).await {
        conversation.apply(event);
    }

    assert!(!conversation.in_flight());
    assert_eq!(conversation.notice(), None);
    assert_eq!(
        conversation.messages().last(),
        Some(&ChatMessage::new(MessageRole::Assistant, "echo: fix it"))
    );
}

#[tokio::test]
async fn unreachable_server_fails_the_turn() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let events = drain(ChatClient::new(&format!("http://{addr}")).send(fix_it())).await;
    assert_eq!(events.len(), 2, "events: {events:?}");
    assert!(matches!(&events[0], ClientEvent::Failed(reason) if reason.contains("could not reach")));
    assert_eq!(events[1], ClientEvent::Closed);
}
