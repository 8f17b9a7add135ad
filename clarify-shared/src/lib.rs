use serde::{Deserialize, Serialize};

pub mod frame;

pub use frame::{encode_frame, FrameDecoder, FrameError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Request from client to server: the whole conversation so far, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

/// Body of every non-2xx JSON response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// What the classifier thinks of the latest user turn.
///
/// All fields are optional on the wire. A missing flag means no clarification
/// is needed; missing or blank text fields are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default)]
    pub clarifying_question: Option<String>,
    #[serde(default)]
    pub rewrite: Option<String>,
}

impl ClassificationResult {
    /// Parse classifier output field by field. Text that is not a JSON object
    /// means "no clarification needed"; a field of the wrong type is treated
    /// as absent without discarding the others.
    pub fn parse_lenient(text: &str) -> Self {
        let value: serde_json::Value = match serde_json::from_str(text.trim()) {
            Ok(value) => value,
            Err(_) => return Self::default(),
        };
        let Some(fields) = value.as_object() else {
            return Self::default();
        };
        let text_field = |key: &str| fields.get(key).and_then(|v| v.as_str()).map(str::to_string);

        Self {
            needs_clarification: fields
                .get("needs_clarification")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            clarifying_question: text_field("clarifying_question"),
            rewrite: text_field("rewrite"),
        }
    }

    pub fn question(&self) -> Option<&str> {
        non_blank(self.clarifying_question.as_deref())
    }

    pub fn rewrite(&self) -> Option<&str> {
        non_blank(self.rewrite.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

/// Events sent from server to client.
///
/// `Clarify` is only ever sent as a standalone JSON response. `Token` and
/// `Done` travel as frames of an event stream, and `Done` is always last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerEvent {
    Clarify { question: String, rewrite: String },
    Token { content: String },
    Done,
}

impl ServerEvent {
    pub fn token(content: impl Into<String>) -> Self {
        ServerEvent::Token {
            content: content.into(),
        }
    }

    /// Whether nothing may follow this event on the same response.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerEvent::Done | ServerEvent::Clarify { .. })
    }
}
