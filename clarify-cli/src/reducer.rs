use clarify_shared::{ChatMessage, MessageRole, ServerEvent};
use tracing::debug;

use crate::client::ClientEvent;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const CLARIFY_PREFIX: &str = "Clarification needed: ";

/// Client-side conversation state, rebuilt from the server's responses.
///
/// Messages are only ever appended; the one mutation is growing the content
/// of the trailing assistant placeholder while a stream is being read.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    in_flight: bool,
    rewrite: Option<String>,
    notice: Option<String>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: vec![ChatMessage::new(MessageRole::System, DEFAULT_SYSTEM_PROMPT)],
            in_flight: false,
            rewrite: None,
            notice: None,
        }
    }

    /// Full history, system messages included. This is what gets sent.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Messages worth showing to the user.
    pub fn visible_messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages
            .iter()
            .filter(|msg| msg.role != MessageRole::System)
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Suggested restatement from the last clarification, if any.
    pub fn rewrite(&self) -> Option<&str> {
        self.rewrite.as_deref()
    }

    /// Transport problem from the last turn, if any.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Start a turn. Returns the conversation to send, or `None` if the
    /// input is blank or a turn is already running.
    pub fn submit(&mut self, input: &str) -> Option<Vec<ChatMessage>> {
        let content = input.trim();
        if content.is_empty() || self.in_flight {
            return None;
        }
        self.messages
            .push(ChatMessage::new(MessageRole::User, content));
        self.rewrite = None;
        self.notice = None;
        self.in_flight = true;
        Some(self.messages.clone())
    }

    pub fn apply(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::StreamStarted => self.begin_stream(),
            ClientEvent::Server(event) => self.apply_server_event(event),
            ClientEvent::Failed(reason) => self.notice = Some(reason),
            ClientEvent::Closed => self.finish(),
        }
    }

    /// Push the empty assistant message that tokens get appended to.
    pub fn begin_stream(&mut self) {
        self.messages
            .push(ChatMessage::new(MessageRole::Assistant, String::new()));
        self.in_flight = true;
    }

    pub fn apply_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Token { content } => match self.messages.last_mut() {
                Some(last) if last.role == MessageRole::Assistant => last.content.push_str(&content),
                _ => debug!("Token arrived with no assistant message to append to"),
            },
            ServerEvent::Done => self.in_flight = false,
            ServerEvent::Clarify { question, rewrite } => {
                self.messages.push(ChatMessage::new(
                    MessageRole::Assistant,
                    format!("{CLARIFY_PREFIX}{question}"),
                ));
                self.rewrite = Some(rewrite);
                self.in_flight = false;
            }
        }
    }

    /// The response is over, however it ended.
    pub fn finish(&mut self) {
        self.in_flight = false;
    }
}
