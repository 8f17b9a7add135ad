pub mod client;
pub mod reducer;

pub use client::{ChatClient, ClientEvent};
pub use reducer::Conversation;
