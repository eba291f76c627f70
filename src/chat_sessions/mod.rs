//! Conversation history, persisted as one JSON file per conversation.

mod models;
mod storage;

pub use models::{
    ChatSession, ChatSessionSummary, SessionMessage, DEFAULT_TITLE, ROLE_ASSISTANT, ROLE_USER,
};
pub use storage::{ChatSessionStorage, SessionError};
