use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title given to a conversation before its first user message.
pub const DEFAULT_TITLE: &str = "New chat";

/// Characters of the first user message kept in a conversation title.
const TITLE_CHARS: usize = 20;

/// A full conversation with all its turns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: Uuid,
    pub title: String,
    pub messages: Vec<SessionMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Title derived from the first user message.
    pub fn derive_title(messages: &[SessionMessage]) -> String {
        messages
            .iter()
            .find(|m| m.role == ROLE_USER)
            .map(|m| {
                let head: String = m.content.chars().take(TITLE_CHARS).collect();
                format!("{}...", head)
            })
            .unwrap_or_else(|| DEFAULT_TITLE.to_string())
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// A lightweight summary for listing sessions without loading all messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSessionSummary {
    pub id: Uuid,
    pub title: String,
    pub message_count: usize,
    pub updated_at: DateTime<Utc>,
}

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

/// A single turn in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessage {
    pub role: String,
    pub content: String,
    /// Local context the answer was generated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SessionMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ROLE_USER.to_string(),
            content: content.into(),
            sources: None,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Option<String>) -> Self {
        Self {
            role: ROLE_ASSISTANT.to_string(),
            content: content.into(),
            sources: sources.filter(|s| !s.is_empty()),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_first_user_message() {
        let messages = vec![
            SessionMessage::assistant("hello", None),
            SessionMessage::user("What does chapter three say about entropy?"),
            SessionMessage::user("second"),
        ];
        assert_eq!(ChatSession::derive_title(&messages), "What does chapter th...");
        assert_eq!(ChatSession::derive_title(&[]), DEFAULT_TITLE);
    }

    #[test]
    fn test_title_truncates_by_character() {
        let messages = vec![SessionMessage::user("检索增强生成是什么？请详细解释一下它的工作原理和应用场景")];
        let title = ChatSession::derive_title(&messages);
        assert_eq!(title.chars().count(), 23);
    }

    #[test]
    fn test_empty_sources_are_dropped() {
        assert_eq!(SessionMessage::assistant("a", Some(String::new())).sources, None);
        let json = serde_json::to_value(SessionMessage::user("q")).unwrap();
        assert!(json.get("sources").is_none());
    }
}
