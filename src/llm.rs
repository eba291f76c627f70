//! Chat completion against OpenAI-compatible endpoints, plus prompt assembly.

use std::io::{BufRead, BufReader};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Chat service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Malformed stream event: {0}")]
    Stream(#[from] serde_json::Error),

    #[error("Invalid chat configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request envelope shared by chat model implementations.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

/// A streaming text generator.
pub trait ChatModel: Send + Sync {
    /// Generate a reply, passing each text delta to `on_delta` as it arrives.
    /// Returns the full reply.
    fn stream_chat(&self, request: &ChatRequest, on_delta: &mut dyn FnMut(&str)) -> Result<String, LlmError>;
}

pub struct OpenAiChatModel {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::InvalidConfig("missing chat API key".into()));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| LlmError::InvalidConfig("invalid chat API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

impl ChatModel for OpenAiChatModel {
    fn stream_chat(&self, request: &ChatRequest, on_delta: &mut dyn FnMut(&str)) -> Result<String, LlmError> {
        let body = CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            stream: true,
        };
        let resp = self.client.post(&self.endpoint).json(&body).send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(LlmError::Service {
                status: status.as_u16(),
                body,
            });
        }

        read_event_stream(BufReader::new(resp), on_delta)
    }
}

/// Consume a server-sent event stream of completion chunks.
fn read_event_stream(reader: impl BufRead, on_delta: &mut dyn FnMut(&str)) -> Result<String, LlmError> {
    let mut reply = String::new();

    for line in reader.lines() {
        let line = line?;
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            break;
        }
        if data.is_empty() {
            continue;
        }

        let chunk: StreamChunk = serde_json::from_str(data)?;
        for choice in chunk.choices {
            if let Some(delta) = choice.delta.content.filter(|d| !d.is_empty()) {
                on_delta(&delta);
                reply.push_str(&delta);
            }
        }
    }

    Ok(reply)
}

/// System prompt wrapping whatever local and web context was found.
pub fn build_system_prompt(local_context: &str, web_context: &str) -> String {
    let mut background = String::new();
    if !local_context.is_empty() {
        background.push_str(&format!("[Local knowledge]:\n{}\n\n", local_context));
    }
    if !web_context.is_empty() {
        background.push_str(&format!("[Web results]:\n{}\n\n", web_context));
    }

    format!(
        "Answer the question based on the background below. Always cite sources as [source: xxx]. \
         If the background does not contain the answer, say so.\n\n{}",
        background
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Replies with fixed deltas and remembers the last request.
    pub(crate) struct FakeChatModel {
        pub deltas: Vec<&'static str>,
        pub last_request: Mutex<Option<ChatRequest>>,
    }

    impl FakeChatModel {
        pub fn replying(deltas: Vec<&'static str>) -> Self {
            Self {
                deltas,
                last_request: Mutex::new(None),
            }
        }
    }

    impl ChatModel for FakeChatModel {
        fn stream_chat(&self, request: &ChatRequest, on_delta: &mut dyn FnMut(&str)) -> Result<String, LlmError> {
            *self.last_request.lock().unwrap() = Some(request.clone());
            for delta in &self.deltas {
                on_delta(delta);
            }
            Ok(self.deltas.concat())
        }
    }

    #[test]
    fn test_event_stream_collects_deltas() {
        let stream = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
                      data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
                      : keep-alive\n\n\
                      data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n\
                      data: [DONE]\n\n\
                      data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n";

        let mut seen = Vec::new();
        let reply = read_event_stream(Cursor::new(stream), &mut |d| seen.push(d.to_string())).unwrap();
        assert_eq!(reply, "Hello");
        assert_eq!(seen, vec!["Hel", "lo"]);
    }

    #[test]
    fn test_malformed_event_is_an_error() {
        let stream = "data: {not json}\n";
        assert!(matches!(
            read_event_stream(Cursor::new(stream), &mut |_| {}),
            Err(LlmError::Stream(_))
        ));
    }

    #[test]
    fn test_system_prompt_sections() {
        let prompt = build_system_prompt("LOCAL", "");
        assert!(prompt.contains("[Local knowledge]:\nLOCAL"));
        assert!(!prompt.contains("[Web results]"));

        let prompt = build_system_prompt("", "WEB");
        assert!(!prompt.contains("[Local knowledge]"));
        assert!(prompt.contains("[Web results]:\nWEB"));

        let prompt = build_system_prompt("", "");
        assert!(prompt.ends_with("say so.\n\n"));
    }

    #[test]
    fn test_missing_key_rejected() {
        assert!(OpenAiChatModel::new("", "https://api.deepseek.com", "deepseek-chat").is_err());
    }
}
