//! One question/answer turn: retrieval, optional web search, streamed
//! generation, and persistence of the exchange.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::chat_sessions::{ChatSessionStorage, SessionError, SessionMessage};
use crate::llm::{build_system_prompt, ChatMessage, ChatModel, ChatRequest, LlmError};
use crate::rag::{
    search_vectors, Embedder, EmbeddingError, Reranker, Retrieval, SearchParams, VectorStore,
};
use crate::web_search::{search_web, WebContext, WebSearchBackend};

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Chat failed: {0}")]
    Chat(#[from] LlmError),

    #[error("History error: {0}")]
    Session(#[from] SessionError),
}

pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Debug, Clone, Copy)]
pub struct AskOptions {
    pub params: SearchParams,
    pub web_search: bool,
    pub temperature: f32,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            params: SearchParams::default(),
            web_search: false,
            temperature: 0.3,
        }
    }
}

/// Result of one `ask` turn.
#[derive(Debug, Clone)]
pub struct Answer {
    pub session_id: Uuid,
    pub reply: String,
    pub retrieval: Retrieval,
    /// `None` when web search was not requested or not configured
    pub web: Option<WebContext>,
}

pub struct Assistant {
    embedder: Arc<Embedder>,
    store: Arc<VectorStore>,
    reranker: Option<Arc<Reranker>>,
    web: Option<Arc<dyn WebSearchBackend>>,
    chat: Arc<dyn ChatModel>,
    sessions: ChatSessionStorage,
}

impl Assistant {
    pub fn new(
        embedder: Arc<Embedder>,
        store: Arc<VectorStore>,
        chat: Arc<dyn ChatModel>,
        sessions: ChatSessionStorage,
    ) -> Self {
        Self {
            embedder,
            store,
            reranker: None,
            web: None,
            chat,
            sessions,
        }
    }

    pub fn with_reranker(mut self, reranker: Option<Arc<Reranker>>) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn with_web_search(mut self, web: Option<Arc<dyn WebSearchBackend>>) -> Self {
        self.web = web;
        self
    }

    pub fn sessions(&self) -> &ChatSessionStorage {
        &self.sessions
    }

    /// Answer `query` within conversation `session_id` (a new one when `None`).
    ///
    /// Text deltas go to `on_delta` as they stream in. The user turn and the
    /// reply, with the local context as its sources, are saved only once the
    /// reply is complete.
    pub fn ask(
        &self,
        session_id: Option<Uuid>,
        query: &str,
        options: &AskOptions,
        on_delta: &mut dyn FnMut(&str),
    ) -> Result<Answer> {
        let mut session = self.sessions.get_or_create(session_id.unwrap_or_else(Uuid::new_v4))?;

        let retrieval = self.retrieve(query, options.params)?;

        let web = match (&self.web, options.web_search) {
            (Some(backend), true) => Some(search_web(backend.as_ref(), query)),
            (None, true) => {
                log::warn!("Web search requested but no search API key is configured");
                None
            }
            _ => None,
        };
        let web_text = web.as_ref().map(|w| w.text.as_str()).unwrap_or("");

        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(build_system_prompt(&retrieval.context, web_text)),
                ChatMessage::user(query),
            ],
            temperature: options.temperature,
        };
        let reply = self.chat.stream_chat(&request, on_delta)?;

        session.messages.push(SessionMessage::user(query));
        session
            .messages
            .push(SessionMessage::assistant(reply.clone(), Some(retrieval.context.clone())));
        self.sessions.save_session(&mut session)?;

        Ok(Answer {
            session_id: session.id,
            reply,
            retrieval,
            web,
        })
    }

    /// Local retrieval; skipped while the store is empty or unreadable.
    fn retrieve(&self, query: &str, params: SearchParams) -> Result<Retrieval> {
        match self.store.count() {
            Ok(0) => {
                log::debug!("Knowledge base is empty, skipping retrieval");
                return Ok(Retrieval::empty());
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("Knowledge base unavailable, answering without local context: {}", e);
                return Ok(Retrieval::empty());
            }
        }

        Ok(search_vectors(
            &self.embedder,
            self.store.as_ref(),
            query,
            self.reranker.as_deref(),
            params,
        )?)
    }
}
