use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use super::models::*;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session not found: {0}")]
    NotFound(Uuid),
}

type Result<T> = std::result::Result<T, SessionError>;

/// Storage for conversations (one JSON file per session)
pub struct ChatSessionStorage {
    sessions_dir: PathBuf,
}

impl ChatSessionStorage {
    /// Create a new chat session storage, creating the directory if needed
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        let sessions_dir = data_dir.join("history");
        fs::create_dir_all(&sessions_dir)?;
        Ok(Self { sessions_dir })
    }

    /// Get the file path for a session
    fn session_path(&self, id: Uuid) -> PathBuf {
        self.sessions_dir.join(format!("{}.json", id))
    }

    /// Save a session using atomic write (write to .tmp then rename).
    ///
    /// Sessions without messages are not written. The title is re-derived
    /// from the first user message on every save.
    pub fn save_session(&self, session: &mut ChatSession) -> Result<()> {
        if session.messages.is_empty() {
            return Ok(());
        }

        session.title = ChatSession::derive_title(&session.messages);
        session.updated_at = chrono::Utc::now();

        let path = self.session_path(session.id);
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(session)?;
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Load a full session by ID
    pub fn get_session(&self, id: Uuid) -> Result<ChatSession> {
        let path = self.session_path(id);
        if !path.exists() {
            return Err(SessionError::NotFound(id));
        }
        let content = fs::read_to_string(path)?;
        let session: ChatSession = serde_json::from_str(&content)?;
        Ok(session)
    }

    /// Load a session, or start a fresh one with that ID if none is stored
    pub fn get_or_create(&self, id: Uuid) -> Result<ChatSession> {
        match self.get_session(id) {
            Ok(session) => Ok(session),
            Err(SessionError::NotFound(_)) => Ok(ChatSession {
                id,
                ..ChatSession::new()
            }),
            Err(e) => Err(e),
        }
    }

    /// Messages of a session; empty if it does not exist
    pub fn load_messages(&self, id: Uuid) -> Result<Vec<SessionMessage>> {
        match self.get_session(id) {
            Ok(session) => Ok(session.messages),
            Err(SessionError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// List all sessions as lightweight summaries, sorted by updatedAt desc
    pub fn list_sessions(&self) -> Result<Vec<ChatSessionSummary>> {
        let mut summaries = Vec::new();

        if !self.sessions_dir.exists() {
            return Ok(summaries);
        }

        for entry in fs::read_dir(&self.sessions_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match fs::read_to_string(&path)
                    .map_err(SessionError::from)
                    .and_then(|c| serde_json::from_str::<ChatSession>(&c).map_err(SessionError::from))
                {
                    Ok(session) => summaries.push(ChatSessionSummary {
                        id: session.id,
                        title: session.title,
                        message_count: session.messages.len(),
                        updated_at: session.updated_at,
                    }),
                    Err(e) => log::warn!("Skipping unreadable session {:?}: {}", path, e),
                }
            }
        }

        // Sort by updated_at descending (most recent first)
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(summaries)
    }

    /// Delete a session by ID
    pub fn delete_session(&self, id: Uuid) -> Result<()> {
        let path = self.session_path(id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
