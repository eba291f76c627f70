use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use knowbase_lib::assistant::Assistant;
use knowbase_lib::chat_sessions::ChatSessionStorage;
use knowbase_lib::config::Settings;
use knowbase_lib::llm::OpenAiChatModel;
use knowbase_lib::rag::{load_embedder, load_reranker, Embedder, Reranker, VectorStore};
use knowbase_lib::web_search::{TavilyClient, WebSearchBackend};

/// Shared application state for CLI commands
pub struct App {
    pub settings: Settings,
    pub data_dir: PathBuf,
    pub store: Arc<VectorStore>,
}

impl App {
    /// Load settings and open the vector store
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let settings = Settings::load(config_path).context("Failed to load settings")?;
        let data_dir = settings.data_dir().context("Failed to get data directory")?;

        let store = VectorStore::open_in(&data_dir)
            .with_context(|| format!("Failed to open vector store in {}", data_dir.display()))?;

        Ok(Self {
            settings,
            data_dir,
            store: Arc::new(store),
        })
    }

    pub fn sessions(&self) -> Result<ChatSessionStorage> {
        ChatSessionStorage::new(self.data_dir.clone()).context("Failed to open conversation history")
    }

    pub fn embedder(&self) -> Result<Arc<Embedder>> {
        if !self.settings.embedding.is_configured() {
            bail!("No embedding API key configured. Set EMBEDDING_API_KEY or [embedding].api_key.");
        }
        load_embedder(&self.settings.embedding.spec()).context("Failed to create embedding client")
    }

    /// Reranker, or `None` when reranking is not configured
    pub fn reranker(&self) -> Result<Option<Arc<Reranker>>> {
        load_reranker(&self.settings.rerank.spec()).context("Failed to create rerank client")
    }

    fn web_search(&self) -> Result<Option<Arc<dyn WebSearchBackend>>> {
        let web = &self.settings.web_search;
        if !web.is_configured() {
            return Ok(None);
        }
        let client = TavilyClient::new(&web.api_key, &web.base_url, &web.search_depth, web.max_results)
            .context("Failed to create web search client")?;
        let backend: Arc<dyn WebSearchBackend> = Arc::new(client);
        Ok(Some(backend))
    }

    /// Assemble the full question-answering pipeline
    pub fn assistant(&self) -> Result<Assistant> {
        let llm = &self.settings.llm;
        let chat = OpenAiChatModel::new(&llm.api_key, &llm.base_url, &llm.model)
            .context("Failed to create chat client. Set DEEPSEEK_API_KEY or [llm].api_key.")?;

        Ok(Assistant::new(self.embedder()?, self.store.clone(), Arc::new(chat), self.sessions()?)
            .with_reranker(self.reranker()?)
            .with_web_search(self.web_search()?))
    }
}
