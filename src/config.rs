//! Configuration file and environment handling.
//!
//! Settings come from a TOML file (every section optional) and are then
//! overridden by the environment variables the service credentials are
//! usually provisioned under.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rag::{ChunkingConfig, EmbedderSpec, RerankerSpec, SearchParams, DEFAULT_BATCH_SIZE, RERANK_TIMEOUT};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Data directory not found")]
    DataDirNotFound,

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingSettings,
    pub rerank: RerankSettings,
    pub retrieval: RetrievalSettings,
    pub llm: LlmSettings,
    pub web_search: WebSearchSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Overrides the platform data directory
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            timeout_secs: 60,
        }
    }
}

impl EmbeddingSettings {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn spec(&self) -> EmbedderSpec<'_> {
        EmbedderSpec {
            api_key: &self.api_key,
            base_url: &self.base_url,
            model: &self.model,
            batch_size: self.batch_size,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSettings {
    /// Empty disables reranking
    pub api_key: String,
    /// Full URL of the rerank endpoint
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.siliconflow.cn/v1/rerank".to_string(),
            model: "BAAI/bge-reranker-v2-m3".to_string(),
            timeout_secs: RERANK_TIMEOUT.as_secs(),
        }
    }
}

impl RerankSettings {
    pub fn spec(&self) -> RerankerSpec<'_> {
        RerankerSpec {
            api_key: &self.api_key,
            endpoint: &self.base_url,
            model: &self.model,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k_recall: usize,
    pub top_k_rerank: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        let params = SearchParams::default();
        Self {
            top_k_recall: params.top_k_recall,
            top_k_rerank: params.top_k_rerank,
        }
    }
}

impl RetrievalSettings {
    pub fn params(&self) -> SearchParams {
        SearchParams {
            top_k_recall: self.top_k_recall,
            top_k_rerank: self.top_k_rerank,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchSettings {
    /// Empty disables web search
    pub api_key: String,
    pub base_url: String,
    pub search_depth: String,
    pub max_results: usize,
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.tavily.com".to_string(),
            search_depth: "basic".to_string(),
            max_results: 3,
        }
    }
}

impl WebSearchSettings {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Environment variables that override file settings.
const ENV_OVERRIDES: &[(&str, fn(&mut Settings, String))] = &[
    ("EMBEDDING_API_KEY", |s, v| s.embedding.api_key = v),
    ("EMBEDDING_BASE_URL", |s, v| s.embedding.base_url = v),
    ("EMBEDDING_MODEL", |s, v| s.embedding.model = v),
    ("RERANK_API_KEY", |s, v| s.rerank.api_key = v),
    ("RERANK_BASE_URL", |s, v| s.rerank.base_url = v),
    ("RERANK_MODEL", |s, v| s.rerank.model = v),
    ("DEEPSEEK_API_KEY", |s, v| s.llm.api_key = v),
    ("DEEPSEEK_BASE_URL", |s, v| s.llm.base_url = v),
    ("TAVILY_API_KEY", |s, v| s.web_search.api_key = v),
];

impl Settings {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("knowbase").join("config.toml"))
    }

    /// Load settings from `path` (or the default location), apply environment
    /// overrides and validate. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);

        let mut settings = match path {
            Some(path) if path.exists() => {
                log::debug!("Loading settings from {:?}", path);
                Self::from_toml(&std::fs::read_to_string(&path)?)?
            }
            _ => Self::default(),
        };

        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from `lookup`; empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for (key, apply) in ENV_OVERRIDES {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                apply(self, value);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return Err(invalid("chunking.chunk_size", "must be greater than zero"));
        }
        if chunking.page_overlap >= chunking.chunk_size || chunking.text_overlap >= chunking.chunk_size {
            return Err(invalid("chunking", "overlap must be smaller than chunk_size"));
        }
        if self.embedding.batch_size == 0 {
            return Err(invalid("embedding.batch_size", "must be greater than zero"));
        }
        validate_retrieval(&self.retrieval.params())?;
        validate_temperature(self.llm.temperature)?;
        Ok(())
    }

    /// Data directory holding the vector store and conversation history
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_local_dir()
                .map(|p| p.join("knowbase"))
                .ok_or(ConfigError::DataDirNotFound),
        }
    }
}

/// Check recall/rerank sizes against the supported ranges.
pub fn validate_retrieval(params: &SearchParams) -> Result<()> {
    if !(10..=100).contains(&params.top_k_recall) {
        return Err(invalid("retrieval.top_k_recall", "must be between 10 and 100"));
    }
    if !(1..=10).contains(&params.top_k_rerank) {
        return Err(invalid("retrieval.top_k_rerank", "must be between 1 and 10"));
    }
    Ok(())
}

pub fn validate_temperature(temperature: f32) -> Result<()> {
    if !(0.0..=1.3).contains(&temperature) {
        return Err(invalid("llm.temperature", "must be between 0.0 and 1.3"));
    }
    Ok(())
}

fn invalid(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.chunking.chunk_size, 600);
        assert_eq!(settings.chunking.page_overlap, 50);
        assert_eq!(settings.chunking.text_overlap, 60);
        assert_eq!(settings.embedding.batch_size, 10);
        assert_eq!(settings.rerank.timeout_secs, 10);
        assert_eq!(settings.retrieval.params(), SearchParams { top_k_recall: 50, top_k_rerank: 5 });
        assert_eq!(settings.llm.model, "deepseek-chat");
        assert_eq!(settings.web_search.max_results, 3);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let settings = Settings::from_toml(
            r#"
            [embedding]
            api_key = "sk-embed"
            model = "bge-m3"

            [retrieval]
            top_k_rerank = 8
            "#,
        )
        .unwrap();

        assert_eq!(settings.embedding.api_key, "sk-embed");
        assert_eq!(settings.embedding.model, "bge-m3");
        assert_eq!(settings.embedding.batch_size, 10);
        assert_eq!(settings.retrieval.top_k_recall, 50);
        assert_eq!(settings.retrieval.top_k_rerank, 8);
        assert!(settings.embedding.is_configured());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut settings = Settings::from_toml("[rerank]\napi_key = \"from-file\"\n").unwrap();
        let env: HashMap<&str, &str> = [
            ("RERANK_API_KEY", "from-env"),
            ("TAVILY_API_KEY", "tvly"),
            ("EMBEDDING_MODEL", "  "),
        ]
        .into_iter()
        .collect();

        settings.apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(settings.rerank.api_key, "from-env");
        assert_eq!(settings.web_search.api_key, "tvly");
        assert_eq!(settings.embedding.model, "text-embedding-3-small");
    }

    #[test]
    fn test_validation_bounds() {
        let mut settings = Settings::default();
        settings.retrieval.top_k_recall = 5;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.retrieval.top_k_rerank = 11;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.chunking.page_overlap = 600;
        assert!(settings.validate().is_err());

        assert!(validate_temperature(1.4).is_err());
        assert!(validate_temperature(0.0).is_ok());
    }

    #[test]
    fn test_load_from_file_and_data_dir_override() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            format!("[storage]\ndata_dir = {:?}\n", dir.path().join("data").to_string_lossy()),
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.data_dir().unwrap(), dir.path().join("data"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        assert!(matches!(Settings::from_toml("[embedding\n"), Err(ConfigError::Toml(_))));
    }
}
