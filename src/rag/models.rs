//! Data models for RAG operations.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stored form of [`PageRef::NotApplicable`].
pub const PAGE_NOT_APPLICABLE: &str = "N/A";

/// Page provenance of a chunk.
///
/// Paginated formats (PDF) carry a 1-indexed page number; everything else is
/// explicitly marked as not applicable rather than left empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageRef {
    Number(NonZeroU32),
    NotApplicable,
}

impl PageRef {
    /// Page reference for a 1-indexed page number. `0` maps to `NotApplicable`.
    pub fn page(number: u32) -> Self {
        NonZeroU32::new(number)
            .map(PageRef::Number)
            .unwrap_or(PageRef::NotApplicable)
    }

    pub fn number(&self) -> Option<u32> {
        match self {
            PageRef::Number(n) => Some(n.get()),
            PageRef::NotApplicable => None,
        }
    }

    /// Human label used in rendered context blocks.
    pub fn label(&self) -> String {
        match self {
            PageRef::Number(n) => format!("page {}", n),
            PageRef::NotApplicable => "text".to_string(),
        }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageRef::Number(n) => write!(f, "{}", n),
            PageRef::NotApplicable => f.write_str(PAGE_NOT_APPLICABLE),
        }
    }
}

impl FromStr for PageRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == PAGE_NOT_APPLICABLE {
            return Ok(PageRef::NotApplicable);
        }
        s.parse::<NonZeroU32>()
            .map(PageRef::Number)
            .map_err(|_| format!("invalid page reference '{}'", s))
    }
}

impl Serialize for PageRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PageRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A span of document text with its provenance.
///
/// Chunks have no identity of their own; the vector store assigns an id when
/// the chunk is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    content: String,
    source: String,
    page: PageRef,
}

impl Chunk {
    /// Create a chunk. Returns `None` for empty content.
    pub fn new(content: impl Into<String>, source: impl Into<String>, page: PageRef) -> Option<Self> {
        let content = content.into();
        if content.is_empty() {
            return None;
        }
        Some(Self {
            content,
            source: source.into(),
            page,
        })
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn page(&self) -> PageRef {
        self.page
    }
}

/// A similarity-search hit from the vector store, or a reranked hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub content: String,
    pub source: String,
    pub page: PageRef,
    /// Similarity in `[0, 1]` after recall; relevance score after reranking.
    pub score: f32,
}

/// Chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window length in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive windows of one PDF page
    pub page_overlap: usize,
    /// Characters shared between consecutive windows of flowing text
    pub text_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 600,
            page_overlap: 50,
            text_overlap: 60,
        }
    }
}
