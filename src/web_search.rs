//! Live web search used to supplement local context.
//!
//! Failures never surface to the caller: they resolve to an empty context
//! marked as degraded so the answer can still be produced from local data.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebSearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search service returned {status}: {body}")]
    Service { status: u16, body: String },
}

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// A web search service.
pub trait WebSearchBackend: Send + Sync {
    fn search(&self, query: &str) -> Result<Vec<WebResult>, WebSearchError>;
}

/// Tavily search API client.
pub struct TavilyClient {
    client: Client,
    endpoint: String,
    api_key: String,
    search_depth: String,
    max_results: usize,
}

impl TavilyClient {
    pub fn new(
        api_key: &str,
        base_url: &str,
        search_depth: &str,
        max_results: usize,
    ) -> Result<Self, WebSearchError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/search", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            search_depth: search_depth.to_string(),
            max_results,
        })
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<WebResult>,
}

impl WebSearchBackend for TavilyClient {
    fn search(&self, query: &str) -> Result<Vec<WebResult>, WebSearchError> {
        let request = SearchRequest {
            api_key: &self.api_key,
            query,
            search_depth: &self.search_depth,
            max_results: self.max_results,
        };
        let resp = self.client.post(&self.endpoint).json(&request).send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(WebSearchError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SearchResponse = resp.json()?;
        Ok(parsed.results)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebSearchStatus {
    Found,
    /// The search ran but returned nothing
    NoResults,
    /// The search failed and was skipped
    Degraded { reason: String },
}

/// Formatted web context plus how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct WebContext {
    pub text: String,
    pub status: WebSearchStatus,
}

/// Search the web and render the hits as context blocks.
pub fn search_web(backend: &dyn WebSearchBackend, query: &str) -> WebContext {
    match backend.search(query) {
        Ok(results) if results.is_empty() => WebContext {
            text: String::new(),
            status: WebSearchStatus::NoResults,
        },
        Ok(results) => WebContext {
            text: format_web_results(&results),
            status: WebSearchStatus::Found,
        },
        Err(e) => {
            log::warn!("Web search failed: {}", e);
            WebContext {
                text: String::new(),
                status: WebSearchStatus::Degraded {
                    reason: e.to_string(),
                },
            }
        }
    }
}

fn format_web_results(results: &[WebResult]) -> String {
    results
        .iter()
        .map(|r| format!("[web: {}]({})\nsummary: {}", r.title, r.url, r.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) struct FakeWebSearch(pub std::result::Result<Vec<WebResult>, u16>);

    impl WebSearchBackend for FakeWebSearch {
        fn search(&self, _query: &str) -> Result<Vec<WebResult>, WebSearchError> {
            self.0.clone().map_err(|status| WebSearchError::Service {
                status,
                body: String::new(),
            })
        }
    }

    #[test]
    fn test_results_are_formatted() {
        let backend = FakeWebSearch(Ok(vec![
            WebResult {
                title: "Rust 2024".into(),
                url: "https://example.com/a".into(),
                content: "Edition notes".into(),
            },
            WebResult {
                title: "Cargo".into(),
                url: "https://example.com/b".into(),
                content: "Build tool".into(),
            },
        ]));

        let context = search_web(&backend, "rust");
        assert_eq!(context.status, WebSearchStatus::Found);
        assert_eq!(
            context.text,
            "[web: Rust 2024](https://example.com/a)\nsummary: Edition notes\n\n[web: Cargo](https://example.com/b)\nsummary: Build tool"
        );
    }

    #[test]
    fn test_failure_is_swallowed() {
        let context = search_web(&FakeWebSearch(Err(502)), "rust");
        assert!(context.text.is_empty());
        assert!(matches!(context.status, WebSearchStatus::Degraded { .. }));
    }

    #[test]
    fn test_no_results_is_not_degraded() {
        let context = search_web(&FakeWebSearch(Ok(vec![])), "rust");
        assert!(context.text.is_empty());
        assert_eq!(context.status, WebSearchStatus::NoResults);
    }

    #[test]
    fn test_response_parsing_ignores_extra_fields() {
        let body = r#"{"query":"q","results":[{"title":"T","url":"u","content":"c","score":0.9}],"response_time":0.4}"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].title, "T");
    }
}
