//! Tavily Search API provider.
//!
//! Calls `POST https://api.tavily.com/search` with the API key in the
//! request body. Returns structured results with an optional pre-built
//! answer.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{SearchProvider, SearchResponse, SearchResult};

const SEARCH_URL: &str = "https://api.tavily.com/search";

// ── Tavily API types ─────────────────────────────────────

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u8,
    include_answer: bool,
}

#[derive(Deserialize)]
pub(super) struct TavilyApiResponse {
    pub answer: Option<String>,
    pub results: Vec<TavilyApiResult>,
}

#[derive(Deserialize)]
pub(super) struct TavilyApiResult {
    pub title: String,
    pub url: String,
    pub content: String,
}

impl From<TavilyApiResponse> for SearchResponse {
    fn from(tavily: TavilyApiResponse) -> Self {
        SearchResponse {
            answer: tavily.answer,
            results: tavily
                .results
                .into_iter()
                .map(|r| SearchResult {
                    title: r.title,
                    url: r.url,
                    snippet: r.content,
                })
                .collect(),
        }
    }
}

// ── TavilyProvider ───────────────────────────────────────

pub(super) struct TavilyProvider {
    client: Client,
    api_key: String,
    max_results: u8,
}

impl TavilyProvider {
    pub fn new(api_key: &str, max_results: u8) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            max_results,
        }
    }
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    async fn search(&self, query: &str) -> anyhow::Result<SearchResponse> {
        let request = TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results: self.max_results,
            include_answer: true,
        };

        let response = self.client.post(SEARCH_URL).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Tavily API returned {status}: {body}");
        }

        let tavily: TavilyApiResponse = response.json().await?;
        Ok(tavily.into())
    }

    fn provider_name(&self) -> &str {
        "tavily"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "answer": "Rust is great.",
            "results": [
                {"title": "Rust", "url": "https://rust-lang.org", "content": "A language."}
            ]
        }"#;
        let parsed: TavilyApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.answer.as_deref(), Some("Rust is great."));
        assert_eq!(parsed.results.len(), 1);
    }

    /// answer → answer, content → snippet.
    #[test]
    fn test_mapping_to_search_response() {
        let tavily = TavilyApiResponse {
            answer: Some("Concise answer.".to_string()),
            results: vec![TavilyApiResult {
                title: "First".to_string(),
                url: "https://first.example".to_string(),
                content: "First content.".to_string(),
            }],
        };
        let response: SearchResponse = tavily.into();
        assert_eq!(response.answer.as_deref(), Some("Concise answer."));
        assert_eq!(response.results[0].snippet, "First content.");
    }

    #[test]
    fn test_mapping_no_answer() {
        let json = r#"{"answer": null, "results": []}"#;
        let parsed: TavilyApiResponse = serde_json::from_str(json).unwrap();
        let response: SearchResponse = parsed.into();
        assert!(response.answer.is_none());
        assert!(response.results.is_empty());
    }
}
