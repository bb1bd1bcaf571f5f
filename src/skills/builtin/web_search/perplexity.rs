//! Perplexity Sonar API provider.
//!
//! Calls `POST https://api.perplexity.ai/chat/completions` with an
//! OpenAI-compatible request and Bearer token authentication. The model's
//! answer becomes the response answer; `search_results` (or bare
//! citations) become the result list.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{SearchProvider, SearchResponse, SearchResult};

const COMPLETIONS_URL: &str = "https://api.perplexity.ai/chat/completions";

// ── Perplexity API types ─────────────────────────────────

#[derive(Serialize)]
struct PerplexityRequest<'a> {
    model: &'a str,
    messages: Vec<PerplexityMessage<'a>>,
}

#[derive(Serialize)]
struct PerplexityMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
pub(super) struct PerplexityApiResponse {
    pub choices: Vec<PerplexityChoice>,
    pub citations: Option<Vec<String>>,
    pub search_results: Option<Vec<PerplexitySearchResult>>,
}

#[derive(Deserialize)]
pub(super) struct PerplexityChoice {
    pub message: PerplexityChoiceMessage,
}

#[derive(Deserialize)]
pub(super) struct PerplexityChoiceMessage {
    pub content: String,
}

#[derive(Deserialize)]
pub(super) struct PerplexitySearchResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: Option<String>,
}

impl From<PerplexityApiResponse> for SearchResponse {
    fn from(pplx: PerplexityApiResponse) -> Self {
        let answer = pplx.choices.into_iter().next().map(|c| c.message.content);

        // Prefer structured results; fall back to bare citation URLs.
        let results = if let Some(search_results) = pplx.search_results {
            search_results
                .into_iter()
                .map(|r| SearchResult {
                    title: r.title,
                    url: r.url,
                    snippet: r.snippet.unwrap_or_default(),
                })
                .collect()
        } else if let Some(citations) = pplx.citations {
            citations
                .into_iter()
                .enumerate()
                .map(|(i, url)| SearchResult {
                    title: format!("Source {}", i + 1),
                    url,
                    snippet: String::new(),
                })
                .collect()
        } else {
            vec![]
        };

        SearchResponse { answer, results }
    }
}

// ── PerplexityProvider ───────────────────────────────────

pub(super) struct PerplexityProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl PerplexityProvider {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl SearchProvider for PerplexityProvider {
    async fn search(&self, query: &str) -> anyhow::Result<SearchResponse> {
        let request = PerplexityRequest {
            model: &self.model,
            messages: vec![PerplexityMessage {
                role: "user",
                content: query,
            }],
        };

        let response = self
            .client
            .post(COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Perplexity API returned {status}: {body}");
        }

        let pplx: PerplexityApiResponse = response.json().await?;
        Ok(pplx.into())
    }

    fn provider_name(&self) -> &str {
        "perplexity"
    }
}
