//! Builtin skill: web search (`/search`).
//!
//! Queries a search provider and formats the results for chat. When
//! `summarize_results` is on and an LLM is wired in, the results are
//! first condensed into a short answer, with the raw results listed
//! below it.
//!
//! Supported providers:
//! - **Tavily** — dedicated search API with structured results
//! - **Perplexity** — Sonar models with web-grounded chat completions

mod perplexity;
mod tavily;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::WebSearchConfig;
use crate::llm::{CompletionOptions, LlmClient, Message};
use crate::skills::{Skill, SkillContext};

use perplexity::PerplexityProvider;
use tavily::TavilyProvider;

// ── Normalized types (provider-agnostic) ─────────────────

/// A single search result, normalized across all providers.
pub(super) struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Aggregated search response from any provider.
pub(super) struct SearchResponse {
    /// A pre-built answer, if the provider returns one.
    pub answer: Option<String>,
    pub results: Vec<SearchResult>,
}

// ── SearchProvider trait ─────────────────────────────────

/// Abstraction over web search backends. Each provider normalizes its
/// API response into a common `SearchResponse`.
#[async_trait]
pub(super) trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<SearchResponse>;

    /// The provider name (e.g. `"tavily"`, `"perplexity"`).
    fn provider_name(&self) -> &str;
}

// ── WebSearchSkill ───────────────────────────────────────

pub struct WebSearchSkill {
    provider: Box<dyn SearchProvider>,
    /// Summarizer; `None` disables the summary step regardless of config.
    llm: Option<Arc<dyn LlmClient>>,
    summarize_results: bool,
    max_summary_length: u32,
}

impl std::fmt::Debug for WebSearchSkill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSearchSkill")
            .field("provider", &self.provider.provider_name())
            .field("has_llm", &self.llm.is_some())
            .field("summarize_results", &self.summarize_results)
            .field("max_summary_length", &self.max_summary_length)
            .finish()
    }
}

impl WebSearchSkill {
    /// Creates the skill from configuration. The `provider` field picks
    /// the backend; an unknown provider is a startup error, caught in
    /// `main` before the agent connects.
    pub fn new(config: &WebSearchConfig, llm: Option<Arc<dyn LlmClient>>) -> anyhow::Result<Self> {
        let provider: Box<dyn SearchProvider> = match config.provider.as_str() {
            "tavily" => Box::new(TavilyProvider::new(&config.api_key, config.max_results)),
            "perplexity" => Box::new(PerplexityProvider::new(
                &config.api_key,
                config.model.as_deref().unwrap_or("sonar"),
            )),
            other => anyhow::bail!(
                "unsupported web search provider '{other}' (supported: 'tavily', 'perplexity')"
            ),
        };

        Ok(Self {
            provider,
            llm,
            summarize_results: config.summarize_results,
            max_summary_length: config.max_summary_length,
        })
    }

    /// Condenses the results with the LLM. Falls back to the provider's
    /// own answer (or nothing) when the call fails.
    async fn summarize(&self, query: &str, response: &SearchResponse) -> Option<String> {
        if !self.summarize_results || response.results.is_empty() {
            return response.answer.clone();
        }
        let Some(llm) = self.llm.as_ref() else {
            return response.answer.clone();
        };

        let results_text = response
            .results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("Result {}: {}\n{}", i + 1, r.title, r.snippet))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "User query: {query}\n\nSearch results:\n{results_text}\n\n\
             Answer the query concisely from these results. If they are \
             insufficient, say so."
        );

        let options = CompletionOptions {
            max_tokens: Some(self.max_summary_length.min(1000)),
            temperature: None,
        };

        match llm
            .complete(
                "You are a search assistant. Summarize search results into a short, accurate answer.",
                &[Message::user(prompt)],
                &options,
            )
            .await
        {
            Ok(response) => Some(response.text),
            Err(e) => {
                warn!("search summarization failed: {e}");
                response.answer.clone()
            }
        }
    }

    /// Formats the reply: optional summary, then the numbered results.
    fn format_reply(query: &str, summary: Option<&str>, response: &SearchResponse) -> String {
        let mut output = format!("🔍 results for: {query}\n");

        if let Some(summary) = summary {
            if !summary.is_empty() {
                output.push_str(&format!("\n{summary}\n"));
            }
        }

        if response.results.is_empty() {
            output.push_str("\nNo results found.");
            return output;
        }

        output.push_str(&format!("\n{} results:\n", response.results.len()));
        for (i, result) in response.results.iter().enumerate() {
            output.push_str(&format!(
                "\n{}. {}\n   {}\n   {}\n",
                i + 1,
                result.title,
                result.url,
                result.snippet,
            ));
        }

        output
    }
}

#[async_trait]
impl Skill for WebSearchSkill {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and summarize what it finds"
    }

    fn usage(&self) -> &str {
        "/search <query>"
    }

    async fn execute(&self, params: Value, _context: &SkillContext) -> anyhow::Result<String> {
        let query = params
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Missing 'query' parameter"))?;

        debug!("web search ({}): {query}", self.provider.provider_name());

        // API and network failures become text so the actor hears about
        // them instead of the message being dropped.
        match self.provider.search(query).await {
            Ok(response) => {
                let summary = self.summarize(query, &response).await;
                Ok(Self::format_reply(query, summary.as_deref(), &response))
            }
            Err(e) => {
                warn!("web search failed: {e}");
                Ok(format!("Web search failed: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::testutil::test_context;
    use serde_json::json;

    fn search_config(provider: &str) -> WebSearchConfig {
        WebSearchConfig {
            provider: provider.to_string(),
            api_key: "test-key".to_string(),
            max_results: 5,
            model: None,
            summarize_results: false,
            max_summary_length: 500,
        }
    }

    fn tavily_skill() -> WebSearchSkill {
        WebSearchSkill::new(&search_config("tavily"), None).unwrap()
    }

    // ── Constructor ──────────────────────────────────────

    #[test]
    fn test_new_tavily_provider() {
        assert_eq!(tavily_skill().provider.provider_name(), "tavily");
    }

    #[test]
    fn test_new_perplexity_provider() {
        let mut config = search_config("perplexity");
        config.model = Some("sonar-pro".to_string());
        let skill = WebSearchSkill::new(&config, None).unwrap();
        assert_eq!(skill.provider.provider_name(), "perplexity");
    }

    #[test]
    fn test_new_unsupported_provider_errors() {
        let err = WebSearchSkill::new(&search_config("bing"), None).unwrap_err();
        assert!(err.to_string().contains("bing"));
    }

    // ── Skill surface ────────────────────────────────────

    #[test]
    fn test_name_and_usage() {
        let skill = tavily_skill();
        assert_eq!(skill.name(), "web_search");
        assert!(skill.usage().starts_with("/search"));
    }

    #[tokio::test]
    async fn test_execute_missing_query_param() {
        let result = tavily_skill()
            .execute(json!({}), &test_context("10001"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_execute_blank_query_param() {
        let result = tavily_skill()
            .execute(json!({"query": "   "}), &test_context("10001"))
            .await;
        assert!(result.is_err());
    }

    // ── format_reply ─────────────────────────────────────

    fn response(results: Vec<SearchResult>) -> SearchResponse {
        SearchResponse {
            answer: None,
            results,
        }
    }

    #[test]
    fn test_format_reply_with_summary() {
        let response = response(vec![SearchResult {
            title: "Rust Language".to_string(),
            url: "https://www.rust-lang.org".to_string(),
            snippet: "Fast and memory-efficient.".to_string(),
        }]);
        let output = WebSearchSkill::format_reply(
            "what is rust",
            Some("Rust is a systems language."),
            &response,
        );
        assert!(output.contains("results for: what is rust"));
        assert!(output.contains("Rust is a systems language."));
        assert!(output.contains("1. Rust Language"));
        assert!(output.contains("https://www.rust-lang.org"));
    }

    #[test]
    fn test_format_reply_numbering() {
        let response = response(
            (1..=3)
                .map(|i| SearchResult {
                    title: format!("Title {i}"),
                    url: format!("https://{i}.example"),
                    snippet: format!("Snippet {i}"),
                })
                .collect(),
        );
        let output = WebSearchSkill::format_reply("q", None, &response);
        assert!(output.contains("3 results:"));
        assert!(output.contains("1. Title 1"));
        assert!(output.contains("3. Title 3"));
    }

    #[test]
    fn test_format_reply_empty() {
        let output = WebSearchSkill::format_reply("obscure", None, &response(vec![]));
        assert!(output.contains("No results found"));
    }

    #[test]
    fn test_format_reply_empty_summary_omitted() {
        let response = response(vec![SearchResult {
            title: "T".to_string(),
            url: "https://t.example".to_string(),
            snippet: "S".to_string(),
        }]);
        let output = WebSearchSkill::format_reply("q", Some(""), &response);
        assert!(!output.contains("\n\n\n"));
        assert!(output.contains("1. T"));
    }

    // ── summarize fallbacks ──────────────────────────────

    #[tokio::test]
    async fn test_summarize_disabled_falls_back_to_provider_answer() {
        let skill = tavily_skill();
        let response = SearchResponse {
            answer: Some("provider answer".to_string()),
            results: vec![],
        };
        assert_eq!(
            skill.summarize("q", &response).await.as_deref(),
            Some("provider answer")
        );
    }

    #[tokio::test]
    async fn test_summarize_without_llm_falls_back() {
        let mut config = search_config("tavily");
        config.summarize_results = true;
        let skill = WebSearchSkill::new(&config, None).unwrap();
        let response = SearchResponse {
            answer: Some("provider answer".to_string()),
            results: vec![SearchResult {
                title: "T".to_string(),
                url: "u".to_string(),
                snippet: "S".to_string(),
            }],
        };
        // summarize_results on, but no LLM wired in → provider answer.
        assert_eq!(
            skill.summarize("q", &response).await.as_deref(),
            Some("provider answer")
        );
    }
}
