use futures::future::BoxFuture;
use serde_json::json;

use colloquy_core::error::{ColloquyError, Result};
use colloquy_core::traits::ResearchTool;

const TAVILY_URL: &str = "https://api.tavily.com/search";

/// Web search backed by the Tavily API.
pub struct WebSearchTool {
    api_key: String,
    max_results: u32,
    http: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(api_key: &str, max_results: u32) -> Self {
        Self {
            api_key: api_key.to_string(),
            max_results,
            http: reqwest::Client::new(),
        }
    }
}

fn tool_error(message: impl ToString) -> ColloquyError {
    ColloquyError::Tool {
        tool: "web_search".into(),
        message: message.to_string(),
    }
}

/// Render a Tavily response body as plain text.
pub(crate) fn format_results(body: &serde_json::Value) -> String {
    body["results"]
        .as_array()
        .filter(|arr| !arr.is_empty())
        .map(|arr| {
            arr.iter()
                .map(|r| {
                    format!(
                        "**{}**\n{}\nURL: {}",
                        r["title"].as_str().unwrap_or(""),
                        r["content"].as_str().unwrap_or(""),
                        r["url"].as_str().unwrap_or("")
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n---\n\n")
        })
        .unwrap_or_else(|| "No results found.".into())
}

impl ResearchTool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information. Returns relevant results with snippets."
    }

    fn search(&self, query: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let resp = self
                .http
                .post(TAVILY_URL)
                .json(&json!({
                    "api_key": self.api_key,
                    "query": query,
                    "max_results": self.max_results,
                }))
                .send()
                .await
                .map_err(tool_error)?;

            if !resp.status().is_success() {
                return Err(tool_error(format!("HTTP {}", resp.status())));
            }

            let body: serde_json::Value = resp.json().await.map_err(tool_error)?;
            Ok(format_results(&body))
        })
    }
}
