use futures::future::BoxFuture;

use colloquy_core::error::{ColloquyError, Result};
use colloquy_core::traits::ResearchTool;

const WIKIPEDIA_API: &str = "https://en.wikipedia.org/w/api.php";
const USER_AGENT: &str = concat!("colloquy/", env!("CARGO_PKG_VERSION"));

/// Wikipedia full-text search through the MediaWiki API.
pub struct WikipediaTool {
    max_results: u32,
    http: reqwest::Client,
}

impl WikipediaTool {
    pub fn new() -> Self {
        Self::with_max_results(3)
    }

    pub fn with_max_results(max_results: u32) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { max_results, http }
    }
}

impl Default for WikipediaTool {
    fn default() -> Self {
        Self::new()
    }
}

fn tool_error(message: impl ToString) -> ColloquyError {
    ColloquyError::Tool {
        tool: "wikipedia".into(),
        message: message.to_string(),
    }
}

/// Drop HTML tags and decode the handful of entities MediaWiki snippets use.
fn strip_markup(snippet: &str) -> String {
    let mut out = String::with_capacity(snippet.len());
    let mut in_tag = false;
    for c in snippet.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Render a `list=search` response as plain text.
pub(crate) fn format_results(body: &serde_json::Value) -> String {
    body["query"]["search"]
        .as_array()
        .filter(|arr| !arr.is_empty())
        .map(|arr| {
            arr.iter()
                .map(|page| {
                    let title = page["title"].as_str().unwrap_or("");
                    format!(
                        "Page: {}\nSummary: {}\nURL: https://en.wikipedia.org/wiki/{}",
                        title,
                        strip_markup(page["snippet"].as_str().unwrap_or("")),
                        title.replace(' ', "_")
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n")
        })
        .unwrap_or_else(|| "No good Wikipedia Search Result was found".into())
}

impl ResearchTool for WikipediaTool {
    fn name(&self) -> &str {
        "wikipedia"
    }

    fn description(&self) -> &str {
        "Search Wikipedia for encyclopedic background on a topic."
    }

    fn search(&self, query: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let limit = self.max_results.to_string();
            let resp = self
                .http
                .get(WIKIPEDIA_API)
                .query(&[
                    ("action", "query"),
                    ("list", "search"),
                    ("format", "json"),
                    ("srsearch", query.as_str()),
                    ("srlimit", limit.as_str()),
                ])
                .send()
                .await
                .map_err(tool_error)?;

            if !resp.status().is_success() {
                return Err(tool_error(format!("HTTP {}", resp.status())));
            }

            let body: serde_json::Value = resp.json().await.map_err(tool_error)?;
            if let Some(info) = body["error"]["info"].as_str() {
                return Err(tool_error(info));
            }
            Ok(format_results(&body))
        })
    }
}
