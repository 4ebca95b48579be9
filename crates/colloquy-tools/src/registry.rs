use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use colloquy_core::config::AppConfig;
use colloquy_core::error::{ColloquyError, Result};
use colloquy_core::traits::ResearchTool;

use crate::builtin::web_search::WebSearchTool;
use crate::builtin::wikipedia::WikipediaTool;

/// Registry of available research tools, keyed by source name.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ResearchTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool.
    pub fn register(&mut self, tool: impl ResearchTool) {
        self.register_arc(Arc::new(tool));
    }

    /// Register an already shared tool.
    pub fn register_arc(&mut self, tool: Arc<dyn ResearchTool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Unregister a tool by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ResearchTool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Run a search on the named tool, bounded by its timeout.
    pub async fn search(&self, name: &str, query: &str) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| ColloquyError::ToolNotFound(name.to_string()))?;

        let timeout = Duration::from_secs(tool.timeout_secs());
        let start = Instant::now();

        let result = match tokio::time::timeout(timeout, tool.search(query.to_string())).await {
            Ok(result) => result,
            Err(_) => Err(ColloquyError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs: tool.timeout_secs(),
            }),
        };

        debug!(
            tool = name,
            ok = result.is_ok(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tool search finished"
        );
        result
    }

    /// Create a registry with the built-in tools the config can support.
    ///
    /// Wikipedia needs no credentials; web search is registered only when a
    /// Tavily key is configured.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new();

        registry.register(WikipediaTool::new());

        match config.web_search.as_ref().filter(|ws| !ws.api_key.is_empty()) {
            Some(ws) => registry.register(WebSearchTool::new(&ws.api_key, ws.max_results)),
            None => info!("No web_search api_key configured; web_search tool unavailable"),
        }

        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
