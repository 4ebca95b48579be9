use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ColloquyError, Result};
use crate::types::SourceConfig;

/// Top-level Colloquy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub research: ResearchConfig,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub web_search: Option<WebSearchConfig>,
}

/// Defaults for new research sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Upper bound on generated analysts when none is given on the command line.
    #[serde(default = "default_max_analysts")]
    pub max_analysts: usize,
    /// Directory holding the session database. Default: ~/.colloquy
    #[serde(default = "default_workspace")]
    pub workspace: String,
    /// Upper bound on one stage run, tool calls included.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_analysts: default_max_analysts(),
            workspace: default_workspace(),
            stage_timeout_secs: default_stage_timeout(),
        }
    }
}

fn default_max_analysts() -> usize { 3 }
fn default_workspace() -> String { "~/.colloquy".to_string() }
fn default_stage_timeout() -> u64 { 600 }

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::new("web_search", "Search the web for information", true),
        SourceConfig::new("wikipedia", "Search Wikipedia for information", true),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Azure OpenAI endpoint, e.g. `https://my-resource.openai.azure.com/`.
    #[serde(default)]
    pub azure_endpoint: Option<String>,
    #[serde(default)]
    pub azure_deployment: Option<String>,
    #[serde(default)]
    pub azure_api_version: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Upper bound on one model request, streaming included.
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }
fn default_model_timeout() -> u64 { 120 }

pub const DEFAULT_AZURE_API_VERSION: &str = "2024-10-21";
pub const DEFAULT_MODEL_ID: &str = "gpt-35-turbo-16k";

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Tavily web search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    pub api_key: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_max_results() -> u32 { 5 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ColloquyError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self = toml::from_str(&expanded)
            .map_err(|e| ColloquyError::Configuration(e.to_string()))?;
        debug!(path = %path.display(), provider = %config.model.provider, "Config loaded");
        Ok(config)
    }

    /// Build a config purely from environment variables.
    ///
    /// Uses Azure OpenAI when `AZURE_OPENAI_ENDPOINT` is set, the OpenAI API otherwise.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        let azure_endpoint = std::env::var("AZURE_OPENAI_ENDPOINT").ok();
        if api_key.is_none() {
            return Err(ColloquyError::Configuration(
                "OPENAI_API_KEY is not set and no config file was found".into(),
            ));
        }

        let model_id =
            std::env::var("COLLOQUY_MODEL").unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string());
        let provider = if azure_endpoint.is_some() { "azure" } else { "openai" };

        Ok(Self {
            model: ModelConfig {
                provider: provider.to_string(),
                azure_deployment: std::env::var("AZURE_OPENAI_DEPLOYMENT")
                    .ok()
                    .or_else(|| azure_endpoint.as_ref().map(|_| model_id.clone())),
                model_id,
                api_key,
                base_url: None,
                azure_endpoint,
                azure_api_version: std::env::var("AZURE_OPENAI_API_VERSION").ok(),
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
                extra_headers: HashMap::new(),
                retry: Some(RetryConfig::default()),
                timeout_secs: default_model_timeout(),
            },
            research: ResearchConfig::default(),
            sources: default_sources(),
            web_search: std::env::var("TAVILY_API_KEY").ok().map(|api_key| WebSearchConfig {
                api_key,
                max_results: default_max_results(),
            }),
        })
    }

    /// Resolve the workspace directory (expand ~).
    pub fn workspace_dir(&self) -> PathBuf {
        let ws = &self.research.workspace;
        if let Some(rest) = ws.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(ws)
    }

    /// Default location of the user-level config file.
    pub fn home_config_path() -> Option<PathBuf> {
        dirs_home().map(|h| h.join(".colloquy").join("config.toml"))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
