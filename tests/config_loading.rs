use std::io::Write;

use colloquy_core::config::AppConfig;
use colloquy_tools::ToolRegistry;

fn load(toml_content: &str) -> AppConfig {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");
    AppConfig::load(tmp.path()).expect("load config")
}

#[test]
fn test_load_full_config_from_file() {
    let config = load(
        r#"
[model]
provider = "azure"
model_id = "gpt-4o"
api_key = "sk-test-key"
azure_endpoint = "https://research.openai.azure.com/"
azure_deployment = "gpt-4o-prod"
max_tokens = 2048
temperature = 0.2
timeout_secs = 45

[model.retry]
max_retries = 5

[research]
max_analysts = 4
stage_timeout_secs = 300
workspace = "/tmp/colloquy-test"

[[sources]]
name = "web_search"
description = "Tavily"

[[sources]]
name = "wikipedia"
enabled = false

[web_search]
api_key = "tvly-test"
max_results = 3
"#,
    );

    assert_eq!(config.model.provider, "azure");
    assert_eq!(config.model.model_id, "gpt-4o");
    assert_eq!(config.model.api_key, Some("sk-test-key".to_string()));
    assert_eq!(config.model.azure_deployment.as_deref(), Some("gpt-4o-prod"));
    assert_eq!(config.model.max_tokens, 2048);
    assert_eq!(config.model.timeout_secs, 45);

    let retry = config.model.retry.as_ref().expect("retry present");
    assert_eq!(retry.max_retries, 5);
    assert_eq!(retry.initial_backoff_ms, 1000);

    assert_eq!(config.research.max_analysts, 4);
    assert_eq!(config.research.stage_timeout_secs, 300);
    assert_eq!(
        config.workspace_dir(),
        std::path::PathBuf::from("/tmp/colloquy-test")
    );

    assert_eq!(config.sources.len(), 2);
    assert!(config.sources[0].enabled);
    assert!(!config.sources[1].enabled);

    let ws = config.web_search.expect("web_search present");
    assert_eq!(ws.api_key, "tvly-test");
    assert_eq!(ws.max_results, 3);
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("COLLOQUY_TEST_TAVILY_KEY", "expanded-key-value");

    let config = load(
        r#"
[model]
model_id = "test-model"

[web_search]
api_key = "${COLLOQUY_TEST_TAVILY_KEY}"
"#,
    );
    assert_eq!(
        config.web_search.map(|ws| ws.api_key),
        Some("expanded-key-value".to_string())
    );

    std::env::remove_var("COLLOQUY_TEST_TAVILY_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let config = load(
        r#"
[model]
model_id = "gpt-4o-mini"
"#,
    );

    assert_eq!(config.model.provider, "openai");
    assert!(config.model.retry.is_none());
    assert_eq!(config.research.max_analysts, 3);
    assert_eq!(config.research.workspace, "~/.colloquy");
    let names: Vec<&str> = config.sources.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["web_search", "wikipedia"]);
    assert!(config.sources.iter().all(|s| s.enabled));
    assert!(config.web_search.is_none());
}

#[test]
fn test_registry_follows_configured_credentials() {
    let without_key = load(
        r#"
[model]
model_id = "gpt-4o-mini"
"#,
    );
    let tools = ToolRegistry::from_config(&without_key);
    assert_eq!(tools.list(), vec!["wikipedia"]);

    let with_key = load(
        r#"
[model]
model_id = "gpt-4o-mini"

[web_search]
api_key = "tvly-test"
"#,
    );
    let tools = ToolRegistry::from_config(&with_key);
    assert_eq!(tools.list(), vec!["web_search", "wikipedia"]);
}

#[test]
fn test_missing_file_is_reported() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/colloquy.toml")).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/colloquy.toml"));
}
