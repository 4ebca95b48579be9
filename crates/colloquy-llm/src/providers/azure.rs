use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use reqwest::Client;

use colloquy_core::config::{ModelConfig, DEFAULT_AZURE_API_VERSION};
use colloquy_core::error::{ColloquyError, Result};
use colloquy_core::traits::LlmClient;
use colloquy_core::types::*;

/// Azure OpenAI client. Uses the same wire format as OpenAI but different
/// endpoint structure and `api-key` header instead of Bearer token.
pub struct AzureClient {
    http: Client,
}

impl AzureClient {
    pub fn new() -> Self {
        Self {
            http: super::openai::http_client(),
        }
    }
}

impl Default for AzureClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Chat completions URL for a deployment.
pub(crate) fn deployment_url(config: &ModelConfig) -> Result<String> {
    let endpoint = config
        .azure_endpoint
        .as_deref()
        .ok_or_else(|| ColloquyError::Configuration("Azure: azure_endpoint is required".into()))?;
    let deployment = config
        .azure_deployment
        .as_deref()
        .unwrap_or(config.model_id.as_str());
    let api_version = config
        .azure_api_version
        .as_deref()
        .unwrap_or(DEFAULT_AZURE_API_VERSION);

    Ok(format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        api_version
    ))
}

impl LlmClient for AzureClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();

        Box::pin(async move {
            let url = deployment_url(&config)?;
            let api_key = config
                .api_key
                .as_deref()
                .ok_or_else(|| ColloquyError::Configuration("Azure: api_key is required".into()))?;

            let body = serde_json::json!({
                "messages": super::openai::convert_messages(messages),
                "max_tokens": config.max_tokens,
                "temperature": config.temperature,
                "stream": true,
            });

            let req = self
                .http
                .post(&url)
                .timeout(Duration::from_secs(config.timeout_secs))
                .header("api-key", api_key)
                .header("content-type", "application/json")
                .json(&body);

            let stream = super::openai::send_streaming(req).await?;
            Ok(stream as BoxStream<'_, Result<StreamDelta>>)
        })
    }
}
