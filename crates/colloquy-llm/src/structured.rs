//! Structured output on top of a plain streaming chat client.
//!
//! The requested JSON Schema is embedded in the system prompt; the reply is
//! cleaned of markdown fences and checked for the keys the schema requires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::StreamExt;
use tracing::{debug, warn};

use colloquy_core::config::ModelConfig;
use colloquy_core::error::{ColloquyError, Result};
use colloquy_core::traits::{LlmClient, StructuredGenerator};
use colloquy_core::types::{ChatMessage, OutputShape, StreamDelta};

/// Adapts an [`LlmClient`] into a [`StructuredGenerator`].
pub struct LlmGenerator {
    client: Arc<dyn LlmClient>,
    config: ModelConfig,
}

impl LlmGenerator {
    pub fn new(client: Arc<dyn LlmClient>, config: ModelConfig) -> Self {
        Self { client, config }
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let mut stream = self.client.chat_stream(&self.config, messages).await?;
        let mut text = String::new();
        while let Some(delta) = stream.next().await {
            match delta? {
                StreamDelta::TextDelta(t) => text.push_str(&t),
                StreamDelta::Usage {
                    input_tokens,
                    output_tokens,
                } => debug!(input_tokens, output_tokens, "LLM usage"),
                StreamDelta::Stop(reason) => debug!(?reason, "LLM stream stopped"),
            }
        }
        Ok(text)
    }
}

/// System prompt with the output contract appended.
fn system_with_contract(system_prompt: &str, shape: &OutputShape) -> String {
    match shape {
        OutputShape::Text => system_prompt.to_string(),
        OutputShape::Json { name, schema } => format!(
            "{}\n\nRespond with ONLY a JSON object (\"{}\") that conforms to this JSON Schema, with no prose before or after it:\n{}",
            system_prompt,
            name,
            serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
        ),
    }
}

/// Check a raw reply against `shape`, returning the parsed value or the issues found.
pub fn validate_output(shape: &OutputShape, raw: &str) -> std::result::Result<serde_json::Value, Vec<String>> {
    if let OutputShape::Text = shape {
        return Ok(serde_json::Value::String(raw.trim().to_string()));
    }

    let cleaned = heuristic_repair(raw);
    let value: serde_json::Value = match serde_json::from_str(&cleaned) {
        Ok(v) => v,
        Err(e) => return Err(vec![format!("Output is not valid JSON: {}", e)]),
    };

    let obj = match value.as_object() {
        Some(obj) => obj,
        None => return Err(vec!["Expected JSON object but got non-object".to_string()]),
    };

    let issues: Vec<String> = shape
        .required_keys()
        .into_iter()
        .filter(|key| obj.get(key).map_or(true, |v| v.is_null()))
        .map(|key| format!("Missing required key: '{}'", key))
        .collect();

    if issues.is_empty() {
        Ok(value)
    } else {
        Err(issues)
    }
}

/// Strip markdown fences and surrounding prose from a JSON reply.
pub fn heuristic_repair(output: &str) -> String {
    let stripped = strip_code_fences(output);
    let trimmed = stripped.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => trimmed[start..=end].to_string(),
        _ => trimmed.to_string(),
    }
}

/// Strip markdown code fences from text.
fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        // Skip optional language tag on the fence line
        let body = match after.find('\n') {
            Some(nl) if !after[..nl].contains('{') => &after[nl + 1..],
            _ => after,
        };
        if let Some(end) = body.find("```") {
            return body[..end].trim().to_string();
        }
    }

    trimmed.to_string()
}

impl StructuredGenerator for LlmGenerator {
    fn generate<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
        shape: &'a OutputShape,
    ) -> BoxFuture<'a, Result<serde_json::Value>> {
        Box::pin(async move {
            let start = Instant::now();
            let messages = vec![
                ChatMessage::system(system_with_contract(system_prompt, shape)),
                ChatMessage::user(user_prompt),
            ];
            let limit = Duration::from_secs(self.config.timeout_secs);
            let raw = tokio::time::timeout(limit, self.complete(messages))
                .await
                .map_err(|_| {
                    warn!(timeout_secs = self.config.timeout_secs, "Generator call timed out");
                    ColloquyError::LlmRequest(format!(
                        "model did not finish within {}s",
                        self.config.timeout_secs
                    ))
                })??;
            debug!(
                chars = raw.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Generator reply received"
            );

            validate_output(shape, &raw).map_err(|issues| {
                warn!(issues = ?issues, "Generator output rejected");
                ColloquyError::LlmParse(issues.join("; "))
            })
        })
    }
}
