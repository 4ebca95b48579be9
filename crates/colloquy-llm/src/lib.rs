pub mod providers;
pub mod retry;
pub mod streaming;
pub mod structured;

use colloquy_core::config::ModelConfig;
use colloquy_core::traits::LlmClient;

pub use providers::azure::AzureClient;
pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;
pub use structured::LlmGenerator;

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Box<dyn LlmClient> {
    match config.provider.as_str() {
        "azure" | "azure_openai" => Box::new(AzureClient::new()),
        // Everything else uses the OpenAI-compatible client
        _ => Box::new(OpenAiClient::new()),
    }
}

/// Create a client, wrapped in retries when the config asks for them.
pub fn build_client(config: &ModelConfig) -> Box<dyn LlmClient> {
    let client = create_client(config);
    match &config.retry {
        Some(retry) => Box::new(RetryingClient::new(client, retry.clone())),
        None => client,
    }
}
