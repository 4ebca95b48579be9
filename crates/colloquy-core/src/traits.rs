use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::state::SessionSnapshot;
use crate::types::*;

/// LLM client: streaming chat completions.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// Text generator able to honour a requested output shape.
pub trait StructuredGenerator: Send + Sync + 'static {
    /// Generate a value matching `shape`.
    ///
    /// `OutputShape::Text` yields a JSON string; `OutputShape::Json` yields an
    /// object carrying every key the schema requires. Malformed output is a
    /// generation error.
    fn generate<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
        shape: &'a OutputShape,
    ) -> BoxFuture<'a, Result<serde_json::Value>>;
}

/// Information retrieval tool.
pub trait ResearchTool: Send + Sync + 'static {
    /// Tool name, matched against configured source names.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Run a search and return its text result.
    fn search(&self, query: String) -> BoxFuture<'_, Result<String>>;

    /// Timeout in seconds for one search.
    fn timeout_secs(&self) -> u64 {
        30
    }
}

/// Summary row returned when listing stored sessions.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub session_id: SessionId,
    pub topic: String,
    pub position: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Session store: persistence backend for suspension-point snapshots.
pub trait SessionStore: Send + Sync + 'static {
    /// Save (or replace) the snapshot for its session.
    fn save(&self, snapshot: &SessionSnapshot) -> BoxFuture<'_, Result<()>>;

    /// Load the latest snapshot for a session.
    fn load(&self, sid: &SessionId) -> BoxFuture<'_, Result<Option<SessionSnapshot>>>;

    /// Delete a session's snapshot. Returns whether one existed.
    fn delete(&self, sid: &SessionId) -> BoxFuture<'_, Result<bool>>;

    /// List stored sessions, most recently updated first.
    fn list(&self) -> BoxFuture<'_, Result<Vec<StoredSession>>>;
}
