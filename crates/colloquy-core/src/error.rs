use thiserror::Error;

use crate::state::StageId;

#[derive(Debug, Error)]
pub enum ColloquyError {
    // Session setup errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Stage errors
    #[error("Generation failed in {stage}: {message}")]
    Generation { stage: StageId, message: String },

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    // LLM transport errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Session errors
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a caller should treat an error surfaced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The session cannot start or continue without outside intervention.
    Fatal,
    /// The session is intact at its previous suspension point; resuming again may succeed.
    Recoverable,
}

impl ColloquyError {
    /// Build a generation error for a stage.
    pub fn generation(stage: StageId, message: impl Into<String>) -> Self {
        Self::Generation {
            stage,
            message: message.into(),
        }
    }

    /// Classify this error for the presentation layer.
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Generation { .. }
            | Self::Tool { .. }
            | Self::ToolTimeout { .. }
            | Self::LlmRequest(_)
            | Self::LlmStream(_)
            | Self::LlmParse(_) => Disposition::Recoverable,
            Self::Configuration(_)
            | Self::ConfigNotFound(_)
            | Self::ToolNotFound(_)
            | Self::SessionNotFound(_)
            | Self::Persistence(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_) => Disposition::Fatal,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.disposition() == Disposition::Recoverable
    }
}

pub type Result<T> = std::result::Result<T, ColloquyError>;
