//! Error types for the support triage pipeline.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Knowledge store error: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("Inbox error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Knowledge store loading errors.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse knowledge store: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate knowledge entry id: {0}")]
    DuplicateId(String),

    #[error("Knowledge store is empty")]
    Empty,
}

/// Inbox ingestion errors.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse inbox fixtures: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unreadable message {path}")]
    UnreadableMessage { path: String },
}

/// Failure of a single capability-backed stage.
///
/// Only two kinds exist. Both are collapsed into the stage's fallback
/// value and never leave the stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    #[error("{stage}: capability call failed: {reason}")]
    CapabilityFailure { stage: &'static str, reason: String },

    #[error("{stage}: malformed response: {reason}")]
    MalformedResponse { stage: &'static str, reason: String },
}

impl StageError {
    /// Name of the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::CapabilityFailure { stage, .. } | Self::MalformedResponse { stage, .. } => stage,
        }
    }

    /// Attach a stage name to an error produced without one.
    pub fn with_stage(self, stage: &'static str) -> Self {
        match self {
            Self::CapabilityFailure { reason, .. } => Self::CapabilityFailure { stage, reason },
            Self::MalformedResponse { reason, .. } => Self::MalformedResponse { stage, reason },
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
