//! Top-level error types for relaybot.

use std::sync::Arc;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Conversation(#[from] ConversationError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}: {source}")]
    Load {
        path: String,
        source: Arc<config::ConfigError>,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing required config key: {0}")]
    MissingKey(String),

    #[error("failed to watch config file: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Conversation store errors. These are local defects; callers treat them
/// as assertions rather than user-visible failures.
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("invalid {role} turn: content is empty")]
    InvalidTurn { role: &'static str },
}

/// LLM provider and model errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("missing API key for provider: {0}")]
    MissingProviderKey(String),

    #[error("provider request failed: {0}")]
    ProviderRequest(String),

    #[error("completion failed: {0}")]
    CompletionFailed(String),

    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("prompt rendering failed: {0}")]
    Template(#[from] minijinja::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Chat transport errors.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("{adapter} client not connected")]
    NotConnected { adapter: &'static str },

    #[error("failed to join channel {channel}: {reason}")]
    JoinFailed { channel: String, reason: String },

    #[error("failed to send message to {channel}: {reason}")]
    SendFailed { channel: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
