//! Error types for the convmem domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the orchestrator decides
//! which of them are absorbed and which propagate.

use thiserror::Error;

/// The top-level error type for all convmem operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Hot tier ---
    #[error("Hot store error: {0}")]
    HotStore(#[from] HotStoreError),

    // --- Durable tier ---
    #[error("Durable store error: {0}")]
    Durable(#[from] DurableError),

    // --- Summarizer / extractor ---
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    // --- Key naming ---
    #[error("Key space error: {0}")]
    KeySpace(#[from] KeySpaceError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the volatile tier. Always absorbed by the orchestrator.
#[derive(Debug, Clone, Error)]
pub enum HotStoreError {
    #[error("Hot store unavailable: {0}")]
    Unavailable(String),

    #[error("Hot store command {command} failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Hot store value could not be encoded or decoded: {0}")]
    Encoding(String),
}

/// Failures of the persistent tier.
///
/// Only a failed chat-log append is propagated to the caller of `ingest`.
#[derive(Debug, Clone, Error)]
pub enum DurableError {
    #[error("Durable persist failure: {0}")]
    PersistFailure(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Connection failed: {0}")]
    Connection(String),
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures of the summarizer/extractor collaborator.
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{operation} did not finish within {timeout_secs}s")]
    Timeout {
        operation: &'static str,
        timeout_secs: u64,
    },

    #[error("Collaborator returned an empty response")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeySpaceError {
    #[error("Invalid region kind: {0}")]
    InvalidRegionKind(String),

    #[error("Region {0} is conversation-scoped and needs a conversation id")]
    MissingConversation(&'static str),

    #[error("Region {0} is user-scoped and takes no conversation id")]
    UnexpectedConversation(&'static str),
}
