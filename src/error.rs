//! Error types for the ledger assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Deterministic Core Errors
    // =============================

    /// Malformed event or account, rejected before persistence.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A burn-rate window with no events. Unknown burn is not zero burn.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Projection requested on an already-depleted balance.
    #[error("Domain error: {0}")]
    Domain(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // =============================
    // Collaborator Errors
    // =============================

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audit error: {0}")]
    Audit(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
