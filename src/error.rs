//! Error types for the payment gate

use thiserror::Error;

/// Result type alias for gate operations
pub type Result<T> = std::result::Result<T, GateError>;

#[derive(Error, Debug)]
pub enum GateError {

    // =============================
    // Core Gate Errors
    // =============================

    /// Malformed order fields (empty identity, non-finite price, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A spending limit, currency or balance rule was violated
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// Too many order attempts inside the trailing window
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// A stage received a run whose preceding stage does not match
    /// expectation. Indicates stages were invoked out of order.
    #[error("Pipeline integrity error: {0}")]
    PipelineIntegrity(String),

    /// The settlement executor failed or reverted
    #[error("Execution error: {0}")]
    Execution(String),

    /// Attestation signing failed
    #[error("Attestation error: {0}")]
    Attestation(String),

    /// Orchestrator not initialized / collaborator unavailable
    #[error("System error: {0}")]
    System(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
