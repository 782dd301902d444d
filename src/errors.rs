//! # Error Types Module
//!
//! This module defines the error types used by the reconciliation pipeline and
//! the inference clients. Per-entry problems (unparseable quantities, unresolved
//! names, malformed model replies) are not errors: they degrade to a fallback or
//! a skipped entry. Only the conditions below ever reach a caller.

/// Errors raised while talking to an inference endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceError {
    /// Connection or transport failure
    Transport(String),
    /// The endpoint answered with a non-success status
    Status { status: u16, body: String },
    /// The endpoint answered but the envelope could not be decoded
    Decode(String),
    /// The call did not finish within the configured timeout
    Timeout(String),
    /// The circuit breaker is open and the call was not attempted
    CircuitOpen,
}

impl InferenceError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            InferenceError::Transport(_) | InferenceError::Timeout(_) => true,
            InferenceError::Status { status, .. } => *status == 429 || *status >= 500,
            InferenceError::Decode(_) | InferenceError::CircuitOpen => false,
        }
    }
}

impl std::fmt::Display for InferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferenceError::Transport(msg) => write!(f, "Transport error: {msg}"),
            InferenceError::Status { status, body } => {
                write!(f, "Inference endpoint returned {status}: {body}")
            }
            InferenceError::Decode(msg) => write!(f, "Decode error: {msg}"),
            InferenceError::Timeout(msg) => write!(f, "Timeout error: {msg}"),
            InferenceError::CircuitOpen => write!(f, "Circuit breaker is open"),
        }
    }
}

impl std::error::Error for InferenceError {}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            InferenceError::Timeout(err.to_string())
        } else if err.is_decode() {
            InferenceError::Decode(err.to_string())
        } else {
            InferenceError::Transport(err.to_string())
        }
    }
}

/// Errors that abort a whole reconciliation run
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A resolved ingredient id has no canonical unit in the catalog snapshot
    CatalogInconsistency { ingredient_id: i32, name: String },
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::CatalogInconsistency {
                ingredient_id,
                name,
            } => write!(
                f,
                "Catalog inconsistency: ingredient '{name}' (id {ingredient_id}) has no canonical unit"
            ),
        }
    }
}

impl std::error::Error for PipelineError {}
