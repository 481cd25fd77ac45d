//! Error types for recall-core

use recall_state::StorageError;
use thiserror::Error;

/// Failures talking to the completion service
#[derive(Error, Debug)]
pub enum CompletionError {
    /// Transport failure (DNS, TLS, connection reset)
    #[error("HTTP error: {0}")]
    Http(String),

    /// The request did not finish within its timeout
    #[error("completion request timed out")]
    Timeout,

    /// Non-success HTTP status without a structured error body
    #[error("completion service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Well-formed response carrying a non-empty error code
    #[error("completion service error {code}: {message}")]
    Service { code: String, message: String },

    /// Response contained no choices
    #[error("completion response had no usable choices")]
    EmptyChoices,

    /// Response body was not a chat completion
    #[error("malformed completion response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for CompletionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CompletionError::Timeout
        } else {
            CompletionError::Http(err.to_string())
        }
    }
}

/// Failures of a single per-user analysis.
///
/// None of these mutate stored preferences; the user stays eligible and is
/// retried on a later poll.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("parsing analysis JSON: {source} (response: {response})")]
    Parse {
        #[source]
        source: serde_json::Error,
        response: String,
    },
}

/// Invalid construction-time configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
