use std::time::Duration;
use thiserror::Error;

use crate::handlers::ResolveError;

/// Errors raised while a remote interface is compiled into a client.
///
/// These never reach call time: a client either builds completely or not at all.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("handler resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("malformed marker {marker} on {method}: {reason}")]
    MalformedMarker {
        marker: String,
        method: String,
        reason: String,
    },

    #[error("duplicate method: {0}")]
    DuplicateMethod(String),

    #[error("unknown endpoint '{endpoint}' referenced by {method}")]
    UnknownEndpoint { endpoint: String, method: String },

    #[error("transport setup failed: {0}")]
    Transport(String),
}

/// Errors raised while a call runs through the lifecycle.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("method {method} expects {expected} arguments, got {actual}")]
    Arity {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to encode request: {0}")]
    Encode(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("handler {handler} failed: {reason}")]
    Handler { handler: String, reason: String },

    #[error("retry ceiling of {0} attempts exceeded")]
    RetryCeiling(u32),

    #[error("{0}")]
    Fatal(String),
}

impl CallError {
    /// Network-level failures that are worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, CallError::Transport(_) | CallError::Timeout(_))
    }

    pub fn handler(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        CallError::Handler {
            handler: handler.into(),
            reason: reason.into(),
        }
    }

    /// Join recorded fatal causes into the single error raised to the caller
    pub fn aggregate(causes: &[CallError]) -> Self {
        let joined = causes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        CallError::Fatal(joined)
    }
}
