use std::time::Duration;

use thiserror::Error;

use crate::admission::RejectReason;

/// Failure talking to the external execution service.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The service refused the request outright (4xx other than 429).
    #[error("execution service rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// Network failure, client timeout, 5xx or 429.
    #[error("execution service unavailable: {0}")]
    Unavailable(String),
    /// The service answered with a body we could not understand.
    #[error("malformed execution service response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Transient failures are retried locally with backoff; the rest are final.
    pub fn is_transient(&self) -> bool {
        !matches!(self, BackendError::Rejected { .. })
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Malformed(err.to_string())
        } else {
            BackendError::Unavailable(err.to_string())
        }
    }
}

/// Failure of a collaborator store (problems, submissions, solved records).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by the evaluation engine to its caller.
///
/// Test-driven outcomes (wrong answer, compile error, ...) are never errors;
/// they are verdicts. Everything here is either a caller mistake or an
/// infrastructure failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("language '{language}' is not configured for this problem")]
    UnsupportedLanguage { language: String },
    #[error("problem '{0}' not found")]
    ProblemNotFound(String),
    #[error("rate limited, retry after {}s", .retry_after.as_secs().max(1))]
    RateLimited {
        retry_after: Duration,
        reason: RejectReason,
    },
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("evaluation failed: {message}")]
    Internal { message: String, retryable: bool },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("illegal submission transition from {from} on {event}")]
    IllegalTransition {
        from: &'static str,
        event: &'static str,
    },
}
