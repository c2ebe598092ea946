use arbiter_engine::EngineError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Structured error body returned by every endpoint on failure
///
/// `code` is one of: `UNAUTHENTICATED`, `UNSUPPORTED_LANGUAGE`, `NOT_FOUND`,
/// `RATE_LIMITED`, `DISPATCH_ERROR`, `INTERNAL_ERROR`, `SERVER_ERROR`.
/// Infrastructure failures are never reported as a verdict.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    /// Present on `INTERNAL_ERROR`: whether submitting again may succeed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthenticated,
    Engine(EngineError),
    /// The evaluation task itself died
    TaskFailed(String),
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

fn body(code: &'static str, message: impl Into<String>) -> ErrorBody {
    ErrorBody {
        code,
        message: message.into(),
        retryable: None,
    }
}

impl ApiError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                body("UNAUTHENTICATED", "Authenticated user id required"),
            ),
            ApiError::TaskFailed(detail) => {
                tracing::error!("Evaluation task failed: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    body("SERVER_ERROR", "An unexpected error occurred"),
                )
            }
            ApiError::Engine(err) => match err {
                EngineError::UnsupportedLanguage { .. } => {
                    (StatusCode::BAD_REQUEST, body("UNSUPPORTED_LANGUAGE", err.to_string()))
                }
                EngineError::ProblemNotFound(_) => {
                    (StatusCode::NOT_FOUND, body("NOT_FOUND", err.to_string()))
                }
                EngineError::RateLimited { .. } => (
                    StatusCode::TOO_MANY_REQUESTS,
                    body("RATE_LIMITED", err.to_string()),
                ),
                EngineError::Dispatch(_) => (
                    StatusCode::BAD_GATEWAY,
                    body("DISPATCH_ERROR", "The execution service refused the submission"),
                ),
                EngineError::Internal { retryable, .. } => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "Evaluation could not be completed by the execution service".into(),
                        retryable: Some(retryable),
                    },
                ),
                EngineError::Store(_) | EngineError::IllegalTransition { .. } => {
                    tracing::error!("Server error: {}", err);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        body("SERVER_ERROR", "An unexpected error occurred"),
                    )
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = match &self {
            ApiError::Engine(EngineError::RateLimited { retry_after, .. }) => {
                Some(retry_after.as_secs().max(1))
            }
            _ => None,
        };

        let (status, body) = self.status_and_body();

        if let Some(seconds) = retry_after {
            (status, [("Retry-After", seconds.to_string())], Json(body)).into_response()
        } else {
            (status, Json(body)).into_response()
        }
    }
}
