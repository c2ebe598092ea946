// HTTP route handlers for the Arbiter API

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use arbiter_common::types::{EvaluateRequest, RunResponse, SubmissionSummary, SubmitResponse};
use arbiter_common::Mode;
use arbiter_engine::EngineError;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::info;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::{metrics, AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolvedResponse {
    pub user_id: String,
    pub solved: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub in_flight: usize,
    pub languages: Vec<String>,
}

fn error_code(err: &EngineError) -> &'static str {
    match err {
        EngineError::UnsupportedLanguage { .. } => "unsupported_language",
        EngineError::ProblemNotFound(_) => "not_found",
        EngineError::RateLimited { .. } => "rate_limited",
        EngineError::Dispatch(_) => "dispatch_error",
        EngineError::Internal { .. } => "internal_error",
        EngineError::Store(_) | EngineError::IllegalTransition { .. } => "server_error",
    }
}

pub const UNSUPPORTED_LANGUAGE_LABEL: &str = "unsupported";

/// Metrics label for a requested language
///
/// Only registry ids are used as labels; anything else shares one bucket so
/// callers cannot mint new series.
fn language_label(state: &AppState, requested: &str) -> String {
    state
        .manager
        .languages()
        .get(requested)
        .map(|spec| spec.id.clone())
        .unwrap_or_else(|| UNSUPPORTED_LANGUAGE_LABEL.to_string())
}

/// Run an evaluation in its own task
///
/// The task is detached from the request: if the caller disconnects the
/// evaluation still runs to its terminal state.
async fn evaluate<T, F>(mode: Mode, language_label: String, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: Future<Output = Result<(T, &'static str), EngineError>> + Send + 'static,
{
    let mode_label = mode.to_string();
    metrics::record_evaluation_started(&mode_label, &language_label);

    let task = tokio::spawn(async move {
        let _in_flight = metrics::InFlightGuard::new(metrics::IN_FLIGHT.clone());
        let started = Instant::now();
        let result = work.await;
        metrics::record_evaluation_finished(&mode_label, started.elapsed().as_secs_f64());

        match &result {
            Ok((_, verdict)) => metrics::record_verdict(&mode_label, verdict),
            Err(EngineError::RateLimited { reason, .. }) => metrics::record_rejection(reason.as_str()),
            Err(err) => metrics::record_failure(&mode_label, error_code(err)),
        }
        result
    });

    let result = task.await.map_err(|e| ApiError::TaskFailed(e.to_string()))?;
    result.map(|(value, _)| value).map_err(ApiError::from)
}

/// POST /submission/run/:problem_id - Evaluate against the visible cases
pub async fn run_code(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(problem_id): Path<String>,
    Json(payload): Json<EvaluateRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let manager = state.manager.clone();
    let language = language_label(&state, &payload.language);

    let response = evaluate(Mode::Run, language, async move {
        let outcome = manager
            .run(&user_id, &problem_id, &payload.language, &payload.code)
            .await?;
        Ok::<_, EngineError>((outcome.to_response(), outcome.aggregate.verdict.label()))
    })
    .await?;

    Ok(Json(response))
}

/// POST /submission/submit/:problem_id - Evaluate against every case and persist
pub async fn submit_code(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(problem_id): Path<String>,
    Json(payload): Json<EvaluateRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let manager = state.manager.clone();
    let language = language_label(&state, &payload.language);

    let response = evaluate(Mode::Submit, language, async move {
        let outcome = manager
            .submit(&user_id, &problem_id, &payload.language, &payload.code)
            .await?;
        if outcome.first_solve {
            metrics::record_first_solve();
            info!(user_id = %user_id, problem_id = %problem_id, "First accepted solve");
        }
        Ok::<_, EngineError>((outcome.to_response(), outcome.aggregate.verdict.label()))
    })
    .await?;

    Ok(Json(response))
}

/// GET /submission/history/:problem_id - The caller's submissions, newest first
pub async fn submission_history(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(problem_id): Path<String>,
) -> Result<Json<Vec<SubmissionSummary>>, ApiError> {
    let history = state.manager.history(&user_id, &problem_id).await?;
    Ok(Json(history))
}

/// GET /user/solved - Problems the caller has solved
pub async fn solved_problems(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<SolvedResponse>, ApiError> {
    let solved = state.manager.solved(&user_id).await?;
    Ok(Json(SolvedResponse { user_id, solved }))
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            uptime_secs: state.start_time.elapsed().as_secs(),
            in_flight: state.manager.gate().in_flight(),
            languages: state
                .manager
                .languages()
                .ids()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }),
    )
}

/// GET /metrics - Prometheus text exposition
pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}
