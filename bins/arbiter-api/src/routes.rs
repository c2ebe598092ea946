// Route definitions for the Arbiter API

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::{handlers, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/submission/run/:problem_id", post(handlers::run_code))
        .route("/submission/submit/:problem_id", post(handlers::submit_code))
        .route(
            "/submission/history/:problem_id",
            get(handlers::submission_history),
        )
        .route("/user/solved", get(handlers::solved_problems))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_endpoint))
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new().merge(routes()).with_state(state)
}
