//! JSON routes under `/api/v1`. Every handler authenticates through
//! [`AuthUser`](crate::auth::AuthUser) and delegates the rules to `imprest-core`.

use axum::extract::rejection::JsonRejection;
use axum::routing::{get, post};
use axum::Router;

use imprest_core::errors::AdvanceError;

use crate::error::ApiError;
use crate::state::AppState;

pub mod advances;
pub mod dashboard;
pub mod expenses;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/advances", post(advances::submit).get(advances::list_own))
        .route("/api/v1/advances/{id}", get(advances::get_one))
        .route("/api/v1/advances/{id}/approve", post(advances::approve))
        .route("/api/v1/advances/{id}/reject", post(advances::reject))
        .route("/api/v1/approvals/pending", get(advances::list_pending))
        .route(
            "/api/v1/advances/{id}/expenses",
            post(expenses::record).get(expenses::list_for_advance),
        )
        .route("/api/v1/advances/{id}/close", post(expenses::close))
        .route("/api/v1/dashboard", get(dashboard::stats))
        .with_state(state)
}

/// Malformed or missing JSON bodies are reported in the same error shape as
/// every other refusal.
pub(crate) fn invalid_body(rejection: JsonRejection, correlation_id: &str) -> ApiError {
    ApiError::new(
        AdvanceError::InvalidArgument(format!("invalid request body: {}", rejection.body_text())),
        correlation_id,
    )
}
