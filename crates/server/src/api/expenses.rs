use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use imprest_core::approvals::AdvanceStore;
use imprest_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use imprest_core::domain::advance::{Advance, AdvanceId};
use imprest_core::domain::expense::{Expense, ExpenseDraft};
use imprest_core::errors::{AdvanceError, StoreError};
use imprest_core::reconciliation::{self, authorize_expense, Settlement};

use super::advances::load_visible;
use super::invalid_body;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResultExt};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CloseResponse {
    pub advance: Advance,
    pub settlement: Settlement,
}

pub async fn record(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthUser,
    body: Result<Json<ExpenseDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Expense>), ApiError> {
    let cid = auth.correlation_id.as_str();
    let Json(draft) = body.map_err(|rejection| invalid_body(rejection, cid))?;
    let advance_id = AdvanceId(id);

    let advance = load_visible(&state, &auth, &advance_id).await?;
    authorize_expense(&auth.profile.id, &advance).or_api(cid)?;
    draft.validate().or_api(cid)?;

    let expense = draft.into_expense(advance_id.clone(), Utc::now());
    let recorded = state.expenses.insert(&expense).await.map_err(StoreError::from).or_api(cid)?;
    if !recorded {
        return Err(ApiError::new(refused_insert(&state, &advance_id).await, cid));
    }

    state.audit.emit(
        AuditEvent::new(
            Some(advance_id),
            cid,
            "expense.record",
            AuditCategory::Reconciliation,
            auth.profile.id.as_str(),
            AuditOutcome::Success,
        )
        .with_metadata("expense_id", expense.id.0.as_str())
        .with_metadata("amount", expense.amount.to_string()),
    );

    Ok((StatusCode::CREATED, Json(expense)))
}

/// Explains an insert the store refused: the advance left `approved` after
/// the handler's check, or disappeared.
async fn refused_insert(state: &AppState, advance_id: &AdvanceId) -> AdvanceError {
    match state.advances.find_advance(advance_id).await {
        Ok(Some(current)) => {
            AdvanceError::Conflict { advance_id: advance_id.clone(), current: current.status }
        }
        Ok(None) => AdvanceError::NotFound(advance_id.clone()),
        Err(error) => error.into(),
    }
}

pub async fn list_for_advance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthUser,
) -> Result<Json<Vec<Expense>>, ApiError> {
    let advance = load_visible(&state, &auth, &AdvanceId(id)).await?;
    let expenses = state
        .expenses
        .list_for_advance(&advance.id)
        .await
        .map_err(StoreError::from)
        .or_api(&auth.correlation_id)?;
    Ok(Json(expenses))
}

pub async fn close(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthUser,
) -> Result<Json<CloseResponse>, ApiError> {
    let cid = auth.correlation_id.as_str();
    let advance = reconciliation::close(
        state.advances.as_ref(),
        &auth.profile.id,
        &AdvanceId(id),
        Some(state.audit.as_ref()),
        cid,
    )
    .await
    .or_api(cid)?;

    let expenses = state
        .expenses
        .list_for_advance(&advance.id)
        .await
        .map_err(StoreError::from)
        .or_api(cid)?;
    let settlement = Settlement::compute(&advance, &expenses);

    info!(
        event_name = "api.advance.closed",
        correlation_id = %cid,
        advance_id = %advance.id,
        balance = %settlement.balance,
        "advance closed"
    );

    Ok(Json(CloseResponse { advance, settlement }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use chrono::Utc;

    use imprest_core::approvals::{AdvanceStore, GuardedUpdate};
    use imprest_core::domain::advance::{Advance, AdvanceId, AdvanceStatus, Transition};
    use imprest_core::errors::AdvanceError;

    use super::refused_insert;
    use crate::api::testing::TestApp;

    async fn approved(app: &TestApp, amount: i64) -> Advance {
        let advance = app.insert_pending("emp", amount).await;
        let mgr = app.token_for("mgr").await;
        let uri = format!("/api/v1/advances/{}/approve", advance.id);
        let (status, _) = app.call(Method::POST, &uri, Some(&mgr), None).await;
        assert_eq!(status, StatusCode::OK);
        advance
    }

    #[tokio::test]
    async fn expenses_require_an_approved_advance() {
        let app = TestApp::new().await;
        let advance = app.insert_pending("emp", 300).await;
        let emp = app.token_for("emp").await;

        let (status, body) = app
            .call(
                Method::POST,
                &format!("/api/v1/advances/{}/expenses", advance.id),
                Some(&emp),
                Some(json!({ "description": "Taxi", "amount": "20.00", "spent_on": "2026-05-02" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "CONFLICT");
    }

    #[tokio::test]
    async fn only_requester_records_and_amount_must_be_positive() {
        let app = TestApp::new().await;
        let advance = approved(&app, 300).await;
        let uri = format!("/api/v1/advances/{}/expenses", advance.id);
        let emp = app.token_for("emp").await;
        let mgr = app.token_for("mgr").await;

        let (status, _) = app
            .call(
                Method::POST,
                &uri,
                Some(&mgr),
                Some(json!({ "description": "Taxi", "amount": "20.00", "spent_on": "2026-05-02" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .call(
                Method::POST,
                &uri,
                Some(&emp),
                Some(json!({ "description": "Taxi", "amount": "-1", "spent_on": "2026-05-02" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_ARGUMENT");

        let (status, created) = app
            .call(
                Method::POST,
                &uri,
                Some(&emp),
                Some(json!({ "description": "Taxi", "amount": "20.00", "spent_on": "2026-05-02" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["category"], "general");

        let (status, listed) = app.call(Method::GET, &uri, Some(&mgr), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn close_settles_and_blocks_further_expenses() {
        let app = TestApp::new().await;
        let advance = approved(&app, 300).await;
        let emp = app.token_for("emp").await;
        let expenses_uri = format!("/api/v1/advances/{}/expenses", advance.id);

        for (description, amount) in [("Hotel", "180.00"), ("Meals", "45.50")] {
            let (status, _) = app
                .call(
                    Method::POST,
                    &expenses_uri,
                    Some(&emp),
                    Some(json!({
                        "description": description,
                        "category": "travel",
                        "amount": amount,
                        "spent_on": "2026-05-03"
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let close_uri = format!("/api/v1/advances/{}/close", advance.id);
        let (status, body) = app.call(Method::POST, &close_uri, Some(&emp), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["advance"]["status"], "closed");
        assert_eq!(body["settlement"]["spent"], "225.50");
        assert_eq!(body["settlement"]["balance"], "74.50");
        assert_eq!(body["settlement"]["expense_count"], 2);

        let (status, _) = app.call(Method::POST, &close_uri, Some(&emp), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = app
            .call(
                Method::POST,
                &expenses_uri,
                Some(&emp),
                Some(json!({
                    "description": "Late taxi",
                    "amount": "9.00",
                    "spent_on": "2026-05-04"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let closes: Vec<_> = app
            .audit
            .events()
            .into_iter()
            .filter(|event| event.event_type == "advance.close")
            .collect();
        assert_eq!(closes.len(), 2);
    }

    #[tokio::test]
    async fn refused_insert_reports_the_status_a_close_left_behind() {
        let app = TestApp::new().await;
        let advance = approved(&app, 300).await;
        let close = Transition::Close { at: Utc::now() };
        let closed = app.state.advances.apply_guarded(&advance.id, &close).await.expect("close");
        assert!(matches!(closed, GuardedUpdate::Applied(_)));

        assert!(matches!(
            refused_insert(&app.state, &advance.id).await,
            AdvanceError::Conflict { current: AdvanceStatus::Closed, .. }
        ));
        assert!(matches!(
            refused_insert(&app.state, &AdvanceId("missing".into())).await,
            AdvanceError::NotFound(_)
        ));
    }
}
