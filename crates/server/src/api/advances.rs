use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use imprest_core::approvals::ApprovalGate;
use imprest_core::audit::{AuditCategory, AuditEvent, AuditOutcome};
use imprest_core::domain::advance::{Advance, AdvanceDraft, AdvanceId};
use imprest_core::errors::{AdvanceError, StoreError};
use imprest_core::reconciliation::authorize_view;
use imprest_core::submission;

use super::invalid_body;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResultExt};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitAdvanceRequest {
    pub amount: Decimal,
    pub purpose: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: String,
}

pub async fn submit(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Result<Json<SubmitAdvanceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Advance>), ApiError> {
    let cid = auth.correlation_id.as_str();
    let Json(body) = body.map_err(|rejection| invalid_body(rejection, cid))?;

    let team = match &auth.profile.team_id {
        Some(team_id) => {
            state.teams.find_by_id(team_id).await.map_err(StoreError::from).or_api(cid)?
        }
        None => None,
    };

    let draft = AdvanceDraft { amount: body.amount, purpose: body.purpose };
    let advance = match submission::prepare(&auth.profile, team.as_ref(), draft, Utc::now()) {
        Ok(advance) => advance,
        Err(error) => {
            state.audit.emit(
                AuditEvent::new(
                    None,
                    cid,
                    "advance.submit",
                    AuditCategory::Submission,
                    auth.profile.id.as_str(),
                    AuditOutcome::Rejected,
                )
                .with_metadata("error_kind", error.kind()),
            );
            return Err(ApiError::new(error, cid));
        }
    };

    state.advances.insert(&advance).await.map_err(StoreError::from).or_api(cid)?;

    state.audit.emit(
        AuditEvent::new(
            Some(advance.id.clone()),
            cid,
            "advance.submit",
            AuditCategory::Submission,
            auth.profile.id.as_str(),
            AuditOutcome::Success,
        )
        .with_metadata("amount", advance.amount.to_string())
        .with_metadata("approver_id", advance.approver_id.as_str()),
    );
    info!(
        event_name = "api.advance.submitted",
        correlation_id = %cid,
        advance_id = %advance.id,
        requester_id = %advance.requester_id,
        "advance submitted"
    );

    Ok((StatusCode::CREATED, Json(advance)))
}

pub async fn list_own(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Advance>>, ApiError> {
    let advances = state
        .advances
        .list_for_requester(&auth.profile.id)
        .await
        .map_err(StoreError::from)
        .or_api(&auth.correlation_id)?;
    Ok(Json(advances))
}

pub async fn list_pending(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Advance>>, ApiError> {
    let advances = state
        .advances
        .list_pending_for_approver(&auth.profile.id)
        .await
        .map_err(StoreError::from)
        .or_api(&auth.correlation_id)?;
    Ok(Json(advances))
}

/// Loads an advance the caller may see: `NotFound` first, then `Forbidden`.
pub(crate) async fn load_visible(
    state: &AppState,
    auth: &AuthUser,
    id: &AdvanceId,
) -> Result<Advance, ApiError> {
    let cid = auth.correlation_id.as_str();
    let advance = state
        .advances
        .find_by_id(id)
        .await
        .map_err(StoreError::from)
        .or_api(cid)?
        .ok_or_else(|| ApiError::new(AdvanceError::NotFound(id.clone()), cid))?;
    authorize_view(&auth.profile.id, &advance).or_api(cid)?;
    Ok(advance)
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthUser,
) -> Result<Json<Advance>, ApiError> {
    load_visible(&state, &auth, &AdvanceId(id)).await.map(Json)
}

pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthUser,
) -> Result<Json<Advance>, ApiError> {
    let gate = ApprovalGate::new(state.advances.as_ref())
        .with_audit(state.audit.as_ref())
        .with_correlation_id(auth.correlation_id.as_str());

    let advance =
        gate.approve(&auth.profile.as_actor(), &AdvanceId(id)).await.or_api(&auth.correlation_id)?;
    Ok(Json(advance))
}

pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    auth: AuthUser,
    body: Result<Json<RejectRequest>, JsonRejection>,
) -> Result<Json<Advance>, ApiError> {
    let cid = auth.correlation_id.as_str();
    let Json(body) = body.map_err(|rejection| invalid_body(rejection, cid))?;

    let gate = ApprovalGate::new(state.advances.as_ref())
        .with_audit(state.audit.as_ref())
        .with_correlation_id(cid);

    let advance =
        gate.reject(&auth.profile.as_actor(), &AdvanceId(id), body.reason).await.or_api(cid)?;
    Ok(Json(advance))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use imprest_core::audit::AuditOutcome;
    use imprest_core::domain::advance::AdvanceStatus;
    use imprest_db::repositories::AdvanceRepository;

    use crate::api::testing::TestApp;

    #[tokio::test]
    async fn requests_without_valid_token_are_unauthenticated() {
        let app = TestApp::new().await;

        let (status, body) = app.call(Method::GET, "/api/v1/advances", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "UNAUTHENTICATED");

        let (status, _) =
            app.call(Method::GET, "/api/v1/advances", Some("not-a-session"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn submit_assigns_team_manager_and_lists_newest_first() {
        let app = TestApp::new().await;
        let token = app.token_for("emp").await;

        let (status, created) = app
            .call(
                Method::POST,
                "/api/v1/advances",
                Some(&token),
                Some(json!({ "amount": "250.00", "purpose": "Trade fair" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "pending_approval");
        assert_eq!(created["approver_id"], "mgr");
        assert_eq!(created["requester_id"], "emp");

        let (status, listed) = app.call(Method::GET, "/api/v1/advances", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().map(Vec::len), Some(1));
        assert_eq!(listed[0]["id"], created["id"]);

        let events = app.audit.events();
        assert_eq!(events.last().map(|event| event.event_type.as_str()), Some("advance.submit"));
    }

    #[tokio::test]
    async fn submit_validates_input_and_team_membership() {
        let app = TestApp::new().await;
        let emp = app.token_for("emp").await;
        let outsider = app.token_for("outsider").await;

        let (status, body) = app
            .call(
                Method::POST,
                "/api/v1/advances",
                Some(&emp),
                Some(json!({ "amount": "0", "purpose": "Trip" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_ARGUMENT");

        let (status, _) = app
            .call(
                Method::POST,
                "/api/v1/advances",
                Some(&outsider),
                Some(json!({ "amount": "10", "purpose": "Trip" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .call(Method::POST, "/api/v1/advances", Some(&emp), Some(json!({ "amount": 5 })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap_or_default().contains("invalid request body"));
    }

    #[tokio::test]
    async fn approver_approves_once_then_conflicts() {
        let app = TestApp::new().await;
        let advance = app.insert_pending("emp", 500).await;
        let mgr = app.token_for("mgr").await;
        let uri = format!("/api/v1/advances/{}/approve", advance.id);

        let (status, body) = app.call(Method::POST, &uri, Some(&mgr), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "approved");
        assert_eq!(body["manager_id"], "mgr");

        let reject_uri = format!("/api/v1/advances/{}/reject", advance.id);
        let (status, body) = app
            .call(Method::POST, &reject_uri, Some(&mgr), Some(json!({ "reason": "changed mind" })))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "CONFLICT");
        assert!(body["message"].as_str().unwrap_or_default().contains("approved"));
    }

    #[tokio::test]
    async fn non_approver_is_forbidden_and_missing_is_not_found() {
        let app = TestApp::new().await;
        let advance = app.insert_pending("emp", 500).await;
        let peer = app.token_for("peer").await;

        let uri = format!("/api/v1/advances/{}/approve", advance.id);
        let (status, body) = app.call(Method::POST, &uri, Some(&peer), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "FORBIDDEN");

        let (status, _) =
            app.call(Method::POST, "/api/v1/advances/nope/approve", Some(&peer), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let stored = app.state.advances.find_by_id(&advance.id).await.expect("find").expect("row");
        assert_eq!(stored.status, AdvanceStatus::PendingApproval);
    }

    #[tokio::test]
    async fn over_limit_approval_is_unprocessable() {
        let app = TestApp::new().await;
        let advance = app.insert_pending("emp", 1500).await;
        let mgr = app.token_for("mgr").await;

        let uri = format!("/api/v1/advances/{}/approve", advance.id);
        let (status, body) = app.call(Method::POST, &uri, Some(&mgr), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "LIMIT_EXCEEDED");

        let events = app.audit.events();
        let last = events.last().expect("audited");
        assert_eq!(last.outcome, AuditOutcome::Rejected);
        assert_eq!(last.metadata.get("error_kind").map(String::as_str), Some("limit_exceeded"));
    }

    #[tokio::test]
    async fn reject_requires_reason() {
        let app = TestApp::new().await;
        let advance = app.insert_pending("emp", 100).await;
        let mgr = app.token_for("mgr").await;
        let uri = format!("/api/v1/advances/{}/reject", advance.id);

        let (status, _) =
            app.call(Method::POST, &uri, Some(&mgr), Some(json!({ "reason": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = app.call(Method::POST, &uri, Some(&mgr), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .call(Method::POST, &uri, Some(&mgr), Some(json!({ "reason": "No budget left" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "rejected");
        assert_eq!(body["rejection_reason"], "No budget left");
    }

    #[tokio::test]
    async fn pending_queue_and_visibility() {
        let app = TestApp::new().await;
        let advance = app.insert_pending("emp", 100).await;
        let mgr = app.token_for("mgr").await;
        let peer = app.token_for("peer").await;

        let (status, pending) =
            app.call(Method::GET, "/api/v1/approvals/pending", Some(&mgr), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending[0]["id"], advance.id.0.as_str());

        let uri = format!("/api/v1/advances/{}", advance.id);
        let (status, _) = app.call(Method::GET, &uri, Some(&mgr), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call(Method::GET, &uri, Some(&peer), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
