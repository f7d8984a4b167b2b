use axum::extract::State;
use axum::Json;

use imprest_core::dashboard::DashboardStats;
use imprest_core::errors::StoreError;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResultExt};
use crate::state::AppState;

pub async fn stats(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<DashboardStats>, ApiError> {
    let cid = auth.correlation_id.as_str();
    let viewer = &auth.profile.id;

    let own =
        state.advances.list_for_requester(viewer).await.map_err(StoreError::from).or_api(cid)?;
    let expenses =
        state.expenses.list_for_requester(viewer).await.map_err(StoreError::from).or_api(cid)?;
    let assigned = state
        .advances
        .list_pending_for_approver(viewer)
        .await
        .map_err(StoreError::from)
        .or_api(cid)?;

    Ok(Json(DashboardStats::compute(viewer, &own, &expenses, &assigned)))
}
