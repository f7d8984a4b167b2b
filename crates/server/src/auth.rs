//! `AuthUser` extractor: resolves a bearer token to the caller's profile.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::Utc;
use uuid::Uuid;

use imprest_core::domain::profile::Profile;
use imprest_core::errors::StoreError;
use imprest_core::session::SessionToken;

use crate::error::{ApiError, ApiResultExt, CORRELATION_HEADER};
use crate::state::AppState;

/// The authenticated caller plus the correlation id of the current request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub profile: Profile,
    pub correlation_id: String,
}

/// Reuses a caller-supplied `x-correlation-id` when it is sane, otherwise
/// mints a fresh one.
pub fn correlation_id(parts: &Parts) -> String {
    parts
        .headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(parts);

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthenticated("missing bearer token", &correlation_id))?;

        let token = SessionToken::from_bearer_header(header).ok_or_else(|| {
            ApiError::unauthenticated("malformed Authorization header", &correlation_id)
        })?;

        let session = state
            .sessions
            .find_active(&token.digest(), Utc::now())
            .await
            .map_err(StoreError::from)
            .or_api(&correlation_id)?
            .ok_or_else(|| {
                ApiError::unauthenticated("invalid or expired session", &correlation_id)
            })?;

        let profile = state
            .profiles
            .find_by_id(&session.profile_id)
            .await
            .map_err(StoreError::from)
            .or_api(&correlation_id)?
            .ok_or_else(|| {
                ApiError::unauthenticated("session profile no longer exists", &correlation_id)
            })?;

        Ok(AuthUser { profile, correlation_id })
    }
}
