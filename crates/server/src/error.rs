//! Maps `InterfaceError` onto HTTP responses.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use imprest_core::errors::{ApplicationError, InterfaceError, InterfaceErrorKind};

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub correlation_id: String,
}

#[derive(Debug, Clone)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    pub fn new(error: impl Into<ApplicationError>, correlation_id: &str) -> Self {
        Self(error.into().into_interface(correlation_id))
    }

    pub fn unauthenticated(message: &str, correlation_id: &str) -> Self {
        Self::new(ApplicationError::Unauthenticated(message.to_owned()), correlation_id)
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Attaches the request's correlation id while converting an error.
pub trait ApiResultExt<T> {
    fn or_api(self, correlation_id: &str) -> Result<T, ApiError>;
}

impl<T, E> ApiResultExt<T> for Result<T, E>
where
    E: Into<ApplicationError>,
{
    fn or_api(self, correlation_id: &str) -> Result<T, ApiError> {
        self.map_err(|error| ApiError::new(error, correlation_id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let interface = self.0;

        if interface.kind == InterfaceErrorKind::Internal {
            error!(
                event_name = "api.request.failed",
                correlation_id = %interface.correlation_id,
                error_code = interface.error_code(),
                detail = interface.detail.as_deref().unwrap_or(&interface.message),
                "request failed with internal error"
            );
        } else {
            debug!(
                event_name = "api.request.refused",
                correlation_id = %interface.correlation_id,
                error_code = interface.error_code(),
                status = status.as_u16(),
                "request refused"
            );
        }

        let body = ErrorBody {
            error: interface.error_code().to_owned(),
            message: interface.user_message().to_owned(),
            correlation_id: interface.correlation_id.clone(),
        };

        let mut response = (status, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&interface.correlation_id) {
            response.headers_mut().insert(CORRELATION_HEADER, value);
        }
        response
    }
}
