use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::advance::{AdvanceId, AdvanceStatus};
use crate::domain::profile::ActorId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid advance transition from {from} to {to}")]
    InvalidAdvanceTransition { from: AdvanceStatus, to: AdvanceStatus },
    #[error("{0}")]
    InvalidInput(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failure at the persistence boundary.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored record could not be decoded: {0}")]
    Decode(String),
}

/// Outcomes of operations on a single advance that callers must report
/// specifically. All of them are terminal for the current call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AdvanceError {
    #[error("advance `{0}` was not found")]
    NotFound(AdvanceId),
    #[error("actor `{actor_id}` may not act on advance `{advance_id}`")]
    Forbidden { actor_id: ActorId, advance_id: AdvanceId },
    #[error("advance `{advance_id}` is already {current}")]
    Conflict { advance_id: AdvanceId, current: AdvanceStatus },
    #[error("amount {amount} exceeds approval limit {limit}")]
    LimitExceeded { amount: Decimal, limit: Decimal },
    #[error("{0}")]
    InvalidArgument(String),
    #[error("transport failure: {0}")]
    TransportFailure(String),
}

impl From<StoreError> for AdvanceError {
    fn from(value: StoreError) -> Self {
        Self::TransportFailure(value.to_string())
    }
}

impl AdvanceError {
    pub fn is_business_refusal(&self) -> bool {
        !matches!(self, Self::TransportFailure(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden { .. } => "forbidden",
            Self::Conflict { .. } => "conflict",
            Self::LimitExceeded { .. } => "limit_exceeded",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::TransportFailure(_) => "transport_failure",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Advance(#[from] AdvanceError),
    #[error("authentication required: {0}")]
    Unauthenticated(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterfaceErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Unprocessable,
    Internal,
}

/// Transport-neutral error handed to adapters (HTTP, CLI).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct InterfaceError {
    pub kind: InterfaceErrorKind,
    pub message: String,
    /// Operator-only detail; never shown to the caller.
    pub detail: Option<String>,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn status_code(&self) -> u16 {
        match self.kind {
            InterfaceErrorKind::BadRequest => 400,
            InterfaceErrorKind::Unauthorized => 401,
            InterfaceErrorKind::Forbidden => 403,
            InterfaceErrorKind::NotFound => 404,
            InterfaceErrorKind::Conflict => 409,
            InterfaceErrorKind::Unprocessable => 422,
            InterfaceErrorKind::Internal => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self.kind {
            InterfaceErrorKind::BadRequest => "INVALID_ARGUMENT",
            InterfaceErrorKind::Unauthorized => "UNAUTHENTICATED",
            InterfaceErrorKind::Forbidden => "FORBIDDEN",
            InterfaceErrorKind::NotFound => "NOT_FOUND",
            InterfaceErrorKind::Conflict => "CONFLICT",
            InterfaceErrorKind::Unprocessable => "LIMIT_EXCEEDED",
            InterfaceErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    pub fn user_message(&self) -> &str {
        match self.kind {
            InterfaceErrorKind::Internal => "An unexpected internal error occurred.",
            _ => &self.message,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let mut mapped = InterfaceError::from(self);
        mapped.correlation_id = correlation_id.into();
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let message = value.to_string();
        let (kind, detail) = match &value {
            ApplicationError::Domain(DomainError::InvalidAdvanceTransition { .. }) => {
                (InterfaceErrorKind::Conflict, None)
            }
            ApplicationError::Domain(_) => (InterfaceErrorKind::BadRequest, None),
            ApplicationError::Advance(error) => match error {
                AdvanceError::NotFound(_) => (InterfaceErrorKind::NotFound, None),
                AdvanceError::Forbidden { .. } => (InterfaceErrorKind::Forbidden, None),
                AdvanceError::Conflict { .. } => (InterfaceErrorKind::Conflict, None),
                AdvanceError::LimitExceeded { .. } => (InterfaceErrorKind::Unprocessable, None),
                AdvanceError::InvalidArgument(_) => (InterfaceErrorKind::BadRequest, None),
                AdvanceError::TransportFailure(_) => {
                    (InterfaceErrorKind::Internal, Some(message.clone()))
                }
            },
            ApplicationError::Unauthenticated(_) => (InterfaceErrorKind::Unauthorized, None),
            ApplicationError::Persistence(_) => {
                (InterfaceErrorKind::Internal, Some(message.clone()))
            }
        };

        Self { kind, message, detail, correlation_id: "unassigned".to_owned() }
    }
}

impl From<AdvanceError> for InterfaceError {
    fn from(value: AdvanceError) -> Self {
        ApplicationError::from(value).into()
    }
}
