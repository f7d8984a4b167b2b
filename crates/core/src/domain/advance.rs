use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::profile::ActorId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdvanceId(pub String);

impl AdvanceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for AdvanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvanceStatus {
    PendingApproval,
    Approved,
    Rejected,
    Closed,
}

impl AdvanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingApproval => "pending_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for AdvanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AdvanceStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending_approval" => Ok(Self::PendingApproval),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "closed" => Ok(Self::Closed),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown advance status `{other}`")))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advance {
    pub id: AdvanceId,
    pub requester_id: ActorId,
    /// Assigned approver, fixed when the advance is submitted.
    pub approver_id: ActorId,
    pub amount: Decimal,
    pub purpose: String,
    pub status: AdvanceStatus,
    pub rejection_reason: Option<String>,
    /// Who approved it; set together with `approval_date`.
    pub manager_id: Option<ActorId>,
    pub approval_date: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Advance {
    pub fn pending(
        requester_id: ActorId,
        approver_id: ActorId,
        amount: Decimal,
        purpose: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AdvanceId::generate(),
            requester_id,
            approver_id,
            amount,
            purpose: purpose.into(),
            status: AdvanceStatus::PendingApproval,
            rejection_reason: None,
            manager_id: None,
            approval_date: None,
            closed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_visible_to(&self, actor_id: &ActorId) -> bool {
        &self.requester_id == actor_id || &self.approver_id == actor_id
    }

    /// Applies `transition` in memory, enforcing the status guard.
    ///
    /// Stores that cannot push the guard into a single conditional write use
    /// this under their own exclusive lock.
    pub fn apply(&mut self, transition: &Transition) -> Result<(), DomainError> {
        if self.status != transition.expected_status() {
            return Err(DomainError::InvalidAdvanceTransition {
                from: self.status,
                to: transition.target_status(),
            });
        }

        match transition {
            Transition::Approve { manager_id, at } => {
                self.manager_id = Some(manager_id.clone());
                self.approval_date = Some(*at);
                self.updated_at = *at;
            }
            Transition::Reject { reason, at } => {
                self.rejection_reason = Some(reason.clone());
                self.updated_at = *at;
            }
            Transition::Close { at } => {
                self.closed_at = Some(*at);
                self.updated_at = *at;
            }
        }
        self.status = transition.target_status();
        Ok(())
    }
}

/// A status change that is only legal from one source status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Approve { manager_id: ActorId, at: DateTime<Utc> },
    Reject { reason: String, at: DateTime<Utc> },
    Close { at: DateTime<Utc> },
}

impl Transition {
    pub fn expected_status(&self) -> AdvanceStatus {
        match self {
            Self::Approve { .. } | Self::Reject { .. } => AdvanceStatus::PendingApproval,
            Self::Close { .. } => AdvanceStatus::Approved,
        }
    }

    pub fn target_status(&self) -> AdvanceStatus {
        match self {
            Self::Approve { .. } => AdvanceStatus::Approved,
            Self::Reject { .. } => AdvanceStatus::Rejected,
            Self::Close { .. } => AdvanceStatus::Closed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceDraft {
    pub amount: Decimal,
    pub purpose: String,
}

impl AdvanceDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.amount <= Decimal::ZERO {
            return Err(DomainError::InvalidInput("amount must be greater than zero".to_owned()));
        }
        if self.purpose.trim().is_empty() {
            return Err(DomainError::InvalidInput("purpose is required".to_owned()));
        }
        Ok(())
    }
}
