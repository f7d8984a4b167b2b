//! The approval gate: one policy for deciding a pending advance, shared by
//! every entry point (HTTP routes, the operator CLI, direct calls).
//!
//! A decision succeeds only when all of the following hold, checked in order:
//!
//! 1. the advance exists (`NotFound`),
//! 2. the actor is its assigned approver (`Forbidden`, before any status is disclosed),
//! 3. it is still `pending_approval` (`Conflict`, reporting the current status),
//! 4. an approval does not exceed the actor's limit (`LimitExceeded`),
//! 5. a rejection carries a non-blank reason (`InvalidArgument`).
//!
//! The write itself is a single conditional update guarded on the pending
//! status. A guard miss means another decision committed first and is reported
//! as `Conflict`.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::advance::{Advance, AdvanceId, AdvanceStatus, Transition};
use crate::domain::profile::Actor;
use crate::errors::{AdvanceError, StoreError};

/// Result of a guarded conditional write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardedUpdate {
    Applied(Advance),
    /// No row matched `id AND status = expected`.
    Stale,
}

#[async_trait]
pub trait AdvanceStore: Send + Sync {
    async fn find_advance(&self, id: &AdvanceId) -> Result<Option<Advance>, StoreError>;

    /// Applies `transition` only while the stored status still equals
    /// `transition.expected_status()`. Must be atomic with respect to other
    /// calls for the same id.
    async fn apply_guarded(
        &self,
        id: &AdvanceId,
        transition: &Transition,
    ) -> Result<GuardedUpdate, StoreError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject { reason: String },
}

impl Decision {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Approve => "advance.approve",
            Self::Reject { .. } => "advance.reject",
        }
    }
}

pub struct ApprovalGate<'a, S: ?Sized> {
    store: &'a S,
    audit: Option<&'a dyn AuditSink>,
    correlation_id: String,
}

impl<'a, S> ApprovalGate<'a, S>
where
    S: AdvanceStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store, audit: None, correlation_id: "unassigned".to_owned() }
    }

    pub fn with_audit(mut self, audit: &'a dyn AuditSink) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub async fn approve(
        &self,
        actor: &Actor,
        advance_id: &AdvanceId,
    ) -> Result<Advance, AdvanceError> {
        self.decide(actor, advance_id, Decision::Approve).await
    }

    pub async fn reject(
        &self,
        actor: &Actor,
        advance_id: &AdvanceId,
        reason: impl Into<String>,
    ) -> Result<Advance, AdvanceError> {
        self.decide(actor, advance_id, Decision::Reject { reason: reason.into() }).await
    }

    pub async fn decide(
        &self,
        actor: &Actor,
        advance_id: &AdvanceId,
        decision: Decision,
    ) -> Result<Advance, AdvanceError> {
        let result = self.try_decide(actor, advance_id, &decision).await;
        self.record(actor, advance_id, &decision, &result);
        result
    }

    async fn try_decide(
        &self,
        actor: &Actor,
        advance_id: &AdvanceId,
        decision: &Decision,
    ) -> Result<Advance, AdvanceError> {
        let advance = self
            .store
            .find_advance(advance_id)
            .await?
            .ok_or_else(|| AdvanceError::NotFound(advance_id.clone()))?;

        if advance.approver_id != actor.id {
            return Err(AdvanceError::Forbidden {
                actor_id: actor.id.clone(),
                advance_id: advance_id.clone(),
            });
        }

        if advance.status != AdvanceStatus::PendingApproval {
            return Err(AdvanceError::Conflict {
                advance_id: advance_id.clone(),
                current: advance.status,
            });
        }

        let now = Utc::now();
        let transition = match decision {
            Decision::Approve => {
                if let Some(limit) = actor.approval_limit {
                    if advance.amount > limit {
                        return Err(AdvanceError::LimitExceeded { amount: advance.amount, limit });
                    }
                }
                Transition::Approve { manager_id: actor.id.clone(), at: now }
            }
            Decision::Reject { reason } => {
                let reason = reason.trim();
                if reason.is_empty() {
                    return Err(AdvanceError::InvalidArgument(
                        "a rejection reason is required".to_owned(),
                    ));
                }
                Transition::Reject { reason: reason.to_owned(), at: now }
            }
        };

        commit_guarded(self.store, advance_id, &transition).await
    }

    fn record(
        &self,
        actor: &Actor,
        advance_id: &AdvanceId,
        decision: &Decision,
        result: &Result<Advance, AdvanceError>,
    ) {
        let Some(audit) = self.audit else {
            return;
        };

        let event = match result {
            Ok(advance) => AuditEvent::new(
                Some(advance_id.clone()),
                &self.correlation_id,
                decision.event_type(),
                AuditCategory::Approval,
                actor.id.as_str(),
                AuditOutcome::Success,
            )
            .with_metadata("status", advance.status.as_str())
            .with_metadata("amount", advance.amount.to_string()),
            Err(error) => AuditEvent::new(
                Some(advance_id.clone()),
                &self.correlation_id,
                decision.event_type(),
                AuditCategory::Approval,
                actor.id.as_str(),
                if error.is_business_refusal() {
                    AuditOutcome::Rejected
                } else {
                    AuditOutcome::Failed
                },
            )
            .with_metadata("error_kind", error.kind())
            .with_metadata("error", error.to_string()),
        };
        audit.emit(event);
    }
}

/// Commits `transition` through the store's guarded write, converting a guard
/// miss into `Conflict` with whatever status won.
pub(crate) async fn commit_guarded<S>(
    store: &S,
    advance_id: &AdvanceId,
    transition: &Transition,
) -> Result<Advance, AdvanceError>
where
    S: AdvanceStore + ?Sized,
{
    match store.apply_guarded(advance_id, transition).await? {
        GuardedUpdate::Applied(advance) => Ok(advance),
        GuardedUpdate::Stale => {
            let current = store
                .find_advance(advance_id)
                .await?
                .ok_or_else(|| AdvanceError::NotFound(advance_id.clone()))?;
            Err(AdvanceError::Conflict { advance_id: advance_id.clone(), current: current.status })
        }
    }
}
