//! Settling an approved advance against the expenses recorded on it.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::approvals::{commit_guarded, AdvanceStore};
use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::advance::{Advance, AdvanceId, AdvanceStatus, Transition};
use crate::domain::expense::Expense;
use crate::domain::profile::ActorId;
use crate::errors::AdvanceError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementDirection {
    /// Unspent money goes back to the company.
    EmployeeReturns,
    /// The employee spent more than advanced.
    CompanyReimburses,
    Settled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub advance_id: AdvanceId,
    pub advanced: Decimal,
    pub spent: Decimal,
    /// `advanced - spent`.
    pub balance: Decimal,
    pub direction: SettlementDirection,
    pub expense_count: usize,
}

impl Settlement {
    pub fn compute(advance: &Advance, expenses: &[Expense]) -> Self {
        let spent = expenses
            .iter()
            .filter(|expense| expense.advance_id == advance.id)
            .map(|expense| expense.amount)
            .sum::<Decimal>();
        let balance = advance.amount - spent;
        let direction = if balance > Decimal::ZERO {
            SettlementDirection::EmployeeReturns
        } else if balance < Decimal::ZERO {
            SettlementDirection::CompanyReimburses
        } else {
            SettlementDirection::Settled
        };

        Self {
            advance_id: advance.id.clone(),
            advanced: advance.amount,
            spent,
            balance,
            direction,
            expense_count: expenses.iter().filter(|e| e.advance_id == advance.id).count(),
        }
    }
}

/// Only the requester may record expenses, and only on an approved advance.
pub fn authorize_expense(actor_id: &ActorId, advance: &Advance) -> Result<(), AdvanceError> {
    ensure_requester(actor_id, advance)?;
    if advance.status != AdvanceStatus::Approved {
        return Err(AdvanceError::Conflict {
            advance_id: advance.id.clone(),
            current: advance.status,
        });
    }
    Ok(())
}

pub fn authorize_view(actor_id: &ActorId, advance: &Advance) -> Result<(), AdvanceError> {
    if advance.is_visible_to(actor_id) {
        Ok(())
    } else {
        Err(AdvanceError::Forbidden { actor_id: actor_id.clone(), advance_id: advance.id.clone() })
    }
}

fn ensure_requester(actor_id: &ActorId, advance: &Advance) -> Result<(), AdvanceError> {
    if &advance.requester_id != actor_id {
        return Err(AdvanceError::Forbidden {
            actor_id: actor_id.clone(),
            advance_id: advance.id.clone(),
        });
    }
    Ok(())
}

/// Moves an approved advance to `closed` through the same guarded write the
/// approval gate uses.
pub async fn close<S>(
    store: &S,
    actor_id: &ActorId,
    advance_id: &AdvanceId,
    audit: Option<&dyn AuditSink>,
    correlation_id: &str,
) -> Result<Advance, AdvanceError>
where
    S: AdvanceStore + ?Sized,
{
    let result = try_close(store, actor_id, advance_id).await;

    if let Some(audit) = audit {
        let event = AuditEvent::new(
            Some(advance_id.clone()),
            correlation_id,
            "advance.close",
            AuditCategory::Reconciliation,
            actor_id.as_str(),
            match &result {
                Ok(_) => AuditOutcome::Success,
                Err(error) if error.is_business_refusal() => AuditOutcome::Rejected,
                Err(_) => AuditOutcome::Failed,
            },
        );
        let event = match &result {
            Ok(advance) => event.with_metadata("status", advance.status.as_str()),
            Err(error) => event.with_metadata("error_kind", error.kind()),
        };
        audit.emit(event);
    }

    result
}

async fn try_close<S>(
    store: &S,
    actor_id: &ActorId,
    advance_id: &AdvanceId,
) -> Result<Advance, AdvanceError>
where
    S: AdvanceStore + ?Sized,
{
    let advance = store
        .find_advance(advance_id)
        .await?
        .ok_or_else(|| AdvanceError::NotFound(advance_id.clone()))?;
    ensure_requester(actor_id, &advance)?;
    if advance.status != AdvanceStatus::Approved {
        return Err(AdvanceError::Conflict {
            advance_id: advance_id.clone(),
            current: advance.status,
        });
    }

    commit_guarded(store, advance_id, &Transition::Close { at: Utc::now() }).await
}
