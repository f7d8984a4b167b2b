use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::advance::{Advance, AdvanceStatus};
use crate::domain::expense::Expense;
use crate::domain::profile::ActorId;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending_approval: usize,
    pub approved: usize,
    pub rejected: usize,
    pub closed: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub counts: StatusCounts,
    pub total_requested: Decimal,
    /// Approved and closed advances.
    pub total_approved: Decimal,
    pub pending_amount: Decimal,
    pub total_expenses: Decimal,
    /// Pending advances on which `viewer` is the assigned approver.
    pub awaiting_my_decision: usize,
}

impl DashboardStats {
    /// Folds the viewer's own advances, their expenses, and the advances the
    /// viewer has to decide into one summary.
    pub fn compute(
        viewer: &ActorId,
        own_advances: &[Advance],
        expenses: &[Expense],
        assigned: &[Advance],
    ) -> Self {
        let mut stats = own_advances.iter().fold(Self::default(), |mut stats, advance| {
            stats.total_requested += advance.amount;
            match advance.status {
                AdvanceStatus::PendingApproval => {
                    stats.counts.pending_approval += 1;
                    stats.pending_amount += advance.amount;
                }
                AdvanceStatus::Approved => {
                    stats.counts.approved += 1;
                    stats.total_approved += advance.amount;
                }
                AdvanceStatus::Rejected => stats.counts.rejected += 1,
                AdvanceStatus::Closed => {
                    stats.counts.closed += 1;
                    stats.total_approved += advance.amount;
                }
            }
            stats
        });

        stats.total_expenses = expenses
            .iter()
            .filter(|expense| own_advances.iter().any(|advance| advance.id == expense.advance_id))
            .map(|expense| expense.amount)
            .sum();
        stats.awaiting_my_decision = assigned
            .iter()
            .filter(|advance| {
                &advance.approver_id == viewer && advance.status == AdvanceStatus::PendingApproval
            })
            .count();

        stats
    }
}
