pub mod approvals;
pub mod audit;
pub mod config;
pub mod dashboard;
pub mod domain;
pub mod errors;
pub mod reconciliation;
pub mod session;
pub mod submission;

pub use approvals::{AdvanceStore, ApprovalGate, Decision, GuardedUpdate};
pub use audit::{
    AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, TracingAuditSink,
};
pub use dashboard::{DashboardStats, StatusCounts};
pub use domain::advance::{Advance, AdvanceDraft, AdvanceId, AdvanceStatus, Transition};
pub use domain::expense::{Expense, ExpenseDraft, ExpenseId};
pub use domain::profile::{Actor, ActorId, Profile, Role, Team, TeamId};
pub use errors::{
    AdvanceError, ApplicationError, DomainError, InterfaceError, InterfaceErrorKind, StoreError,
};
pub use reconciliation::{Settlement, SettlementDirection};
pub use session::{Session, SessionToken};
