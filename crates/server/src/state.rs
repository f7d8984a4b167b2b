use std::sync::Arc;

use imprest_core::audit::{AuditSink, TracingAuditSink};
use imprest_db::repositories::{
    AdvanceRepository, ExpenseRepository, ProfileRepository, SessionRepository,
    SqlAdvanceRepository, SqlExpenseRepository, SqlProfileRepository, SqlSessionRepository,
    SqlTeamRepository, TeamRepository,
};
use imprest_db::DbPool;

/// Shared handles for the API routes.
#[derive(Clone)]
pub struct AppState {
    pub profiles: Arc<dyn ProfileRepository>,
    pub teams: Arc<dyn TeamRepository>,
    pub advances: Arc<dyn AdvanceRepository>,
    pub expenses: Arc<dyn ExpenseRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub audit: Arc<dyn AuditSink>,
}

impl AppState {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            profiles: Arc::new(SqlProfileRepository::new(pool.clone())),
            teams: Arc::new(SqlTeamRepository::new(pool.clone())),
            advances: Arc::new(SqlAdvanceRepository::new(pool.clone())),
            expenses: Arc::new(SqlExpenseRepository::new(pool.clone())),
            sessions: Arc::new(SqlSessionRepository::new(pool)),
            audit: Arc::new(TracingAuditSink),
        }
    }
}
