use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use imprest_core::approvals::AdvanceStore;
use imprest_core::domain::advance::{Advance, AdvanceId};
use imprest_core::domain::expense::Expense;
use imprest_core::domain::profile::{ActorId, Profile, Team, TeamId};
use imprest_core::errors::StoreError;
use imprest_core::session::Session;

pub mod advance;
pub mod expense;
pub mod memory;
pub mod profile;
pub mod session;

pub use advance::SqlAdvanceRepository;
pub use expense::SqlExpenseRepository;
pub use memory::{
    InMemoryAdvanceRepository, InMemoryExpenseRepository, InMemoryProfileRepository,
    InMemorySessionRepository, InMemoryTeamRepository,
};
pub use profile::{SqlProfileRepository, SqlTeamRepository};
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => Self::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => Self::Decode(message),
        }
    }
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn find_by_id(&self, id: &ActorId) -> Result<Option<Profile>, RepositoryError>;
    async fn save(&self, profile: Profile) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait TeamRepository: Send + Sync {
    async fn find_by_id(&self, id: &TeamId) -> Result<Option<Team>, RepositoryError>;
    async fn save(&self, team: Team) -> Result<(), RepositoryError>;
}

/// Reads and inserts for advances. Status changes go exclusively through the
/// guarded write of the [`AdvanceStore`] supertrait.
#[async_trait]
pub trait AdvanceRepository: AdvanceStore {
    async fn find_by_id(&self, id: &AdvanceId) -> Result<Option<Advance>, RepositoryError>;
    async fn insert(&self, advance: &Advance) -> Result<(), RepositoryError>;
    /// Newest first.
    async fn list_for_requester(
        &self,
        requester_id: &ActorId,
    ) -> Result<Vec<Advance>, RepositoryError>;
    /// Oldest first, `pending_approval` only.
    async fn list_pending_for_approver(
        &self,
        approver_id: &ActorId,
    ) -> Result<Vec<Advance>, RepositoryError>;
}

#[async_trait]
pub trait ExpenseRepository: Send + Sync {
    /// Writes the expense only while its advance is `approved`. Returns
    /// `false` when the advance is missing or in any other status.
    async fn insert(&self, expense: &Expense) -> Result<bool, RepositoryError>;
    /// Ordered by `spent_on`, then insertion time.
    async fn list_for_advance(&self, advance_id: &AdvanceId)
        -> Result<Vec<Expense>, RepositoryError>;
    /// Every expense recorded on advances requested by `requester_id`.
    async fn list_for_requester(
        &self,
        requester_id: &ActorId,
    ) -> Result<Vec<Expense>, RepositoryError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<(), RepositoryError>;
    /// Returns the session only while `expires_at > now`.
    async fn find_active(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, RepositoryError>;
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.map(|raw| parse_timestamp(column, &raw)).transpose()
}

pub(crate) fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw).map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn parse_date(column: &str, raw: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn parse_actor(column: &str, raw: String) -> Result<ActorId, RepositoryError> {
    ActorId::parse(raw).map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn decode_err(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

/// Round-trip precision of [`format_timestamp`].
#[cfg(test)]
pub(crate) fn truncate_to_micros(value: DateTime<Utc>) -> DateTime<Utc> {
    let formatted = format_timestamp(value);
    DateTime::parse_from_rfc3339(&formatted).map(|v| v.with_timezone(&Utc)).unwrap_or(value)
}
