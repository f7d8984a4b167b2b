use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use imprest_core::approvals::{AdvanceStore, GuardedUpdate};
use imprest_core::domain::advance::{Advance, AdvanceId, AdvanceStatus, Transition};
use imprest_core::domain::profile::ActorId;
use imprest_core::errors::StoreError;

use super::{
    decode_err, format_timestamp, parse_actor, parse_decimal, parse_optional_timestamp,
    parse_timestamp, AdvanceRepository, RepositoryError,
};
use crate::DbPool;

const ADVANCE_COLUMNS: &str = "id, requester_id, approver_id, amount, purpose, status, \
     rejection_reason, manager_id, approval_date, closed_at, created_at, updated_at";

pub struct SqlAdvanceRepository {
    pool: DbPool,
}

impl SqlAdvanceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_advance(row: &sqlx::sqlite::SqliteRow) -> Result<Advance, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let requester_id: String = row.try_get("requester_id").map_err(decode_err)?;
    let approver_id: String = row.try_get("approver_id").map_err(decode_err)?;
    let amount: String = row.try_get("amount").map_err(decode_err)?;
    let purpose: String = row.try_get("purpose").map_err(decode_err)?;
    let status: String = row.try_get("status").map_err(decode_err)?;
    let rejection_reason: Option<String> = row.try_get("rejection_reason").map_err(decode_err)?;
    let manager_id: Option<String> = row.try_get("manager_id").map_err(decode_err)?;
    let approval_date: Option<String> = row.try_get("approval_date").map_err(decode_err)?;
    let closed_at: Option<String> = row.try_get("closed_at").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;

    Ok(Advance {
        id: AdvanceId(id),
        requester_id: parse_actor("requester_id", requester_id)?,
        approver_id: parse_actor("approver_id", approver_id)?,
        amount: parse_decimal("amount", &amount)?,
        purpose,
        status: status
            .parse::<AdvanceStatus>()
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        rejection_reason,
        manager_id: manager_id.map(|id| parse_actor("manager_id", id)).transpose()?,
        approval_date: parse_optional_timestamp("approval_date", approval_date)?,
        closed_at: parse_optional_timestamp("closed_at", closed_at)?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

/// Column values a transition writes. `None` leaves the column untouched.
struct TransitionColumns {
    manager_id: Option<String>,
    approval_date: Option<String>,
    rejection_reason: Option<String>,
    closed_at: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<&Transition> for TransitionColumns {
    fn from(transition: &Transition) -> Self {
        match transition {
            Transition::Approve { manager_id, at } => Self {
                manager_id: Some(manager_id.as_str().to_owned()),
                approval_date: Some(format_timestamp(*at)),
                rejection_reason: None,
                closed_at: None,
                updated_at: *at,
            },
            Transition::Reject { reason, at } => Self {
                manager_id: None,
                approval_date: None,
                rejection_reason: Some(reason.clone()),
                closed_at: None,
                updated_at: *at,
            },
            Transition::Close { at } => Self {
                manager_id: None,
                approval_date: None,
                rejection_reason: None,
                closed_at: Some(format_timestamp(*at)),
                updated_at: *at,
            },
        }
    }
}

impl SqlAdvanceRepository {
    async fn fetch_by_id(&self, id: &AdvanceId) -> Result<Option<Advance>, RepositoryError> {
        let sql = format!("SELECT {ADVANCE_COLUMNS} FROM advance_request WHERE id = ?");
        let row = sqlx::query(&sql).bind(&id.0).fetch_optional(&self.pool).await?;

        row.as_ref().map(row_to_advance).transpose()
    }

    /// Single-statement conditional write. SQLite serialises writers, so the
    /// `status = ?` predicate is evaluated against the committed row.
    async fn update_if_status(
        &self,
        id: &AdvanceId,
        transition: &Transition,
    ) -> Result<Option<Advance>, RepositoryError> {
        let columns = TransitionColumns::from(transition);
        let row = sqlx::query(&format!(
            "UPDATE advance_request
             SET status = ?,
                 manager_id = COALESCE(?, manager_id),
                 approval_date = COALESCE(?, approval_date),
                 rejection_reason = COALESCE(?, rejection_reason),
                 closed_at = COALESCE(?, closed_at),
                 updated_at = ?
             WHERE id = ? AND status = ?
             RETURNING {ADVANCE_COLUMNS}"
        ))
        .bind(transition.target_status().as_str())
        .bind(&columns.manager_id)
        .bind(&columns.approval_date)
        .bind(&columns.rejection_reason)
        .bind(&columns.closed_at)
        .bind(format_timestamp(columns.updated_at))
        .bind(&id.0)
        .bind(transition.expected_status().as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_advance).transpose()
    }

    async fn fetch_where(
        &self,
        predicate: &str,
        order: &str,
        actor_id: &ActorId,
    ) -> Result<Vec<Advance>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ADVANCE_COLUMNS} FROM advance_request WHERE {predicate} ORDER BY {order}"
        ))
        .bind(actor_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_advance).collect()
    }
}

#[async_trait]
impl AdvanceStore for SqlAdvanceRepository {
    async fn find_advance(&self, id: &AdvanceId) -> Result<Option<Advance>, StoreError> {
        Ok(self.fetch_by_id(id).await?)
    }

    async fn apply_guarded(
        &self,
        id: &AdvanceId,
        transition: &Transition,
    ) -> Result<GuardedUpdate, StoreError> {
        Ok(match self.update_if_status(id, transition).await? {
            Some(advance) => GuardedUpdate::Applied(advance),
            None => GuardedUpdate::Stale,
        })
    }
}

#[async_trait]
impl AdvanceRepository for SqlAdvanceRepository {
    async fn find_by_id(&self, id: &AdvanceId) -> Result<Option<Advance>, RepositoryError> {
        self.fetch_by_id(id).await
    }

    async fn insert(&self, advance: &Advance) -> Result<(), RepositoryError> {
        sqlx::query(&format!(
            "INSERT INTO advance_request ({ADVANCE_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&advance.id.0)
        .bind(advance.requester_id.as_str())
        .bind(advance.approver_id.as_str())
        .bind(advance.amount.to_string())
        .bind(&advance.purpose)
        .bind(advance.status.as_str())
        .bind(&advance.rejection_reason)
        .bind(advance.manager_id.as_ref().map(ActorId::as_str))
        .bind(advance.approval_date.map(format_timestamp))
        .bind(advance.closed_at.map(format_timestamp))
        .bind(format_timestamp(advance.created_at))
        .bind(format_timestamp(advance.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_requester(
        &self,
        requester_id: &ActorId,
    ) -> Result<Vec<Advance>, RepositoryError> {
        self.fetch_where("requester_id = ?", "created_at DESC, id DESC", requester_id).await
    }

    async fn list_pending_for_approver(
        &self,
        approver_id: &ActorId,
    ) -> Result<Vec<Advance>, RepositoryError> {
        self.fetch_where(
            "approver_id = ? AND status = 'pending_approval'",
            "created_at ASC, id ASC",
            approver_id,
        )
        .await
    }
}
