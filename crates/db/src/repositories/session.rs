use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use imprest_core::session::Session;

use super::{
    decode_err, format_timestamp, parse_actor, parse_timestamp, RepositoryError, SessionRepository,
};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn insert(&self, session: &Session) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO auth_session (token_hash, profile_id, expires_at, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token_hash)
        .bind(session.profile_id.as_str())
        .bind(format_timestamp(session.expires_at))
        .bind(format_timestamp(session.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_active(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(
            "SELECT token_hash, profile_id, expires_at, created_at
             FROM auth_session WHERE token_hash = ? AND expires_at > ?",
        )
        .bind(token_hash)
        .bind(format_timestamp(now))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let token_hash: String = row.try_get("token_hash").map_err(decode_err)?;
        let profile_id: String = row.try_get("profile_id").map_err(decode_err)?;
        let expires_at: String = row.try_get("expires_at").map_err(decode_err)?;
        let created_at: String = row.try_get("created_at").map_err(decode_err)?;

        Ok(Some(Session {
            token_hash,
            profile_id: parse_actor("profile_id", profile_id)?,
            expires_at: parse_timestamp("expires_at", &expires_at)?,
            created_at: parse_timestamp("created_at", &created_at)?,
        }))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM auth_session WHERE expires_at <= ?")
            .bind(format_timestamp(now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
