use async_trait::async_trait;
use sqlx::Row;

use imprest_core::domain::profile::{ActorId, Profile, Role, Team, TeamId};

use super::{
    decode_err, format_timestamp, parse_actor, parse_decimal, parse_timestamp, ProfileRepository,
    RepositoryError, TeamRepository,
};
use crate::DbPool;

pub struct SqlProfileRepository {
    pool: DbPool,
}

impl SqlProfileRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_profile(row: &sqlx::sqlite::SqliteRow) -> Result<Profile, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let full_name: String = row.try_get("full_name").map_err(decode_err)?;
    let email: String = row.try_get("email").map_err(decode_err)?;
    let role: String = row.try_get("role").map_err(decode_err)?;
    let team_id: Option<String> = row.try_get("team_id").map_err(decode_err)?;
    let approval_limit: Option<String> = row.try_get("approval_limit").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;

    Ok(Profile {
        id: parse_actor("id", id)?,
        full_name,
        email,
        role: role.parse::<Role>().map_err(|error| RepositoryError::Decode(error.to_string()))?,
        team_id: team_id.map(TeamId),
        approval_limit: approval_limit
            .map(|raw| parse_decimal("approval_limit", &raw))
            .transpose()?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait]
impl ProfileRepository for SqlProfileRepository {
    async fn find_by_id(&self, id: &ActorId) -> Result<Option<Profile>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, full_name, email, role, team_id, approval_limit, created_at
             FROM profile WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_profile).transpose()
    }

    async fn save(&self, profile: Profile) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO profile (id, full_name, email, role, team_id, approval_limit, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 full_name = excluded.full_name,
                 email = excluded.email,
                 role = excluded.role,
                 team_id = excluded.team_id,
                 approval_limit = excluded.approval_limit",
        )
        .bind(profile.id.as_str())
        .bind(&profile.full_name)
        .bind(&profile.email)
        .bind(profile.role.as_str())
        .bind(profile.team_id.as_ref().map(|team| team.0.as_str()))
        .bind(profile.approval_limit.map(|limit| limit.to_string()))
        .bind(format_timestamp(profile.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub struct SqlTeamRepository {
    pool: DbPool,
}

impl SqlTeamRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TeamRepository for SqlTeamRepository {
    async fn find_by_id(&self, id: &TeamId) -> Result<Option<Team>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, manager_id FROM team WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: String = row.try_get("id").map_err(decode_err)?;
        let name: String = row.try_get("name").map_err(decode_err)?;
        let manager_id: String = row.try_get("manager_id").map_err(decode_err)?;

        Ok(Some(Team { id: TeamId(id), name, manager_id: parse_actor("manager_id", manager_id)? }))
    }

    async fn save(&self, team: Team) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO team (id, name, manager_id) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, manager_id = excluded.manager_id",
        )
        .bind(&team.id.0)
        .bind(&team.name)
        .bind(team.manager_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use imprest_core::domain::profile::{ActorId, Profile, Role, Team, TeamId};

    use super::{SqlProfileRepository, SqlTeamRepository};
    use crate::repositories::{truncate_to_micros, ProfileRepository, TeamRepository};
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn profile_and_team_round_trip() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let teams = SqlTeamRepository::new(pool.clone());
        let profiles = SqlProfileRepository::new(pool);

        let team = Team {
            id: TeamId("team-ops".to_string()),
            name: "Operations".to_string(),
            manager_id: ActorId::parse("u-lead").expect("id"),
        };
        teams.save(team.clone()).await.expect("save team");

        let profile = Profile {
            id: ActorId::parse("u-lead").expect("id"),
            full_name: "Olivia Lead".to_string(),
            email: "olivia@imprest.test".to_string(),
            role: Role::Manager,
            team_id: Some(team.id.clone()),
            approval_limit: Some(Decimal::new(150_000, 2)),
            created_at: truncate_to_micros(Utc::now()),
        };
        profiles.save(profile.clone()).await.expect("save profile");

        assert_eq!(teams.find_by_id(&team.id).await.expect("find team"), Some(team));
        assert_eq!(profiles.find_by_id(&profile.id).await.expect("find profile"), Some(profile));
        assert_eq!(
            profiles.find_by_id(&ActorId::parse("ghost").expect("id")).await.expect("find"),
            None
        );
    }

    #[tokio::test]
    async fn saving_again_updates_limit() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let profiles = SqlProfileRepository::new(pool);

        let mut profile = Profile {
            id: ActorId::parse("u-1").expect("id"),
            full_name: "One".to_string(),
            email: "one@imprest.test".to_string(),
            role: Role::Employee,
            team_id: None,
            approval_limit: None,
            created_at: Utc::now(),
        };
        profiles.save(profile.clone()).await.expect("save");
        profile.approval_limit = Some(Decimal::new(500, 0));
        profiles.save(profile.clone()).await.expect("update");

        let stored = profiles.find_by_id(&profile.id).await.expect("find").expect("row");
        assert_eq!(stored.approval_limit, Some(Decimal::new(500, 0)));
    }
}
