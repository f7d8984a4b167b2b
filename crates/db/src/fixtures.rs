use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Demo organisation used by `imprest seed` and local smoke runs.
///
/// Every insert is `INSERT OR IGNORE`, so loading twice is a no-op.
pub struct DemoSeedDataset;

/// Expected row for each seeded advance: id, status, requester, approver.
const SEED_ADVANCES: &[(&str, &str, &str, &str)] = &[
    ("adv-demo-pending", "pending_approval", "u-ana", "u-maria"),
    ("adv-demo-over-limit", "pending_approval", "u-ben", "u-maria"),
    ("adv-demo-approved", "approved", "u-ana", "u-maria"),
    ("adv-demo-rejected", "rejected", "u-ben", "u-maria"),
];

const SEED_PROFILE_IDS: &[&str] = &["u-admin", "u-maria", "u-ana", "u-ben"];
const SEED_TEAM_IDS: &[&str] = &["team-field", "team-finance"];
const SEED_EXPENSE_IDS: &[&str] = &["exp-demo-train", "exp-demo-hotel"];

impl DemoSeedDataset {
    pub const SQL: &'static str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            profiles: SEED_PROFILE_IDS.to_vec(),
            advances: SEED_ADVANCES.iter().map(|(id, ..)| *id).collect(),
        })
    }

    /// Checks that every seeded row exists with its seeded shape. Advances
    /// that were decided after seeding fail their check.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for team_id in SEED_TEAM_IDS {
            let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM team WHERE id = ?1)")
                .bind(team_id)
                .fetch_one(pool)
                .await?;
            checks.push((*team_id, exists == 1));
        }

        for profile_id in SEED_PROFILE_IDS {
            let exists: i64 =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM profile WHERE id = ?1)")
                    .bind(profile_id)
                    .fetch_one(pool)
                    .await?;
            checks.push((*profile_id, exists == 1));
        }

        for (id, status, requester, approver) in SEED_ADVANCES {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM advance_request
                               WHERE id = ?1 AND status = ?2
                                 AND requester_id = ?3 AND approver_id = ?4)",
            )
            .bind(id)
            .bind(status)
            .bind(requester)
            .bind(approver)
            .fetch_one(pool)
            .await?;
            checks.push((*id, exists == 1));
        }

        let expense_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM expense WHERE id IN {}",
            sql_array_from_ids(SEED_EXPENSE_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("expenses", expense_count == SEED_EXPENSE_IDS.len() as i64));

        Ok(VerificationResult { all_present: checks.iter().all(|(_, ok)| *ok), checks })
    }

    /// Removes the seeded rows, children first.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let advance_ids: Vec<&str> = SEED_ADVANCES.iter().map(|(id, ..)| *id).collect();
        let mut tx = pool.begin().await?;

        for statement in [
            format!(
                "DELETE FROM expense WHERE advance_id IN {}",
                sql_array_from_ids(&advance_ids)
            ),
            format!("DELETE FROM advance_request WHERE id IN {}", sql_array_from_ids(&advance_ids)),
            format!(
                "DELETE FROM auth_session WHERE profile_id IN {}",
                sql_array_from_ids(SEED_PROFILE_IDS)
            ),
            format!("DELETE FROM profile WHERE id IN {}", sql_array_from_ids(SEED_PROFILE_IDS)),
            format!("DELETE FROM team WHERE id IN {}", sql_array_from_ids(SEED_TEAM_IDS)),
        ] {
            sqlx::query(&statement).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub profiles: Vec<&'static str>,
    pub advances: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
