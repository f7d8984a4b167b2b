use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use imprest_core::approvals::{AdvanceStore, GuardedUpdate};
use imprest_core::domain::advance::{Advance, AdvanceId, AdvanceStatus, Transition};
use imprest_core::domain::expense::Expense;
use imprest_core::domain::profile::{ActorId, Profile, Team, TeamId};
use imprest_core::errors::StoreError;
use imprest_core::session::Session;

use super::{
    AdvanceRepository, ExpenseRepository, ProfileRepository, RepositoryError, SessionRepository,
    TeamRepository,
};

#[derive(Default)]
pub struct InMemoryProfileRepository {
    profiles: RwLock<HashMap<String, Profile>>,
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn find_by_id(&self, id: &ActorId) -> Result<Option<Profile>, RepositoryError> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(id.as_str()).cloned())
    }

    async fn save(&self, profile: Profile) -> Result<(), RepositoryError> {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.id.as_str().to_owned(), profile);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTeamRepository {
    teams: RwLock<HashMap<String, Team>>,
}

#[async_trait]
impl TeamRepository for InMemoryTeamRepository {
    async fn find_by_id(&self, id: &TeamId) -> Result<Option<Team>, RepositoryError> {
        let teams = self.teams.read().await;
        Ok(teams.get(&id.0).cloned())
    }

    async fn save(&self, team: Team) -> Result<(), RepositoryError> {
        let mut teams = self.teams.write().await;
        teams.insert(team.id.0.clone(), team);
        Ok(())
    }
}

/// The write lock stands in for SQLite's writer serialisation, making the
/// status check and the mutation one atomic step.
#[derive(Default)]
pub struct InMemoryAdvanceRepository {
    advances: RwLock<HashMap<String, Advance>>,
}

impl InMemoryAdvanceRepository {
    async fn filtered<F>(&self, keep: F, newest_first: bool) -> Vec<Advance>
    where
        F: Fn(&Advance) -> bool,
    {
        let advances = self.advances.read().await;
        let mut matching: Vec<Advance> = advances.values().filter(|a| keep(a)).cloned().collect();
        matching.sort_by(|a, b| (a.created_at, &a.id.0).cmp(&(b.created_at, &b.id.0)));
        if newest_first {
            matching.reverse();
        }
        matching
    }
}

#[async_trait]
impl AdvanceStore for InMemoryAdvanceRepository {
    async fn find_advance(&self, id: &AdvanceId) -> Result<Option<Advance>, StoreError> {
        Ok(self.advances.read().await.get(&id.0).cloned())
    }

    async fn apply_guarded(
        &self,
        id: &AdvanceId,
        transition: &Transition,
    ) -> Result<GuardedUpdate, StoreError> {
        let mut advances = self.advances.write().await;
        let Some(advance) = advances.get_mut(&id.0) else {
            return Ok(GuardedUpdate::Stale);
        };
        if advance.apply(transition).is_err() {
            return Ok(GuardedUpdate::Stale);
        }
        Ok(GuardedUpdate::Applied(advance.clone()))
    }
}

#[async_trait]
impl AdvanceRepository for InMemoryAdvanceRepository {
    async fn find_by_id(&self, id: &AdvanceId) -> Result<Option<Advance>, RepositoryError> {
        Ok(self.advances.read().await.get(&id.0).cloned())
    }

    async fn insert(&self, advance: &Advance) -> Result<(), RepositoryError> {
        self.advances.write().await.insert(advance.id.0.clone(), advance.clone());
        Ok(())
    }

    async fn list_for_requester(
        &self,
        requester_id: &ActorId,
    ) -> Result<Vec<Advance>, RepositoryError> {
        Ok(self.filtered(|advance| &advance.requester_id == requester_id, true).await)
    }

    async fn list_pending_for_approver(
        &self,
        approver_id: &ActorId,
    ) -> Result<Vec<Advance>, RepositoryError> {
        Ok(self
            .filtered(
                |advance| {
                    &advance.approver_id == approver_id
                        && advance.status == AdvanceStatus::PendingApproval
                },
                false,
            )
            .await)
    }
}

pub struct InMemoryExpenseRepository {
    expenses: RwLock<Vec<Expense>>,
    advances: Arc<InMemoryAdvanceRepository>,
}

impl InMemoryExpenseRepository {
    /// `advances` resolves the requester of each expense's advance and guards
    /// inserts on its status.
    pub fn new(advances: Arc<InMemoryAdvanceRepository>) -> Self {
        Self { expenses: RwLock::new(Vec::new()), advances }
    }
}

#[async_trait]
impl ExpenseRepository for InMemoryExpenseRepository {
    async fn insert(&self, expense: &Expense) -> Result<bool, RepositoryError> {
        // Holding the advance map keeps a close from landing between the
        // status check and the push.
        let advances = self.advances.advances.read().await;
        let approved = advances
            .get(&expense.advance_id.0)
            .is_some_and(|advance| advance.status == AdvanceStatus::Approved);
        if !approved {
            return Ok(false);
        }

        self.expenses.write().await.push(expense.clone());
        Ok(true)
    }

    async fn list_for_advance(
        &self,
        advance_id: &AdvanceId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let mut listed: Vec<Expense> = self
            .expenses
            .read()
            .await
            .iter()
            .filter(|expense| &expense.advance_id == advance_id)
            .cloned()
            .collect();
        listed.sort_by_key(|expense| (expense.spent_on, expense.created_at));
        Ok(listed)
    }

    async fn list_for_requester(
        &self,
        requester_id: &ActorId,
    ) -> Result<Vec<Expense>, RepositoryError> {
        let own: Vec<AdvanceId> = self
            .advances
            .list_for_requester(requester_id)
            .await?
            .into_iter()
            .map(|advance| advance.id)
            .collect();
        let mut listed: Vec<Expense> = self
            .expenses
            .read()
            .await
            .iter()
            .filter(|expense| own.contains(&expense.advance_id))
            .cloned()
            .collect();
        listed.sort_by_key(|expense| (expense.spent_on, expense.created_at));
        Ok(listed)
    }
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn insert(&self, session: &Session) -> Result<(), RepositoryError> {
        self.sessions.write().await.insert(session.token_hash.clone(), session.clone());
        Ok(())
    }

    async fn find_active(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(token_hash).filter(|session| session.is_active(now)).cloned())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.is_active(now));
        Ok((before - sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal::Decimal;

    use imprest_core::approvals::{AdvanceStore, GuardedUpdate};
    use imprest_core::domain::advance::{Advance, AdvanceId, AdvanceStatus, Transition};
    use imprest_core::domain::expense::{Expense, ExpenseDraft};
    use imprest_core::domain::profile::ActorId;
    use imprest_core::session::Session;

    use crate::repositories::{
        AdvanceRepository, ExpenseRepository, InMemoryAdvanceRepository,
        InMemoryExpenseRepository, InMemorySessionRepository, SessionRepository,
    };

    fn actor(id: &str) -> ActorId {
        ActorId::parse(id).expect("actor id")
    }

    #[tokio::test]
    async fn in_memory_guard_matches_sql_semantics() {
        let repo = InMemoryAdvanceRepository::default();
        let advance =
            Advance::pending(actor("emp"), actor("mgr"), Decimal::new(100, 0), "Trip", Utc::now());
        repo.insert(&advance).await.expect("insert");

        let close = Transition::Close { at: Utc::now() };
        let closed = repo.apply_guarded(&advance.id, &close).await.expect("close");
        assert_eq!(closed, GuardedUpdate::Stale);

        let approve = Transition::Approve { manager_id: actor("mgr"), at: Utc::now() };
        assert!(matches!(
            repo.apply_guarded(&advance.id, &approve).await.expect("approve"),
            GuardedUpdate::Applied(ref updated) if updated.status == AdvanceStatus::Approved
        ));
        assert_eq!(
            repo.apply_guarded(&advance.id, &approve).await.expect("again"),
            GuardedUpdate::Stale
        );
    }

    #[tokio::test]
    async fn in_memory_listings_follow_ordering_contract() {
        let repo = InMemoryAdvanceRepository::default();
        let now = Utc::now();
        let mut first =
            Advance::pending(actor("emp"), actor("mgr"), Decimal::new(1, 0), "first", now);
        first.created_at = now - Duration::minutes(5);
        let second =
            Advance::pending(actor("emp"), actor("mgr"), Decimal::new(2, 0), "second", now);
        repo.insert(&first).await.expect("insert");
        repo.insert(&second).await.expect("insert");

        let mine = repo.list_for_requester(&actor("emp")).await.expect("list");
        assert_eq!(mine[0].purpose, "second");
        let pending = repo.list_pending_for_approver(&actor("mgr")).await.expect("pending");
        assert_eq!(pending[0].purpose, "first");
    }

    fn taxi(advance_id: &AdvanceId) -> Expense {
        ExpenseDraft {
            description: "Taxi".to_string(),
            category: "travel".to_string(),
            amount: Decimal::new(10, 0),
            spent_on: NaiveDate::from_ymd_opt(2026, 2, 1).expect("date"),
            receipt_url: None,
        }
        .into_expense(advance_id.clone(), Utc::now())
    }

    async fn approved(repo: &InMemoryAdvanceRepository, requester: &str) -> Advance {
        let amount = Decimal::new(100, 0);
        let advance = Advance::pending(actor(requester), actor("mgr"), amount, "Trip", Utc::now());
        repo.insert(&advance).await.expect("insert");
        let approve = Transition::Approve { manager_id: actor("mgr"), at: Utc::now() };
        match repo.apply_guarded(&advance.id, &approve).await.expect("approve") {
            GuardedUpdate::Applied(updated) => updated,
            GuardedUpdate::Stale => panic!("fresh advance should approve"),
        }
    }

    #[tokio::test]
    async fn in_memory_expenses_scope_by_requester() {
        let advances = Arc::new(InMemoryAdvanceRepository::default());
        let mine = approved(&advances, "emp").await;
        let theirs = approved(&advances, "peer").await;

        let expenses = InMemoryExpenseRepository::new(Arc::clone(&advances));
        for advance_id in [&mine.id, &theirs.id] {
            assert!(expenses.insert(&taxi(advance_id)).await.expect("insert"));
        }

        let listed = expenses.list_for_requester(&actor("emp")).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].advance_id, mine.id);
    }

    #[tokio::test]
    async fn in_memory_expense_insert_requires_an_approved_advance() {
        let advances = Arc::new(InMemoryAdvanceRepository::default());
        let pending =
            Advance::pending(actor("emp"), actor("mgr"), Decimal::new(100, 0), "Trip", Utc::now());
        advances.insert(&pending).await.expect("insert");
        let closing = approved(&advances, "emp").await;
        let close = Transition::Close { at: Utc::now() };
        advances.apply_guarded(&closing.id, &close).await.expect("close");

        let expenses = InMemoryExpenseRepository::new(Arc::clone(&advances));
        assert!(!expenses.insert(&taxi(&pending.id)).await.expect("pending"));
        assert!(!expenses.insert(&taxi(&closing.id)).await.expect("closed"));
        assert!(!expenses.insert(&taxi(&AdvanceId("missing".into()))).await.expect("missing"));
        assert!(expenses.list_for_requester(&actor("emp")).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn in_memory_sessions_expire() {
        let repo = InMemorySessionRepository::default();
        let now = Utc::now();
        let (token, session) = Session::issue(actor("emp"), Duration::minutes(30), now);
        repo.insert(&session).await.expect("insert");

        assert!(repo.find_active(&token.digest(), now).await.expect("find").is_some());
        assert!(repo
            .find_active(&token.digest(), now + Duration::hours(1))
            .await
            .expect("find")
            .is_none());
        assert_eq!(repo.delete_expired(now + Duration::hours(1)).await.expect("purge"), 1);
    }
}
