//! In-memory repository for development and testing.
//!
//! Each map sits behind its own mutex, which gives the same per-document
//! atomicity a document store offers. Fault injection hooks let tests
//! exercise the compensation paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::{Invitation, LedgerField, QuotaLedger};

use super::repository::InvitationRepository;

#[derive(Debug, Default)]
pub struct InMemoryInvitationRepository {
    invitations: Mutex<HashMap<Uuid, Invitation>>,
    ledgers: Mutex<HashMap<Uuid, QuotaLedger>>,
    fail_puts: AtomicBool,
    put_latency_ms: AtomicU64,
    failing_increments: Mutex<Vec<LedgerField>>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("in-memory store lock poisoned".to_string()))
}

impl InMemoryInvitationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put` fail until reset.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Delay every subsequent `put` by `latency`.
    pub fn set_put_latency(&self, latency: Duration) {
        self.put_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make the next `increment` of `field` fail once.
    pub fn fail_next_increment(&self, field: LedgerField) {
        if let Ok(mut failing) = self.failing_increments.lock() {
            failing.push(field);
        }
    }

    /// Snapshot of a ledger without creating it.
    pub fn ledger(&self, user_id: Uuid) -> Option<QuotaLedger> {
        self.ledgers
            .lock()
            .ok()
            .and_then(|ledgers| ledgers.get(&user_id).cloned())
    }

    /// Seed or replace a ledger directly.
    pub fn insert_ledger(&self, ledger: QuotaLedger) {
        if let Ok(mut ledgers) = self.ledgers.lock() {
            ledgers.insert(ledger.user_id, ledger);
        }
    }

    /// Seed or replace an invitation directly, bypassing version checks.
    pub fn insert_invitation(&self, invitation: Invitation) {
        if let Ok(mut invitations) = self.invitations.lock() {
            invitations.insert(invitation.id, invitation);
        }
    }

    /// Snapshot of a stored invitation, without lazy expiry.
    pub fn invitation(&self, id: Uuid) -> Option<Invitation> {
        self.invitations
            .lock()
            .ok()
            .and_then(|invitations| invitations.get(&id).cloned())
    }

    pub fn invitation_count(&self) -> usize {
        self.invitations.lock().map(|i| i.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl InvitationRepository for InMemoryInvitationRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Invitation>, RepositoryError> {
        Ok(lock(&self.invitations)?.get(&id).cloned())
    }

    async fn put(&self, invitation: &Invitation) -> Result<(), RepositoryError> {
        let latency = self.put_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("simulated put failure".to_string()));
        }

        let mut invitations = lock(&self.invitations)?;
        if invitations.contains_key(&invitation.id) {
            return Err(RepositoryError::Conflict(format!(
                "invitation {} already exists",
                invitation.id
            )));
        }
        invitations.insert(invitation.id, invitation.clone());
        Ok(())
    }

    async fn list_by_sender(&self, sender_id: Uuid) -> Result<Vec<Invitation>, RepositoryError> {
        let mut found: Vec<Invitation> = lock(&self.invitations)?
            .values()
            .filter(|i| i.sender_id == sender_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn compare_and_put(
        &self,
        invitation: &Invitation,
        expected_version: i64,
    ) -> Result<bool, RepositoryError> {
        let mut invitations = lock(&self.invitations)?;
        match invitations.get_mut(&invitation.id) {
            Some(stored) if stored.version == expected_version => {
                *stored = invitation.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_expirable(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Invitation>, RepositoryError> {
        let mut due: Vec<Invitation> = lock(&self.invitations)?
            .values()
            .filter(|i| !i.is_terminal() && i.is_past_expiry(now))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn ensure_ledger(
        &self,
        user_id: Uuid,
        initial_invites: i32,
    ) -> Result<QuotaLedger, RepositoryError> {
        let mut ledgers = lock(&self.ledgers)?;
        Ok(ledgers
            .entry(user_id)
            .or_insert_with(|| QuotaLedger::new(user_id, initial_invites))
            .clone())
    }

    async fn try_decrement(
        &self,
        user_id: Uuid,
        field: LedgerField,
        amount: i32,
    ) -> Result<bool, RepositoryError> {
        let mut ledgers = lock(&self.ledgers)?;
        let Some(ledger) = ledgers.get_mut(&user_id) else {
            return Ok(false);
        };
        if ledger.field(field) < amount {
            return Ok(false);
        }
        *ledger.field_mut(field) -= amount;
        Ok(true)
    }

    async fn increment(
        &self,
        user_id: Uuid,
        field: LedgerField,
        amount: i32,
    ) -> Result<(), RepositoryError> {
        {
            let mut failing = lock(&self.failing_increments)?;
            if let Some(pos) = failing.iter().position(|f| *f == field) {
                failing.remove(pos);
                return Err(RepositoryError::Unavailable(format!(
                    "simulated {field} increment failure"
                )));
            }
        }
        let mut ledgers = lock(&self.ledgers)?;
        match ledgers.get_mut(&user_id) {
            Some(ledger) => {
                *ledger.field_mut(field) += amount;
                Ok(())
            }
            None => Err(RepositoryError::Unavailable(format!(
                "no ledger for user {user_id}"
            ))),
        }
    }

    async fn set_invite_streak(&self, user_id: Uuid, days: i32) -> Result<(), RepositoryError> {
        let mut ledgers = lock(&self.ledgers)?;
        match ledgers.get_mut(&user_id) {
            Some(ledger) => {
                ledger.invite_streak = days;
                Ok(())
            }
            None => Err(RepositoryError::Unavailable(format!(
                "no ledger for user {user_id}"
            ))),
        }
    }

    async fn credit_streak_award(
        &self,
        user_id: Uuid,
        run_award: i32,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<i32, RepositoryError> {
        let mut ledgers = lock(&self.ledgers)?;
        let Some(ledger) = ledgers.get_mut(&user_id) else {
            return Ok(0);
        };
        let owed = run_award - ledger.credited_in_run(window_start);
        if owed <= 0 {
            return Ok(0);
        }
        ledger.available_invites += owed;
        ledger.streak_award_credited = run_award;
        ledger.last_invite_award = Some(now);
        Ok(owed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contact, MessageVariant};
    use chrono::Duration as ChronoDuration;

    fn invitation(sender: Uuid, created_at: DateTime<Utc>) -> Invitation {
        Invitation::new(
            sender,
            &Contact::new("5551234567"),
            "hi".to_string(),
            MessageVariant::Standard,
            created_at,
            ChronoDuration::hours(24),
        )
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let repo = InMemoryInvitationRepository::new();
        let inv = invitation(Uuid::new_v4(), Utc::now());
        repo.put(&inv).await.unwrap();

        assert_eq!(repo.get(inv.id).await.unwrap(), Some(inv.clone()));
        assert!(matches!(
            repo.put(&inv).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_compare_and_put_rejects_stale_version() {
        let repo = InMemoryInvitationRepository::new();
        let inv = invitation(Uuid::new_v4(), Utc::now());
        repo.put(&inv).await.unwrap();

        let mut first = inv.clone();
        first.version = 1;
        assert!(repo.compare_and_put(&first, 0).await.unwrap());

        let mut stale = inv.clone();
        stale.version = 1;
        assert!(!repo.compare_and_put(&stale, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_by_sender_newest_first() {
        let repo = InMemoryInvitationRepository::new();
        let sender = Uuid::new_v4();
        let now = Utc::now();
        let older = invitation(sender, now - ChronoDuration::hours(2));
        let newer = invitation(sender, now);
        repo.put(&older).await.unwrap();
        repo.put(&newer).await.unwrap();
        repo.put(&invitation(Uuid::new_v4(), now)).await.unwrap();

        let listed = repo.list_by_sender(sender).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newer.id);
    }

    #[tokio::test]
    async fn test_try_decrement_never_goes_negative() {
        let repo = InMemoryInvitationRepository::new();
        let user = Uuid::new_v4();
        repo.ensure_ledger(user, 1).await.unwrap();

        assert!(repo.try_decrement(user, LedgerField::AvailableInvites, 1).await.unwrap());
        assert!(!repo.try_decrement(user, LedgerField::AvailableInvites, 1).await.unwrap());
        assert_eq!(repo.ledger(user).unwrap().available_invites, 0);
    }

    #[tokio::test]
    async fn test_ensure_ledger_is_idempotent() {
        let repo = InMemoryInvitationRepository::new();
        let user = Uuid::new_v4();
        repo.ensure_ledger(user, 3).await.unwrap();
        repo.increment(user, LedgerField::AvailableInvites, 2).await.unwrap();

        let ledger = repo.ensure_ledger(user, 3).await.unwrap();
        assert_eq!(ledger.available_invites, 5);
    }

    #[tokio::test]
    async fn test_credit_streak_award_pays_only_the_difference() {
        let repo = InMemoryInvitationRepository::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let window_start = now - ChronoDuration::days(3);
        repo.ensure_ledger(user, 0).await.unwrap();

        assert_eq!(repo.credit_streak_award(user, 2, window_start, now).await.unwrap(), 2);
        assert_eq!(repo.credit_streak_award(user, 2, window_start, now).await.unwrap(), 0);

        let later = now + ChronoDuration::days(3);
        assert_eq!(repo.credit_streak_award(user, 4, window_start, later).await.unwrap(), 2);

        let ledger = repo.ledger(user).unwrap();
        assert_eq!(ledger.available_invites, 4);
        assert_eq!(ledger.streak_award_credited, 4);
        assert_eq!(ledger.last_invite_award, Some(later));
    }

    #[tokio::test]
    async fn test_list_expirable() {
        let repo = InMemoryInvitationRepository::new();
        let now = Utc::now();
        let stale = invitation(Uuid::new_v4(), now - ChronoDuration::hours(30));
        let fresh = invitation(Uuid::new_v4(), now);
        repo.put(&stale).await.unwrap();
        repo.put(&fresh).await.unwrap();

        let due = repo.list_expirable(now, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, stale.id);
        assert!(repo.list_expirable(now, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fail_next_increment_is_one_shot() {
        let repo = InMemoryInvitationRepository::new();
        let user = Uuid::new_v4();
        repo.ensure_ledger(user, 0).await.unwrap();
        repo.fail_next_increment(LedgerField::TotalInvitesAccepted);

        assert!(repo.increment(user, LedgerField::AvailableInvites, 1).await.is_ok());
        assert!(repo.increment(user, LedgerField::TotalInvitesAccepted, 1).await.is_err());
        assert!(repo.increment(user, LedgerField::TotalInvitesAccepted, 1).await.is_ok());
        assert_eq!(repo.ledger(user).unwrap().total_invites_accepted, 1);
    }

    #[tokio::test]
    async fn test_fail_puts_toggle() {
        let repo = InMemoryInvitationRepository::new();
        repo.set_fail_puts(true);
        let inv = invitation(Uuid::new_v4(), Utc::now());
        assert!(repo.put(&inv).await.is_err());
        assert_eq!(repo.invitation_count(), 0);

        repo.set_fail_puts(false);
        assert!(repo.put(&inv).await.is_ok());
    }
}
