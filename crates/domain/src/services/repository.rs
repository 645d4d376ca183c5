//! Storage abstraction for invitations and quota ledgers.
//!
//! The engine only relies on per-document atomicity: a conditional write
//! on one invitation, and atomic counter updates on one ledger.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::{Invitation, LedgerField, QuotaLedger};

/// Durable keyed storage for invitations and per-user quota counters.
#[async_trait::async_trait]
pub trait InvitationRepository: Send + Sync {
    /// Fetch one invitation.
    async fn get(&self, id: Uuid) -> Result<Option<Invitation>, RepositoryError>;

    /// Insert a new invitation.
    async fn put(&self, invitation: &Invitation) -> Result<(), RepositoryError>;

    /// All invitations sent by a user, newest first.
    async fn list_by_sender(&self, sender_id: Uuid) -> Result<Vec<Invitation>, RepositoryError>;

    /// Overwrite an invitation only if the stored version equals
    /// `expected_version`. Returns false when another writer won.
    async fn compare_and_put(
        &self,
        invitation: &Invitation,
        expected_version: i64,
    ) -> Result<bool, RepositoryError>;

    /// Non-terminal invitations whose expiry instant is at or before `now`.
    async fn list_expirable(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Invitation>, RepositoryError>;

    /// Load the user's ledger, creating it with `initial_invites` if missing.
    async fn ensure_ledger(
        &self,
        user_id: Uuid,
        initial_invites: i32,
    ) -> Result<QuotaLedger, RepositoryError>;

    /// Atomically subtract `amount` if the field holds at least `amount`.
    async fn try_decrement(
        &self,
        user_id: Uuid,
        field: LedgerField,
        amount: i32,
    ) -> Result<bool, RepositoryError>;

    /// Atomically add `amount` to the field.
    async fn increment(
        &self,
        user_id: Uuid,
        field: LedgerField,
        amount: i32,
    ) -> Result<(), RepositoryError>;

    /// Store the externally computed activity streak.
    async fn set_invite_streak(&self, user_id: Uuid, days: i32) -> Result<(), RepositoryError>;

    /// Bring the streak credit of the run starting at `window_start` up to
    /// `run_award` in one atomic step.
    ///
    /// Invites already credited for the run (`streak_award_credited`, when
    /// `last_invite_award` is at or after `window_start`) are subtracted. When
    /// something is owed, the difference is added to `available_invites`,
    /// `streak_award_credited` becomes `run_award` and `last_invite_award`
    /// becomes `now`. Returns the invites credited by this call.
    async fn credit_streak_award(
        &self,
        user_id: Uuid,
        run_award: i32,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<i32, RepositoryError>;
}

/// Run a store call with a time bound.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, RepositoryError>
where
    F: Future<Output = Result<T, RepositoryError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(RepositoryError::Timeout),
    }
}

/// Run a store call bounded by `limit` and, if given, an absolute deadline.
pub async fn with_deadline<T, F>(
    limit: Duration,
    deadline: Option<tokio::time::Instant>,
    fut: F,
) -> Result<T, RepositoryError>
where
    F: Future<Output = Result<T, RepositoryError>>,
{
    let by_limit = tokio::time::Instant::now() + limit;
    let until = match deadline {
        Some(deadline) => deadline.min(by_limit),
        None => by_limit,
    };
    match tokio::time::timeout_at(until, fut).await {
        Ok(result) => result,
        Err(_) => Err(RepositoryError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_passes_through() {
        let result = with_timeout(Duration::from_secs(1), async { Ok::<_, RepositoryError>(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_elapses() {
        let result: Result<(), _> = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(RepositoryError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_deadline_uses_earlier_bound() {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(10);
        let result: Result<(), _> = with_deadline(Duration::from_secs(60), Some(deadline), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(RepositoryError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_deadline_already_passed() {
        let deadline = tokio::time::Instant::now();
        tokio::time::advance(Duration::from_millis(5)).await;
        let result: Result<(), _> = with_deadline(Duration::from_secs(60), Some(deadline), async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(RepositoryError::Timeout));
    }
}
