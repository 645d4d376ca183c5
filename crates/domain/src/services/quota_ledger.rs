//! Quota ledger: the only path through which invite counters change.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::{LedgerField, QuotaLedger};

use super::repository::{with_deadline, with_timeout, InvitationRepository};
use super::rewards::RewardCalculator;

/// Owns `available_invites` and the cumulative referral counters of each user.
#[derive(Clone)]
pub struct QuotaLedgerService {
    repo: Arc<dyn InvitationRepository>,
    initial_invites: i32,
    store_timeout: Duration,
}

impl QuotaLedgerService {
    pub fn new(
        repo: Arc<dyn InvitationRepository>,
        initial_invites: i32,
        store_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            initial_invites,
            store_timeout,
        }
    }

    /// Current ledger, created lazily with the default quota.
    pub async fn ledger(&self, user_id: Uuid) -> Result<QuotaLedger, RepositoryError> {
        with_timeout(
            self.store_timeout,
            self.repo.ensure_ledger(user_id, self.initial_invites),
        )
        .await
    }

    /// Take one invite if any is left. The single synchronization point
    /// against oversend.
    pub async fn try_send_decrement(
        &self,
        user_id: Uuid,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<bool, RepositoryError> {
        with_deadline(
            self.store_timeout,
            deadline,
            self.repo.ensure_ledger(user_id, self.initial_invites),
        )
        .await?;
        let taken = with_deadline(
            self.store_timeout,
            deadline,
            self.repo
                .try_decrement(user_id, LedgerField::AvailableInvites, 1),
        )
        .await?;
        debug!(user_id = %user_id, taken, "Quota decrement attempted");
        Ok(taken)
    }

    /// Add invites. Non-positive amounts are ignored; this never decrements.
    pub async fn credit_invites(&self, user_id: Uuid, amount: i32) -> Result<(), RepositoryError> {
        if amount <= 0 {
            return Ok(());
        }
        self.ledger(user_id).await?;
        with_timeout(
            self.store_timeout,
            self.repo
                .increment(user_id, LedgerField::AvailableInvites, amount),
        )
        .await?;
        info!(user_id = %user_id, amount, "Credited invites");
        Ok(())
    }

    pub async fn record_sent(&self, user_id: Uuid) -> Result<(), RepositoryError> {
        with_timeout(
            self.store_timeout,
            self.repo.increment(user_id, LedgerField::TotalInvitesSent, 1),
        )
        .await
    }

    pub async fn record_accepted(&self, user_id: Uuid) -> Result<(), RepositoryError> {
        self.ledger(user_id).await?;
        with_timeout(
            self.store_timeout,
            self.repo
                .increment(user_id, LedgerField::TotalInvitesAccepted, 1),
        )
        .await
    }

    /// Store the streak and credit whatever part of its award the current
    /// run has not been paid yet. The total paid for a run depends only on
    /// its length, not on how often it was reported. Returns the invites
    /// credited by this call.
    pub async fn apply_streak(
        &self,
        user_id: Uuid,
        days: i32,
        rewards: &RewardCalculator,
        now: DateTime<Utc>,
    ) -> Result<i32, RepositoryError> {
        let days = days.max(0);
        self.ledger(user_id).await?;
        with_timeout(self.store_timeout, self.repo.set_invite_streak(user_id, days)).await?;

        let run_award = rewards.streak_award(days);
        if run_award == 0 {
            return Ok(0);
        }

        let window_start = rewards.streak_window_start(days, now);
        let credited = with_timeout(
            self.store_timeout,
            self.repo
                .credit_streak_award(user_id, run_award, window_start, now),
        )
        .await?;

        if credited > 0 {
            info!(user_id = %user_id, days, run_award, credited, "Streak award credited");
        } else {
            debug!(user_id = %user_id, days, run_award, "Streak run already credited");
        }
        Ok(credited)
    }
}
