//! Reward calculator: maps streaks, premium activation and installs to
//! quota deltas. Pure functions; crediting is the quota ledger's job.

use chrono::{DateTime, Duration, Utc};

use super::policy::RewardPolicy;

#[derive(Debug, Clone)]
pub struct RewardCalculator {
    policy: RewardPolicy,
}

impl RewardCalculator {
    pub fn new(policy: RewardPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RewardPolicy {
        &self.policy
    }

    /// Invites earned by a streak: `invites_per_window` for every full
    /// window, no partial credit.
    pub fn streak_award(&self, days: i32) -> i32 {
        if days <= 0 || self.policy.streak_window_days <= 0 {
            return 0;
        }
        (days / self.policy.streak_window_days) * self.policy.invites_per_window
    }

    /// Start of the streak run that ends at `now`.
    ///
    /// Awards stamped at or after this instant were paid for the same run.
    pub fn streak_window_start(&self, days: i32, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(days.max(0)))
    }

    pub fn premium_award(&self) -> i32 {
        self.policy.premium_bonus
    }

    pub fn install_award(&self) -> i32 {
        self.policy.install_bonus
    }
}

impl Default for RewardCalculator {
    fn default() -> Self {
        Self::new(RewardPolicy::default())
    }
}
