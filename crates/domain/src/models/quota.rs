//! Per-user invite quota and referral counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Counter columns that support atomic increment/decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerField {
    AvailableInvites,
    TotalInvitesSent,
    TotalInvitesAccepted,
}

impl std::fmt::Display for LedgerField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerField::AvailableInvites => write!(f, "available_invites"),
            LedgerField::TotalInvitesSent => write!(f, "total_invites_sent"),
            LedgerField::TotalInvitesAccepted => write!(f, "total_invites_accepted"),
        }
    }
}

/// The scarce invite quota plus cumulative referral stats for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaLedger {
    pub user_id: Uuid,
    pub available_invites: i32,
    pub total_invites_sent: i32,
    pub total_invites_accepted: i32,
    /// Consecutive active days, computed outside the engine.
    pub invite_streak: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_invite_award: Option<DateTime<Utc>>,
    /// Streak invites already credited for the run `last_invite_award` belongs to.
    #[serde(default)]
    pub streak_award_credited: i32,
}

impl QuotaLedger {
    /// A fresh ledger holding the default quota.
    pub fn new(user_id: Uuid, initial_invites: i32) -> Self {
        Self {
            user_id,
            available_invites: initial_invites.max(0),
            total_invites_sent: 0,
            total_invites_accepted: 0,
            invite_streak: 0,
            last_invite_award: None,
            streak_award_credited: 0,
        }
    }

    pub fn field(&self, field: LedgerField) -> i32 {
        match field {
            LedgerField::AvailableInvites => self.available_invites,
            LedgerField::TotalInvitesSent => self.total_invites_sent,
            LedgerField::TotalInvitesAccepted => self.total_invites_accepted,
        }
    }

    pub fn field_mut(&mut self, field: LedgerField) -> &mut i32 {
        match field {
            LedgerField::AvailableInvites => &mut self.available_invites,
            LedgerField::TotalInvitesSent => &mut self.total_invites_sent,
            LedgerField::TotalInvitesAccepted => &mut self.total_invites_accepted,
        }
    }

    /// Streak invites already credited for the run starting at `window_start`.
    /// An award stamped before the run began belongs to an earlier run.
    pub fn credited_in_run(&self, window_start: DateTime<Utc>) -> i32 {
        match self.last_invite_award {
            Some(awarded) if awarded >= window_start => self.streak_award_credited,
            _ => 0,
        }
    }

    /// Share of sent invitations that converted to installs.
    pub fn acceptance_rate(&self) -> f64 {
        if self.total_invites_sent == 0 {
            0.0
        } else {
            self.total_invites_accepted as f64 / self.total_invites_sent as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_ledger_field_display() {
        assert_eq!(LedgerField::AvailableInvites.to_string(), "available_invites");
        assert_eq!(LedgerField::TotalInvitesSent.to_string(), "total_invites_sent");
        assert_eq!(
            LedgerField::TotalInvitesAccepted.to_string(),
            "total_invites_accepted"
        );
    }

    #[test]
    fn test_new_ledger_clamps_negative_default() {
        let ledger = QuotaLedger::new(Uuid::nil(), -4);
        assert_eq!(ledger.available_invites, 0);
        assert!(ledger.last_invite_award.is_none());
    }

    #[test]
    fn test_field_accessors() {
        let mut ledger = QuotaLedger::new(Uuid::nil(), 3);
        *ledger.field_mut(LedgerField::TotalInvitesSent) += 2;
        assert_eq!(ledger.field(LedgerField::TotalInvitesSent), 2);
        assert_eq!(ledger.field(LedgerField::AvailableInvites), 3);
    }

    #[test]
    fn test_credited_in_run() {
        let now = Utc::now();
        let mut ledger = QuotaLedger::new(Uuid::nil(), 3);
        assert_eq!(ledger.credited_in_run(now - Duration::days(3)), 0);

        ledger.last_invite_award = Some(now - Duration::days(1));
        ledger.streak_award_credited = 4;
        assert_eq!(ledger.credited_in_run(now - Duration::days(3)), 4);
        // A run that started after the last award owes from scratch.
        assert_eq!(ledger.credited_in_run(now), 0);
    }

    #[test]
    fn test_acceptance_rate() {
        let mut ledger = QuotaLedger::new(Uuid::nil(), 3);
        assert_eq!(ledger.acceptance_rate(), 0.0);
        ledger.total_invites_sent = 4;
        ledger.total_invites_accepted = 1;
        assert_eq!(ledger.acceptance_rate(), 0.25);
    }
}
