//! Tunable engine policy.
//!
//! Reward magnitudes and timing are product configuration, so every knob
//! here deserializes with a default and can be overridden from config files.

use serde::Deserialize;
use std::time::Duration as StdDuration;

/// Quota rewards.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RewardPolicy {
    /// Length of one qualifying streak window in days.
    #[serde(default = "default_streak_window_days")]
    pub streak_window_days: i32,

    /// Invites granted per completed streak window.
    #[serde(default = "default_invites_per_window")]
    pub invites_per_window: i32,

    /// One-off bonus when premium becomes active.
    #[serde(default = "default_premium_bonus")]
    pub premium_bonus: i32,

    /// Bonus for the sender when an invitation converts.
    #[serde(default = "default_install_bonus")]
    pub install_bonus: i32,
}

/// Reminder timing.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReminderPolicy {
    /// Fraction of the remaining TTL to wait before firing.
    #[serde(default = "default_delay_fraction")]
    pub delay_fraction: f64,

    /// Optional hard cap per invitation; unset means unbounded.
    #[serde(default)]
    pub max_reminders: Option<i32>,

    /// Schedule the first reminder right after a successful send.
    #[serde(default = "default_schedule_on_send")]
    pub schedule_on_send: bool,
}

/// Complete engine policy.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct InvitePolicy {
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,

    #[serde(default = "default_available_invites")]
    pub default_available_invites: i32,

    /// Deep link base; the invitation id is appended.
    #[serde(default = "default_link_base_url")]
    pub link_base_url: String,

    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,

    #[serde(default)]
    pub rewards: RewardPolicy,

    #[serde(default)]
    pub reminders: ReminderPolicy,
}

impl InvitePolicy {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.ttl_hours)
    }

    pub fn store_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.store_timeout_ms)
    }

    pub fn delivery_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.delivery_timeout_ms)
    }

    /// Check value ranges. Returns a human readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_hours <= 0 {
            return Err("invites.ttl_hours must be positive".to_string());
        }
        if self.default_available_invites < 0 {
            return Err("invites.default_available_invites cannot be negative".to_string());
        }
        if self.store_timeout_ms == 0 || self.delivery_timeout_ms == 0 {
            return Err("invites timeouts must be non-zero".to_string());
        }
        if self.rewards.streak_window_days <= 0 {
            return Err("invites.rewards.streak_window_days must be positive".to_string());
        }
        if self.rewards.invites_per_window < 0
            || self.rewards.premium_bonus < 0
            || self.rewards.install_bonus < 0
        {
            return Err("invites.rewards amounts cannot be negative".to_string());
        }
        let fraction = self.reminders.delay_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err("invites.reminders.delay_fraction must be in (0, 1]".to_string());
        }
        if matches!(self.reminders.max_reminders, Some(max) if max < 0) {
            return Err("invites.reminders.max_reminders cannot be negative".to_string());
        }
        Ok(())
    }
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            streak_window_days: default_streak_window_days(),
            invites_per_window: default_invites_per_window(),
            premium_bonus: default_premium_bonus(),
            install_bonus: default_install_bonus(),
        }
    }
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            delay_fraction: default_delay_fraction(),
            max_reminders: None,
            schedule_on_send: default_schedule_on_send(),
        }
    }
}

impl Default for InvitePolicy {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
            default_available_invites: default_available_invites(),
            link_base_url: default_link_base_url(),
            store_timeout_ms: default_store_timeout_ms(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
            rewards: RewardPolicy::default(),
            reminders: ReminderPolicy::default(),
        }
    }
}

// Default value functions
fn default_ttl_hours() -> i64 {
    24
}
fn default_available_invites() -> i32 {
    3
}
fn default_link_base_url() -> String {
    "https://pollwave.app/i".to_string()
}
fn default_store_timeout_ms() -> u64 {
    5_000
}
fn default_delivery_timeout_ms() -> u64 {
    10_000
}
fn default_streak_window_days() -> i32 {
    3
}
fn default_invites_per_window() -> i32 {
    2
}
fn default_premium_bonus() -> i32 {
    10
}
fn default_install_bonus() -> i32 {
    1
}
fn default_delay_fraction() -> f64 {
    0.8
}
fn default_schedule_on_send() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        let policy = InvitePolicy::default();
        assert!(policy.validate().is_ok());
        assert_eq!(policy.ttl(), chrono::Duration::hours(24));
        assert_eq!(policy.store_timeout(), StdDuration::from_secs(5));
        assert_eq!(policy.reminders.delay_fraction, 0.8);
        assert!(policy.reminders.max_reminders.is_none());
    }

    #[test]
    fn test_partial_deserialize_fills_defaults() {
        let json = r#"{"ttl_hours": 48, "rewards": {"install_bonus": 5}}"#;
        let policy: InvitePolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.ttl_hours, 48);
        assert_eq!(policy.rewards.install_bonus, 5);
        assert_eq!(policy.rewards.invites_per_window, 2);
        assert!(!policy.reminders.schedule_on_send);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut policy = InvitePolicy::default();
        policy.ttl_hours = 0;
        assert!(policy.validate().is_err());

        let mut policy = InvitePolicy::default();
        policy.reminders.delay_fraction = 1.5;
        assert!(policy.validate().is_err());

        let mut policy = InvitePolicy::default();
        policy.rewards.streak_window_days = 0;
        assert!(policy.validate().is_err());

        let mut policy = InvitePolicy::default();
        policy.rewards.install_bonus = -1;
        assert!(policy.validate().is_err());
    }
}
