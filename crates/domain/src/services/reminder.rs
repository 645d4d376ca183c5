//! Reminder scheduler.
//!
//! Decides whether a reminder is allowed, counts it, and fires delivery on a
//! background task after a delay proportional to the time left before expiry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::{invite_link, InviteNotification};

use super::lifecycle::LifecycleManager;
use super::notifier::{DeliveryResult, Notifier};
use super::policy::ReminderPolicy;

/// Why no reminder was scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotFound,
    /// Installed, expired, or past its expiry instant.
    Terminal,
    /// The configured cap was reached.
    LimitReached,
}

/// What happened when a scheduled reminder fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderDelivery {
    Delivered,
    Failed(String),
    /// The invitation converted or expired while the reminder was pending.
    SkippedTerminal,
    Missing,
}

/// A reminder waiting to fire.
#[derive(Debug)]
pub struct ScheduledReminder {
    pub invitation_id: Uuid,
    pub reminder_number: i32,
    pub delay: Duration,
    pub fire_at: DateTime<Utc>,
    handle: JoinHandle<ReminderDelivery>,
}

impl ScheduledReminder {
    /// Wait for the reminder to fire.
    pub async fn wait(self) -> ReminderDelivery {
        match self.handle.await {
            Ok(delivery) => delivery,
            Err(e) => ReminderDelivery::Failed(format!("reminder task ended: {e}")),
        }
    }

    /// Cancel the pending delivery. The reminder stays counted.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

#[derive(Debug)]
pub enum ReminderOutcome {
    Scheduled(ScheduledReminder),
    Skipped(SkipReason),
}

impl ReminderOutcome {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, ReminderOutcome::Scheduled(_))
    }
}

/// Delay before firing: `fraction` of what is left of the expiry window.
pub fn reminder_delay(remaining: chrono::Duration, fraction: f64) -> Duration {
    let remaining_ms = remaining.num_milliseconds().max(0) as f64;
    Duration::from_millis((remaining_ms * fraction).floor() as u64)
}

#[derive(Clone)]
pub struct ReminderScheduler {
    lifecycle: LifecycleManager,
    notifier: Arc<dyn Notifier>,
    policy: ReminderPolicy,
    link_base_url: String,
    delivery_timeout: Duration,
}

impl ReminderScheduler {
    pub fn new(
        lifecycle: LifecycleManager,
        notifier: Arc<dyn Notifier>,
        policy: ReminderPolicy,
        link_base_url: String,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            lifecycle,
            notifier,
            policy,
            link_base_url,
            delivery_timeout,
        }
    }

    /// Count and schedule one reminder. Terminal invitations are skipped
    /// silently so bulk sweeps never fail on converted or expired entries.
    pub async fn send_reminder(&self, id: Uuid) -> Result<ReminderOutcome, RepositoryError> {
        let max_reminders = self.policy.max_reminders;
        let mutation = self
            .lifecycle
            .mutate(id, |inv, now| {
                if !inv.can_remind(now) {
                    return (false, Err(SkipReason::Terminal));
                }
                if matches!(max_reminders, Some(max) if inv.tracking_data.reminder_count >= max) {
                    return (false, Err(SkipReason::LimitReached));
                }
                inv.record_reminder(now);
                (true, Ok((inv.tracking_data.reminder_count, now)))
            })
            .await?;

        let Some(mutation) = mutation else {
            debug!(invitation_id = %id, "Reminder for unknown invitation skipped");
            return Ok(ReminderOutcome::Skipped(SkipReason::NotFound));
        };

        let (reminder_number, now) = match mutation.effect {
            Ok(scheduled) => scheduled,
            Err(reason) => {
                debug!(
                    invitation_id = %id,
                    status = %mutation.invitation.status,
                    reason = ?reason,
                    "Reminder skipped"
                );
                return Ok(ReminderOutcome::Skipped(reason));
            }
        };

        let remaining = mutation.invitation.time_remaining(now);
        let delay = reminder_delay(remaining, self.policy.delay_fraction);
        let fire_at = now
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

        info!(
            invitation_id = %id,
            reminder_number,
            delay_secs = delay.as_secs(),
            fire_at = %fire_at,
            "Reminder scheduled"
        );

        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.fire(id, reminder_number).await
        });

        Ok(ReminderOutcome::Scheduled(ScheduledReminder {
            invitation_id: id,
            reminder_number,
            delay,
            fire_at,
            handle,
        }))
    }

    /// Deliver a due reminder unless the invitation became terminal meanwhile.
    /// Delivery failures are logged, never propagated.
    async fn fire(&self, id: Uuid, reminder_number: i32) -> ReminderDelivery {
        let invitation = match self.lifecycle.load(id).await {
            Ok(Some(invitation)) => invitation,
            Ok(None) => return ReminderDelivery::Missing,
            Err(e) => {
                warn!(invitation_id = %id, error = %e, "Could not load invitation for reminder");
                return ReminderDelivery::Failed(e.to_string());
            }
        };

        if !invitation.can_remind(self.lifecycle.now()) {
            debug!(invitation_id = %id, status = %invitation.status, "Reminder no longer needed");
            return ReminderDelivery::SkippedTerminal;
        }

        let link = invite_link(&self.link_base_url, id);
        let notification = InviteNotification::reminder(&invitation, link, reminder_number);
        let result = tokio::time::timeout(
            self.delivery_timeout,
            self.notifier
                .deliver(&invitation.recipient_phone, &notification),
        )
        .await;

        match result {
            Ok(DeliveryResult::Delivered) => {
                info!(invitation_id = %id, reminder_number, "Reminder delivered");
                ReminderDelivery::Delivered
            }
            Ok(DeliveryResult::Failed(reason)) => {
                warn!(invitation_id = %id, reminder_number, reason = %reason, "Reminder delivery failed");
                ReminderDelivery::Failed(reason)
            }
            Err(_) => {
                warn!(invitation_id = %id, reminder_number, "Reminder delivery timed out");
                ReminderDelivery::Failed("delivery timed out".to_string())
            }
        }
    }
}
