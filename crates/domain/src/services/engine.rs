//! Invitation engine facade.
//!
//! Composes the quota ledger, lifecycle manager, reward calculator and
//! reminder scheduler into the operations the rest of the product calls.
//! Construct one instance with injected collaborators and share it by `Arc`.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::{InvitationError, RepositoryError};
use crate::models::{
    compose_message, invite_link, InstallCredit, InstallEffect, Invitation, InviteNotification,
    LedgerField, MessageVariant, QuotaLedger, SendInviteRequest,
};

use super::clock::{Clock, SystemClock};
use super::identity::IdentityProvider;
use super::lifecycle::{LifecycleManager, TrackOutcome};
use super::notifier::{DeliveryResult, Notifier};
use super::policy::InvitePolicy;
use super::quota_ledger::QuotaLedgerService;
use super::reminder::{ReminderOutcome, ReminderScheduler, ScheduledReminder};
use super::repository::{with_timeout, InvitationRepository};
use super::rewards::RewardCalculator;

pub struct InvitationEngine {
    policy: InvitePolicy,
    lifecycle: LifecycleManager,
    ledgers: QuotaLedgerService,
    rewards: RewardCalculator,
    reminders: ReminderScheduler,
    notifier: Arc<dyn Notifier>,
    identity: Arc<dyn IdentityProvider>,
}

impl InvitationEngine {
    pub fn new(
        repo: Arc<dyn InvitationRepository>,
        notifier: Arc<dyn Notifier>,
        identity: Arc<dyn IdentityProvider>,
        policy: InvitePolicy,
    ) -> Self {
        Self::with_clock(repo, notifier, identity, Arc::new(SystemClock), policy)
    }

    pub fn with_clock(
        repo: Arc<dyn InvitationRepository>,
        notifier: Arc<dyn Notifier>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
        policy: InvitePolicy,
    ) -> Self {
        let lifecycle = LifecycleManager::new(repo.clone(), clock, policy.store_timeout());
        let ledgers = QuotaLedgerService::new(
            repo,
            policy.default_available_invites,
            policy.store_timeout(),
        );
        let reminders = ReminderScheduler::new(
            lifecycle.clone(),
            notifier.clone(),
            policy.reminders.clone(),
            policy.link_base_url.clone(),
            policy.delivery_timeout(),
        );

        Self {
            rewards: RewardCalculator::new(policy.rewards.clone()),
            policy,
            lifecycle,
            ledgers,
            reminders,
            notifier,
            identity,
        }
    }

    pub fn policy(&self) -> &InvitePolicy {
        &self.policy
    }

    /// Send one invitation on behalf of `sender_id`.
    ///
    /// Validation and quota exhaustion are reported before any state
    /// changes. Once a unit of quota is reserved, every later failure
    /// returns it before surfacing `SendFailed`.
    pub async fn send_invite(
        &self,
        sender_id: Uuid,
        request: SendInviteRequest,
    ) -> Result<Invitation, InvitationError> {
        request.contact.validate()?;

        if matches!(request.deadline, Some(d) if d <= tokio::time::Instant::now()) {
            return Err(InvitationError::SendFailed(
                "deadline passed before sending".to_string(),
            ));
        }

        match self
            .ledgers
            .try_send_decrement(sender_id, request.deadline)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!(sender_id = %sender_id, "Invite rejected, no quota left");
                return Err(InvitationError::NoInvitesRemaining);
            }
            Err(e) => {
                warn!(sender_id = %sender_id, error = %e, "Quota reservation failed");
                return Err(InvitationError::SendFailed(format!(
                    "could not reserve quota: {e}"
                )));
            }
        }

        let variant = request.variant.unwrap_or_else(MessageVariant::random);
        let mut invitation = Invitation::new(
            sender_id,
            &request.contact,
            String::new(),
            variant,
            self.lifecycle.now(),
            self.policy.ttl(),
        );
        let link = invite_link(&self.policy.link_base_url, invitation.id);
        invitation.message =
            compose_message(variant, request.message.as_deref(), &request.contact, &link);

        if let Err(e) = self.lifecycle.create(&invitation, request.deadline).await {
            warn!(
                sender_id = %sender_id,
                invitation_id = %invitation.id,
                error = %e,
                "Persisting invitation failed"
            );
            self.return_quota(sender_id).await;
            return Err(InvitationError::SendFailed(format!(
                "could not store invitation: {e}"
            )));
        }

        let notification = InviteNotification::invitation(&invitation, link);
        let delivery = tokio::time::timeout(
            self.policy.delivery_timeout(),
            self.notifier
                .deliver(&invitation.recipient_phone, &notification),
        )
        .await
        .unwrap_or_else(|_| DeliveryResult::Failed("delivery timed out".to_string()));

        if let DeliveryResult::Failed(reason) = delivery {
            warn!(
                sender_id = %sender_id,
                invitation_id = %invitation.id,
                reason = %reason,
                "Invite delivery failed"
            );
            self.return_quota(sender_id).await;
            if let Err(e) = self.lifecycle.expire(invitation.id).await {
                error!(
                    invitation_id = %invitation.id,
                    error = %e,
                    "Could not retire undelivered invitation"
                );
            }
            return Err(InvitationError::SendFailed(reason));
        }

        if let Err(e) = self.ledgers.record_sent(sender_id).await {
            warn!(sender_id = %sender_id, error = %e, "Could not count sent invite");
        }

        info!(
            sender_id = %sender_id,
            invitation_id = %invitation.id,
            variant = %variant,
            "Invite sent"
        );

        if self.policy.reminders.schedule_on_send {
            if let Err(e) = self.reminders.send_reminder(invitation.id).await {
                warn!(invitation_id = %invitation.id, error = %e, "Could not schedule first reminder");
            }
        }

        Ok(invitation)
    }

    /// Compensating credit for a reserved but unused invite.
    async fn return_quota(&self, sender_id: Uuid) {
        match self.ledgers.credit_invites(sender_id, 1).await {
            Ok(()) => warn!(sender_id = %sender_id, "Returned reserved invite"),
            Err(e) => error!(
                sender_id = %sender_id,
                error = %e,
                "Compensating credit failed, reserved invite lost"
            ),
        }
    }

    /// Deep-link click callback. Replays and unknown ids are soft no-ops.
    pub async fn track_invitation_click(&self, id: Uuid) -> Result<TrackOutcome, InvitationError> {
        Ok(self.lifecycle.track_click(id).await?)
    }

    /// App install callback. The write that converts the invitation claims
    /// the acceptance count and the install award for the sender. A replay
    /// finishes any credit an earlier attempt could not apply.
    pub async fn track_invitation_install(
        &self,
        id: Uuid,
    ) -> Result<TrackOutcome, InvitationError> {
        let Some((invitation, effect)) = self.lifecycle.track_install(id).await? else {
            warn!(invitation_id = %id, "Install for unknown invitation ignored");
            return Ok(TrackOutcome::NotFound);
        };

        match effect {
            InstallEffect::Converted => {
                self.apply_install_credits(&invitation, &InstallCredit::ALL)
                    .await?;
                info!(invitation_id = %id, sender_id = %invitation.sender_id, "Invitation converted");
                Ok(TrackOutcome::Updated(invitation))
            }
            InstallEffect::RecordedLate => {
                info!(invitation_id = %id, "Late install recorded without reward");
                Ok(TrackOutcome::Updated(invitation))
            }
            InstallEffect::Unchanged if invitation.has_pending_install_credit() => {
                let Some((invitation, claimed)) = self.lifecycle.claim_install_credits(id).await?
                else {
                    return Ok(TrackOutcome::NotFound);
                };
                if claimed.is_empty() {
                    return Ok(TrackOutcome::Unchanged(invitation));
                }
                self.apply_install_credits(&invitation, &claimed).await?;
                info!(invitation_id = %id, credits = claimed.len(), "Pending install credits settled");
                Ok(TrackOutcome::Updated(invitation))
            }
            InstallEffect::Unchanged => {
                debug!(invitation_id = %id, status = %invitation.status, "Install replay ignored");
                Ok(TrackOutcome::Unchanged(invitation))
            }
        }
    }

    /// Apply claimed install credits to the sender's ledger, in order.
    ///
    /// On failure the claims not applied are released so the next install
    /// replay retries them. A write that timed out keeps its claim, since it
    /// may have landed.
    async fn apply_install_credits(
        &self,
        invitation: &Invitation,
        credits: &[InstallCredit],
    ) -> Result<(), InvitationError> {
        let id = invitation.id;
        let sender_id = invitation.sender_id;

        for (applied, credit) in credits.iter().enumerate() {
            let result = match credit {
                InstallCredit::AcceptedCount => self.ledgers.record_accepted(sender_id).await,
                InstallCredit::Award => {
                    self.ledgers
                        .credit_invites(sender_id, self.rewards.install_award())
                        .await
                }
            };

            let Err(e) = result else {
                continue;
            };
            error!(invitation_id = %id, sender_id = %sender_id, credit = %credit, error = %e, "Install credit failed");

            let unapplied = if e == RepositoryError::Timeout {
                &credits[applied + 1..]
            } else {
                &credits[applied..]
            };
            if !unapplied.is_empty() {
                if let Err(release) = self.lifecycle.release_install_credits(id, unapplied).await {
                    error!(invitation_id = %id, error = %release, "Could not release install credit claims");
                }
            }
            return Err(e.into());
        }

        Ok(())
    }

    pub async fn get_invitation(&self, id: Uuid) -> Result<Option<Invitation>, InvitationError> {
        Ok(self.lifecycle.load(id).await?)
    }

    /// Invitations of a sender, newest first.
    pub async fn list_invitations(&self, sender_id: Uuid) -> Result<Vec<Invitation>, InvitationError> {
        Ok(self.lifecycle.list_for_sender(sender_id).await?)
    }

    pub async fn expire(&self, id: Uuid) -> Result<Option<Invitation>, InvitationError> {
        Ok(self.lifecycle.expire(id).await?)
    }

    pub async fn send_reminder(&self, id: Uuid) -> Result<ReminderOutcome, InvitationError> {
        Ok(self.reminders.send_reminder(id).await?)
    }

    /// Remind every live invitation of a sender.
    pub async fn remind_pending(
        &self,
        sender_id: Uuid,
    ) -> Result<Vec<ScheduledReminder>, InvitationError> {
        let invitations = self.lifecycle.list_for_sender(sender_id).await?;

        let mut scheduled = Vec::new();
        for invitation in invitations.iter().filter(|i| !i.is_terminal()) {
            if let ReminderOutcome::Scheduled(reminder) =
                self.reminders.send_reminder(invitation.id).await?
            {
                scheduled.push(reminder);
            }
        }

        info!(sender_id = %sender_id, count = scheduled.len(), "Pending invitations reminded");
        Ok(scheduled)
    }

    pub async fn quota(&self, user_id: Uuid) -> Result<QuotaLedger, InvitationError> {
        let ledger = self.ledgers.ledger(user_id).await?;
        debug!(
            user_id = %user_id,
            available = ledger.field(LedgerField::AvailableInvites),
            acceptance_rate = ledger.acceptance_rate(),
            "Quota read"
        );
        Ok(ledger)
    }

    /// Store the user's activity streak and credit the part of its award the
    /// current run has not been paid yet. Returns the invites credited by
    /// this call.
    pub async fn record_streak(&self, user_id: Uuid, days: i32) -> Result<i32, InvitationError> {
        Ok(self
            .ledgers
            .apply_streak(user_id, days, &self.rewards, self.lifecycle.now())
            .await?)
    }

    /// Credit the premium bonus if the identity provider confirms premium.
    ///
    /// Must be invoked once per activation; the subscription layer owns that.
    pub async fn credit_premium_activation(&self, user_id: Uuid) -> Result<i32, InvitationError> {
        let premium = with_timeout(
            self.policy.store_timeout(),
            self.identity.is_premium(user_id),
        )
        .await?;
        if !premium {
            debug!(user_id = %user_id, "Premium not active, nothing credited");
            return Ok(0);
        }

        let award = self.rewards.premium_award();
        self.ledgers.credit_invites(user_id, award).await?;
        info!(user_id = %user_id, award, "Premium activation credited");
        Ok(award)
    }

    /// Expire up to `limit` invitations past their TTL.
    pub async fn sweep_expired(&self, limit: i64) -> Result<usize, InvitationError> {
        Ok(self.lifecycle.sweep_expired(limit).await?)
    }
}
