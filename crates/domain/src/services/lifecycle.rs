//! Invitation lifecycle manager.
//!
//! Every mutation follows read, apply lazy expiry, apply transition, then a
//! versioned conditional write. A lost race re-reads and re-applies, so
//! concurrent events on one invitation are linearized by the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::{InstallCredit, InstallEffect, Invitation};

use super::clock::Clock;
use super::repository::{with_deadline, with_timeout, InvitationRepository};

/// Attempts before a contended write gives up.
const MAX_WRITE_ATTEMPTS: usize = 8;

/// Result of a tracking event.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackOutcome {
    /// The event changed the invitation.
    Updated(Invitation),
    /// Replayed or late event; stored state left as is (apart from lazy expiry).
    Unchanged(Invitation),
    /// No invitation with that id.
    NotFound,
}

impl TrackOutcome {
    pub fn invitation(&self) -> Option<&Invitation> {
        match self {
            TrackOutcome::Updated(inv) | TrackOutcome::Unchanged(inv) => Some(inv),
            TrackOutcome::NotFound => None,
        }
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, TrackOutcome::Updated(_))
    }
}

/// Result of a versioned mutation.
#[derive(Debug, Clone)]
pub struct Mutation<T> {
    pub invitation: Invitation,
    /// Value returned by the transition closure.
    pub effect: T,
    /// Whether anything was written.
    pub written: bool,
}

#[derive(Clone)]
pub struct LifecycleManager {
    repo: Arc<dyn InvitationRepository>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl LifecycleManager {
    pub fn new(
        repo: Arc<dyn InvitationRepository>,
        clock: Arc<dyn Clock>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            clock,
            store_timeout,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Persist a newly built invitation.
    pub async fn create(
        &self,
        invitation: &Invitation,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<(), RepositoryError> {
        with_deadline(self.store_timeout, deadline, self.repo.put(invitation)).await?;
        info!(
            invitation_id = %invitation.id,
            sender_id = %invitation.sender_id,
            variant = %invitation.message_variant,
            expires_at = %invitation.expires_at,
            "Invitation created"
        );
        Ok(())
    }

    /// Apply `transition` under optimistic concurrency.
    ///
    /// The closure reports whether it changed the invitation; lazy expiry is
    /// applied first and persisted along with it. Returns `None` when the
    /// invitation does not exist.
    pub async fn mutate<T, F>(
        &self,
        id: Uuid,
        mut transition: F,
    ) -> Result<Option<Mutation<T>>, RepositoryError>
    where
        F: FnMut(&mut Invitation, DateTime<Utc>) -> (bool, T),
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let Some(mut invitation) = with_timeout(self.store_timeout, self.repo.get(id)).await?
            else {
                return Ok(None);
            };

            let now = self.clock.now();
            let expired = invitation.expire_if_due(now);
            let (changed, effect) = transition(&mut invitation, now);

            if !expired && !changed {
                return Ok(Some(Mutation {
                    invitation,
                    effect,
                    written: false,
                }));
            }

            let expected = invitation.version;
            invitation.version = expected + 1;
            let stored = with_timeout(
                self.store_timeout,
                self.repo.compare_and_put(&invitation, expected),
            )
            .await?;

            if stored {
                if expired {
                    info!(invitation_id = %id, "Invitation expired");
                }
                return Ok(Some(Mutation {
                    invitation,
                    effect,
                    written: true,
                }));
            }

            debug!(invitation_id = %id, attempt, "Concurrent update, retrying");
        }

        warn!(invitation_id = %id, "Gave up after repeated write conflicts");
        Err(RepositoryError::Conflict(format!(
            "invitation {id} is under heavy contention"
        )))
    }

    /// Read an invitation with lazy expiry applied.
    pub async fn load(&self, id: Uuid) -> Result<Option<Invitation>, RepositoryError> {
        Ok(self
            .mutate(id, |_, _| (false, ()))
            .await?
            .map(|m| m.invitation))
    }

    /// All invitations of a sender with lazy expiry applied.
    pub async fn list_for_sender(&self, sender_id: Uuid) -> Result<Vec<Invitation>, RepositoryError> {
        let invitations =
            with_timeout(self.store_timeout, self.repo.list_by_sender(sender_id)).await?;
        let now = self.clock.now();

        let mut refreshed = Vec::with_capacity(invitations.len());
        for invitation in invitations {
            if !invitation.is_terminal() && invitation.is_past_expiry(now) {
                if let Some(current) = self.load(invitation.id).await? {
                    refreshed.push(current);
                }
            } else {
                refreshed.push(invitation);
            }
        }
        Ok(refreshed)
    }

    /// Deep-link click. Idempotent: only `sent` advances.
    pub async fn track_click(&self, id: Uuid) -> Result<TrackOutcome, RepositoryError> {
        let Some(Mutation {
            invitation,
            effect: clicked,
            ..
        }) = self
            .mutate(id, |inv, now| {
                let clicked = inv.mark_clicked(now);
                (clicked, clicked)
            })
            .await?
        else {
            warn!(invitation_id = %id, "Click for unknown invitation ignored");
            return Ok(TrackOutcome::NotFound);
        };

        if clicked {
            info!(invitation_id = %id, sender_id = %invitation.sender_id, "Invitation clicked");
            Ok(TrackOutcome::Updated(invitation))
        } else {
            debug!(invitation_id = %id, status = %invitation.status, "Click replay ignored");
            Ok(TrackOutcome::Unchanged(invitation))
        }
    }

    /// App install. Returns the effect so the caller can award exactly once.
    pub async fn track_install(
        &self,
        id: Uuid,
    ) -> Result<Option<(Invitation, InstallEffect)>, RepositoryError> {
        let mutation = self
            .mutate(id, |inv, now| {
                let effect = inv.mark_installed(now);
                (effect != InstallEffect::Unchanged, effect)
            })
            .await?;

        Ok(mutation.map(|m| (m.invitation, m.effect)))
    }

    /// Claim the sender-side credits a converted invitation still owes. The
    /// claim is a versioned write, so concurrent callers cannot both win the
    /// same credit. Returns the stored invitation and what this call claimed.
    pub async fn claim_install_credits(
        &self,
        id: Uuid,
    ) -> Result<Option<(Invitation, Vec<InstallCredit>)>, RepositoryError> {
        let mutation = self
            .mutate(id, |inv, _| {
                let claimed = inv.claim_install_credits();
                (!claimed.is_empty(), claimed)
            })
            .await?;
        Ok(mutation.map(|m| (m.invitation, m.effect)))
    }

    /// Drop claims so a later install replay can apply those credits.
    pub async fn release_install_credits(
        &self,
        id: Uuid,
        credits: &[InstallCredit],
    ) -> Result<(), RepositoryError> {
        self.mutate(id, |inv, _| (inv.release_install_credits(credits), ()))
            .await?;
        Ok(())
    }

    /// Force-expire a live invitation. Returns the stored state.
    pub async fn expire(&self, id: Uuid) -> Result<Option<Invitation>, RepositoryError> {
        Ok(self
            .mutate(id, |inv, _| (inv.expire(), ()))
            .await?
            .map(|m| m.invitation))
    }

    /// Expire up to `limit` invitations whose TTL has run out.
    /// Returns how many were transitioned by this call.
    pub async fn sweep_expired(&self, limit: i64) -> Result<usize, RepositoryError> {
        let now = self.clock.now();
        let due = with_timeout(self.store_timeout, self.repo.list_expirable(now, limit)).await?;

        let mut expired = 0;
        for invitation in due {
            if let Some(mutation) = self.mutate(invitation.id, |_, _| (false, ())).await? {
                if mutation.written {
                    expired += 1;
                }
            }
        }
        Ok(expired)
    }
}
