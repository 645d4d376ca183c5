//! Invite worker: runs the invitation engine against PostgreSQL and keeps
//! stored statuses current with periodic background jobs.

pub mod config;
pub mod jobs;
pub mod logging;
pub mod notifier;

use std::sync::Arc;

use domain::services::{InvitePolicy, StaticIdentityProvider};
use domain::InvitationEngine;
use persistence::PgInvitationRepository;
use sqlx::PgPool;

/// Wire the engine to the PostgreSQL store.
pub fn build_engine(pool: PgPool, policy: InvitePolicy) -> Arc<InvitationEngine> {
    Arc::new(InvitationEngine::new(
        Arc::new(PgInvitationRepository::new(pool)),
        Arc::new(notifier::LogNotifier),
        Arc::new(StaticIdentityProvider::new()),
        policy,
    ))
}
