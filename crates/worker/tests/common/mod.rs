//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use domain::models::{Contact, SendInviteRequest};
use domain::services::{
    InMemoryInvitationRepository, InvitePolicy, ManualClock, MockNotifier, StaticIdentityProvider,
};
use domain::InvitationEngine;
use fake::faker::name::en::Name;
use fake::Fake;

pub struct TestEngine {
    pub repo: Arc<InMemoryInvitationRepository>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<MockNotifier>,
    pub identity: Arc<StaticIdentityProvider>,
    pub engine: Arc<InvitationEngine>,
}

/// Engine over in-memory collaborators with a controllable clock.
pub fn test_engine(policy: InvitePolicy) -> TestEngine {
    let repo = Arc::new(InMemoryInvitationRepository::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let notifier = Arc::new(MockNotifier::new());
    let identity = Arc::new(StaticIdentityProvider::new());
    let engine = Arc::new(InvitationEngine::with_clock(
        repo.clone(),
        notifier.clone(),
        identity.clone(),
        clock.clone(),
        policy,
    ));

    TestEngine {
        repo,
        clock,
        notifier,
        identity,
        engine,
    }
}

pub fn policy_with_quota(quota: i32) -> InvitePolicy {
    InvitePolicy {
        default_available_invites: quota,
        ..InvitePolicy::default()
    }
}

/// Invite request for a contact with a generated name.
pub fn invite_request(phone: &str) -> SendInviteRequest {
    let name: String = Name().fake();
    SendInviteRequest::new(Contact::new(phone).with_name(name))
}
