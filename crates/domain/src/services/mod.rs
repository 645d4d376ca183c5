//! Invitation engine services.
//!
//! Services contain the business logic that operates on domain models and
//! the collaborator traits they depend on.

pub mod clock;
pub mod engine;
pub mod identity;
pub mod lifecycle;
pub mod memory;
pub mod notifier;
pub mod policy;
pub mod quota_ledger;
pub mod reminder;
pub mod repository;
pub mod rewards;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::InvitationEngine;
pub use identity::{IdentityProvider, StaticIdentityProvider};
pub use lifecycle::{LifecycleManager, Mutation, TrackOutcome};
pub use memory::InMemoryInvitationRepository;
pub use notifier::{DeliveryResult, MockNotifier, Notifier, RecordedDelivery};
pub use policy::{InvitePolicy, ReminderPolicy, RewardPolicy};
pub use quota_ledger::QuotaLedgerService;
pub use reminder::{
    ReminderDelivery, ReminderOutcome, ReminderScheduler, ScheduledReminder, SkipReason,
};
pub use repository::{with_deadline, with_timeout, InvitationRepository};
pub use rewards::RewardCalculator;
