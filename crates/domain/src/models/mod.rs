//! Domain models for the invitation engine.

pub mod invitation;
pub mod notification;
pub mod quota;

pub use invitation::{
    compose_message, invite_link, Contact, InstallCredit, InstallEffect, Invitation, InvitationStatus,
    MessageVariant, SendInviteRequest, TrackingData,
};
pub use notification::{InvitationMessage, InviteNotification, ReminderMessage};
pub use quota::{LedgerField, QuotaLedger};
