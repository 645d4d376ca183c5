//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod invitation;
pub mod quota_ledger;

pub use invitation::{InvitationEntity, InvitationStatusDb, MessageVariantDb};
pub use quota_ledger::QuotaLedgerEntity;
