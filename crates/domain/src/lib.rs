//! Domain layer for the invitation engine.
//!
//! This crate contains:
//! - Domain models (Invitation, QuotaLedger, notification payloads)
//! - Collaborator traits (repository, notifier, identity, clock)
//! - The engine services and their in-memory test doubles
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;

pub use error::{InvitationError, RepositoryError};
pub use services::InvitationEngine;
