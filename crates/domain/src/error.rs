//! Error types for the invitation engine.

use thiserror::Error;

/// Failure of a storage round-trip.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store operation timed out")]
    Timeout,

    #[error("Concurrent update conflict: {0}")]
    Conflict(String),
}

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum InvitationError {
    /// Quota exhausted; a business-rule rejection, not a fault.
    #[error("No invites remaining")]
    NoInvitesRemaining,

    #[error("Invalid contact: {0}")]
    InvalidContact(String),

    /// Delivery or persistence failed; any reserved quota has been returned.
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error(transparent)]
    Store(#[from] RepositoryError),
}

impl From<validator::ValidationErrors> for InvitationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    let detail = e
                        .message
                        .clone()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    format!("{field}: {detail}")
                })
            })
            .collect::<Vec<_>>()
            .join("; ");
        InvitationError::InvalidContact(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Contact;
    use validator::Validate;

    #[test]
    fn test_validation_errors_become_invalid_contact() {
        let errors = Contact::new("").validate().unwrap_err();
        let err = InvitationError::from(errors);
        match err {
            InvitationError::InvalidContact(msg) => {
                assert!(msg.contains("phone_number"));
                assert!(msg.contains("Phone number is required"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            InvitationError::NoInvitesRemaining.to_string(),
            "No invites remaining"
        );
        assert_eq!(
            InvitationError::from(RepositoryError::Timeout).to_string(),
            "Store operation timed out"
        );
    }
}
