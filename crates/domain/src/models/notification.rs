//! Notification payloads handed to the message-delivery collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::invitation::{Invitation, MessageVariant};

/// Initial invite SMS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationMessage {
    pub invitation_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    pub body: String,
    pub link: String,
    pub variant: MessageVariant,
}

/// Nudge for an invitation that has not converted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderMessage {
    pub invitation_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    pub body: String,
    pub link: String,
    pub reminder_number: i32,
    pub expires_at: DateTime<Utc>,
}

/// Every notification kind the engine asks to deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InviteNotification {
    Invitation(InvitationMessage),
    Reminder(ReminderMessage),
}

impl InviteNotification {
    pub fn invitation(invitation: &Invitation, link: String) -> Self {
        InviteNotification::Invitation(InvitationMessage {
            invitation_id: invitation.id,
            recipient_name: invitation.recipient_name.clone(),
            body: invitation.message.clone(),
            link,
            variant: invitation.message_variant,
        })
    }

    pub fn reminder(invitation: &Invitation, link: String, reminder_number: i32) -> Self {
        let first_name = invitation
            .recipient_name
            .as_deref()
            .and_then(|n| n.split_whitespace().next())
            .unwrap_or("there");
        InviteNotification::Reminder(ReminderMessage {
            invitation_id: invitation.id,
            recipient_name: invitation.recipient_name.clone(),
            body: format!("Hey {first_name}, your Pollwave invite is still waiting: {link}"),
            link,
            reminder_number,
            expires_at: invitation.expires_at,
        })
    }

    pub fn invitation_id(&self) -> Uuid {
        match self {
            InviteNotification::Invitation(m) => m.invitation_id,
            InviteNotification::Reminder(m) => m.invitation_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InviteNotification::Invitation(_) => "invitation",
            InviteNotification::Reminder(_) => "reminder",
        }
    }

    pub fn body(&self) -> &str {
        match self {
            InviteNotification::Invitation(m) => &m.body,
            InviteNotification::Reminder(m) => &m.body,
        }
    }
}
