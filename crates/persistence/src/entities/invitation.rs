//! Invitation entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{Invitation, InvitationStatus, MessageVariant, TrackingData};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for invitation_status that maps to PostgreSQL enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "invitation_status", rename_all = "lowercase")]
pub enum InvitationStatusDb {
    Sent,
    Clicked,
    Installed,
    Expired,
}

impl From<InvitationStatusDb> for InvitationStatus {
    fn from(status: InvitationStatusDb) -> Self {
        match status {
            InvitationStatusDb::Sent => InvitationStatus::Sent,
            InvitationStatusDb::Clicked => InvitationStatus::Clicked,
            InvitationStatusDb::Installed => InvitationStatus::Installed,
            InvitationStatusDb::Expired => InvitationStatus::Expired,
        }
    }
}

impl From<InvitationStatus> for InvitationStatusDb {
    fn from(status: InvitationStatus) -> Self {
        match status {
            InvitationStatus::Sent => InvitationStatusDb::Sent,
            InvitationStatus::Clicked => InvitationStatusDb::Clicked,
            InvitationStatus::Installed => InvitationStatusDb::Installed,
            InvitationStatus::Expired => InvitationStatusDb::Expired,
        }
    }
}

/// Database enum for message_variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "message_variant", rename_all = "lowercase")]
pub enum MessageVariantDb {
    Standard,
    Playful,
    Friendly,
    Urgent,
}

impl From<MessageVariantDb> for MessageVariant {
    fn from(variant: MessageVariantDb) -> Self {
        match variant {
            MessageVariantDb::Standard => MessageVariant::Standard,
            MessageVariantDb::Playful => MessageVariant::Playful,
            MessageVariantDb::Friendly => MessageVariant::Friendly,
            MessageVariantDb::Urgent => MessageVariant::Urgent,
        }
    }
}

impl From<MessageVariant> for MessageVariantDb {
    fn from(variant: MessageVariant) -> Self {
        match variant {
            MessageVariant::Standard => MessageVariantDb::Standard,
            MessageVariant::Playful => MessageVariantDb::Playful,
            MessageVariant::Friendly => MessageVariantDb::Friendly,
            MessageVariant::Urgent => MessageVariantDb::Urgent,
        }
    }
}

/// Database row mapping for the invitations table.
#[derive(Debug, Clone, FromRow)]
pub struct InvitationEntity {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_phone: String,
    pub recipient_name: Option<String>,
    pub message: String,
    pub message_variant: MessageVariantDb,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: InvitationStatusDb,
    pub clicked_at: Option<DateTime<Utc>>,
    pub installed_at: Option<DateTime<Utc>>,
    pub reminder_count: i32,
    pub accepted_counted: bool,
    pub award_credited: bool,
    pub version: i64,
}

impl From<InvitationEntity> for Invitation {
    fn from(entity: InvitationEntity) -> Self {
        Self {
            id: entity.id,
            sender_id: entity.sender_id,
            recipient_phone: entity.recipient_phone,
            recipient_name: entity.recipient_name,
            message: entity.message,
            message_variant: entity.message_variant.into(),
            created_at: entity.created_at,
            expires_at: entity.expires_at,
            status: entity.status.into(),
            tracking_data: TrackingData {
                clicked_at: entity.clicked_at,
                installed_at: entity.installed_at,
                reminder_count: entity.reminder_count,
                accepted_counted: entity.accepted_counted,
                award_credited: entity.award_credited,
            },
            version: entity.version,
        }
    }
}
