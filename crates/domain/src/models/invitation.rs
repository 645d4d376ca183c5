//! Invitation domain models for outbound referrals.

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Greeting used when the recipient has no usable name.
const FALLBACK_FIRST_NAME: &str = "there";

/// Lifecycle status of an invitation.
///
/// Forward-only: `sent -> clicked -> installed`, or `sent|clicked -> expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Sent,
    Clicked,
    Installed,
    Expired,
}

impl InvitationStatus {
    /// Installed and expired invitations accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvitationStatus::Installed | InvitationStatus::Expired)
    }
}

impl std::fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvitationStatus::Sent => write!(f, "sent"),
            InvitationStatus::Clicked => write!(f, "clicked"),
            InvitationStatus::Installed => write!(f, "installed"),
            InvitationStatus::Expired => write!(f, "expired"),
        }
    }
}

/// Message template tag recorded on every invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageVariant {
    Standard,
    Playful,
    Friendly,
    Urgent,
}

impl MessageVariant {
    pub const ALL: [MessageVariant; 4] = [
        MessageVariant::Standard,
        MessageVariant::Playful,
        MessageVariant::Friendly,
        MessageVariant::Urgent,
    ];

    /// Pick a variant uniformly at random (template A/B split).
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        *Self::ALL
            .choose(&mut rng)
            .unwrap_or(&MessageVariant::Standard)
    }

    /// Render the default template for this variant.
    pub fn render(&self, first_name: &str, link: &str) -> String {
        match self {
            MessageVariant::Standard => format!(
                "Hey {first_name}! I've been answering polls on Pollwave and want to see your take. Join me: {link}"
            ),
            MessageVariant::Playful => format!(
                "{first_name}, I bet you can't guess how I voted today \u{1F440} Find out on Pollwave: {link}"
            ),
            MessageVariant::Friendly => format!(
                "Hi {first_name}, Pollwave is more fun with friends. I saved you a spot: {link}"
            ),
            MessageVariant::Urgent => format!(
                "{first_name}, my invite expires soon! Grab it before it's gone: {link}"
            ),
        }
    }
}

impl std::fmt::Display for MessageVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageVariant::Standard => write!(f, "standard"),
            MessageVariant::Playful => write!(f, "playful"),
            MessageVariant::Friendly => write!(f, "friendly"),
            MessageVariant::Urgent => write!(f, "urgent"),
        }
    }
}

impl std::str::FromStr for MessageVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(MessageVariant::Standard),
            "playful" => Ok(MessageVariant::Playful),
            "friendly" => Ok(MessageVariant::Friendly),
            "urgent" => Ok(MessageVariant::Urgent),
            other => Err(format!("unknown message variant: {other}")),
        }
    }
}

/// Recipient picked from the sender's contacts.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[validate(custom(function = "shared::validation::validate_phone_number"))]
    pub phone_number: String,

    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: Option<String>,
}

impl Contact {
    pub fn new(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// First word of the contact name, or a neutral greeting.
    pub fn first_name(&self) -> &str {
        self.name
            .as_deref()
            .and_then(|n| n.split_whitespace().next())
            .unwrap_or(FALLBACK_FIRST_NAME)
    }
}

/// Input for sending one invitation.
#[derive(Debug, Clone)]
pub struct SendInviteRequest {
    pub contact: Contact,
    /// Custom text replacing the variant template.
    pub message: Option<String>,
    /// Template tag; chosen at random when absent.
    pub variant: Option<MessageVariant>,
    /// Point after which no further store call may be issued.
    pub deadline: Option<tokio::time::Instant>,
}

impl SendInviteRequest {
    pub fn new(contact: Contact) -> Self {
        Self {
            contact,
            message: None,
            variant: None,
            deadline: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_variant(mut self, variant: MessageVariant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn with_deadline(mut self, deadline: tokio::time::Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Mutable tracking fields. Timestamps are write-once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clicked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<DateTime<Utc>>,
    pub reminder_count: i32,
    /// The sender's accepted counter has been claimed for this install.
    #[serde(default)]
    pub accepted_counted: bool,
    /// The install award has been claimed for the sender.
    #[serde(default)]
    pub award_credited: bool,
}

/// Sender-side ledger write owed once an invitation converts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallCredit {
    AcceptedCount,
    Award,
}

impl InstallCredit {
    pub const ALL: [InstallCredit; 2] = [InstallCredit::AcceptedCount, InstallCredit::Award];
}

impl std::fmt::Display for InstallCredit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallCredit::AcceptedCount => write!(f, "accepted_count"),
            InstallCredit::Award => write!(f, "award"),
        }
    }
}

/// Effect of an install event on an invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallEffect {
    /// First install inside the TTL: status advanced to installed and the
    /// sender's credits claimed.
    Converted,
    /// Install after expiry: recorded for audit only.
    RecordedLate,
    /// Already processed.
    Unchanged,
}

/// One outbound referral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub id: Uuid,
    pub sender_id: Uuid,
    /// Contact number with grouping separators stripped.
    pub recipient_phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    pub message: String,
    pub message_variant: MessageVariant,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: InvitationStatus,
    pub tracking_data: TrackingData,
    /// Optimistic concurrency counter, bumped on every stored write.
    pub version: i64,
}

impl Invitation {
    /// Build a freshly sent invitation.
    pub fn new(
        sender_id: Uuid,
        contact: &Contact,
        message: String,
        message_variant: MessageVariant,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id,
            recipient_phone: shared::validation::strip_phone_separators(&contact.phone_number),
            recipient_name: contact.name.clone(),
            message,
            message_variant,
            created_at,
            expires_at: created_at + ttl,
            status: InvitationStatus::Sent,
            tracking_data: TrackingData::default(),
            version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True once `now` has reached the expiry instant.
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Lazy expiry check. Returns true if the status changed.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_past_expiry(now) {
            self.expire()
        } else {
            false
        }
    }

    /// Force `sent|clicked -> expired`. Returns true if the status changed.
    pub fn expire(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = InvitationStatus::Expired;
        true
    }

    /// Record a deep-link click. Returns true if the status changed.
    pub fn mark_clicked(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != InvitationStatus::Sent || self.is_past_expiry(now) {
            return false;
        }
        self.tracking_data.clicked_at = Some(now);
        self.status = InvitationStatus::Clicked;
        true
    }

    /// Record an app install attributed to this invitation.
    pub fn mark_installed(&mut self, now: DateTime<Utc>) -> InstallEffect {
        if self.tracking_data.installed_at.is_some() {
            return InstallEffect::Unchanged;
        }
        match self.status {
            InvitationStatus::Sent | InvitationStatus::Clicked if !self.is_past_expiry(now) => {
                self.tracking_data.installed_at = Some(now);
                self.status = InvitationStatus::Installed;
                // The converting write also claims the sender's credits.
                self.claim_install_credits();
                InstallEffect::Converted
            }
            InvitationStatus::Installed => InstallEffect::Unchanged,
            _ => {
                self.tracking_data.installed_at = Some(now);
                InstallEffect::RecordedLate
            }
        }
    }

    fn install_credit_flag(&mut self, credit: InstallCredit) -> &mut bool {
        match credit {
            InstallCredit::AcceptedCount => &mut self.tracking_data.accepted_counted,
            InstallCredit::Award => &mut self.tracking_data.award_credited,
        }
    }

    /// Whether `credit` is still owed to the sender. Only conversions owe.
    pub fn install_credit_pending(&self, credit: InstallCredit) -> bool {
        let claimed = match credit {
            InstallCredit::AcceptedCount => self.tracking_data.accepted_counted,
            InstallCredit::Award => self.tracking_data.award_credited,
        };
        self.status == InvitationStatus::Installed && !claimed
    }

    pub fn has_pending_install_credit(&self) -> bool {
        InstallCredit::ALL
            .iter()
            .any(|credit| self.install_credit_pending(*credit))
    }

    /// Claim every pending credit. Returns what this call claimed.
    pub fn claim_install_credits(&mut self) -> Vec<InstallCredit> {
        let pending: Vec<InstallCredit> = InstallCredit::ALL
            .into_iter()
            .filter(|credit| self.install_credit_pending(*credit))
            .collect();
        for credit in &pending {
            *self.install_credit_flag(*credit) = true;
        }
        pending
    }

    /// Give back claims whose ledger writes did not happen.
    /// Returns true if any claim was released.
    pub fn release_install_credits(&mut self, credits: &[InstallCredit]) -> bool {
        if self.status != InvitationStatus::Installed {
            return false;
        }
        let mut released = false;
        for credit in credits {
            let flag = self.install_credit_flag(*credit);
            released |= *flag;
            *flag = false;
        }
        released
    }

    /// Reminders are only meaningful for live, unconverted invitations.
    pub fn can_remind(&self, now: DateTime<Utc>) -> bool {
        !self.is_terminal() && !self.is_past_expiry(now)
    }

    /// Bump the reminder counter. Returns false if reminding is not allowed.
    pub fn record_reminder(&mut self, now: DateTime<Utc>) -> bool {
        if !self.can_remind(now) {
            return false;
        }
        self.tracking_data.reminder_count += 1;
        true
    }

    /// Time left before expiry, clamped at zero.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

/// Build the deep link carried in invite messages.
pub fn invite_link(base_url: &str, invitation_id: Uuid) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), invitation_id)
}

/// Compose the outbound message body.
///
/// A non-blank custom message wins over the template; the link is appended
/// when the custom text does not already carry it.
pub fn compose_message(
    variant: MessageVariant,
    custom: Option<&str>,
    contact: &Contact,
    link: &str,
) -> String {
    match custom.map(str::trim).filter(|m| !m.is_empty()) {
        Some(text) if text.contains(link) => text.to_string(),
        Some(text) => format!("{text} {link}"),
        None => variant.render(contact.first_name(), link),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(now: DateTime<Utc>) -> Invitation {
        Invitation::new(
            Uuid::new_v4(),
            &Contact::new("5551234567").with_name("Ada Lovelace"),
            "hello".to_string(),
            MessageVariant::Standard,
            now,
            Duration::hours(24),
        )
    }

    #[test]
    fn test_invitation_status_display() {
        assert_eq!(InvitationStatus::Sent.to_string(), "sent");
        assert_eq!(InvitationStatus::Clicked.to_string(), "clicked");
        assert_eq!(InvitationStatus::Installed.to_string(), "installed");
        assert_eq!(InvitationStatus::Expired.to_string(), "expired");
    }

    #[test]
    fn test_message_variant_parse() {
        for variant in MessageVariant::ALL {
            let parsed: MessageVariant = variant.to_string().parse().unwrap();
            assert_eq!(parsed, variant);
        }
        assert!("sarcastic".parse::<MessageVariant>().is_err());
    }

    #[test]
    fn test_new_invitation_defaults() {
        let now = Utc::now();
        let invitation = sample(now);
        assert_eq!(invitation.status, InvitationStatus::Sent);
        assert_eq!(invitation.tracking_data, TrackingData::default());
        assert_eq!(invitation.expires_at, now + Duration::hours(24));
        assert_eq!(invitation.version, 0);
    }

    #[test]
    fn test_recipient_phone_stored_without_separators() {
        let contact = Contact::new("  +1 (555) . 123 -  45 - 67   ---  ...  ");
        assert!(contact.validate().is_ok());
        assert!(contact.phone_number.len() > 32);

        let invitation = Invitation::new(
            Uuid::new_v4(),
            &contact,
            "hello".to_string(),
            MessageVariant::Standard,
            Utc::now(),
            Duration::hours(24),
        );
        assert_eq!(invitation.recipient_phone, "+15551234567");
    }

    #[test]
    fn test_click_sets_clicked_at_once() {
        let now = Utc::now();
        let mut invitation = sample(now);

        assert!(invitation.mark_clicked(now + Duration::minutes(5)));
        let first = invitation.tracking_data.clicked_at;

        assert!(!invitation.mark_clicked(now + Duration::minutes(10)));
        assert_eq!(invitation.tracking_data.clicked_at, first);
        assert_eq!(invitation.status, InvitationStatus::Clicked);
    }

    #[test]
    fn test_install_from_sent_and_clicked() {
        let now = Utc::now();

        let mut direct = sample(now);
        assert_eq!(direct.mark_installed(now), InstallEffect::Converted);
        assert_eq!(direct.status, InvitationStatus::Installed);

        let mut clicked = sample(now);
        clicked.mark_clicked(now);
        assert_eq!(clicked.mark_installed(now), InstallEffect::Converted);
        assert_eq!(clicked.mark_installed(now), InstallEffect::Unchanged);
    }

    #[test]
    fn test_late_install_is_audit_only() {
        let now = Utc::now();
        let mut invitation = sample(now);
        let later = now + Duration::hours(25);

        assert!(invitation.expire_if_due(later));
        assert_eq!(invitation.mark_installed(later), InstallEffect::RecordedLate);
        assert_eq!(invitation.status, InvitationStatus::Expired);
        assert_eq!(invitation.tracking_data.installed_at, Some(later));
        assert_eq!(invitation.mark_installed(later), InstallEffect::Unchanged);
    }

    #[test]
    fn test_conversion_claims_install_credits() {
        let now = Utc::now();
        let mut invitation = sample(now);
        assert!(!invitation.has_pending_install_credit());

        invitation.mark_installed(now);
        assert!(invitation.tracking_data.accepted_counted);
        assert!(invitation.tracking_data.award_credited);
        assert!(invitation.claim_install_credits().is_empty());

        assert!(invitation.release_install_credits(&[InstallCredit::Award]));
        assert!(!invitation.release_install_credits(&[InstallCredit::Award]));
        assert!(invitation.install_credit_pending(InstallCredit::Award));
        assert!(!invitation.install_credit_pending(InstallCredit::AcceptedCount));

        assert_eq!(invitation.claim_install_credits(), vec![InstallCredit::Award]);
        assert!(!invitation.has_pending_install_credit());
    }

    #[test]
    fn test_late_install_owes_no_credit() {
        let now = Utc::now();
        let mut invitation = sample(now);
        let later = now + Duration::hours(25);
        invitation.expire_if_due(later);
        invitation.mark_installed(later);

        assert!(!invitation.has_pending_install_credit());
        assert!(invitation.claim_install_credits().is_empty());
        assert!(!invitation.release_install_credits(&InstallCredit::ALL));
    }

    #[test]
    fn test_terminal_states_do_not_regress() {
        let now = Utc::now();
        let mut installed = sample(now);
        installed.mark_installed(now);
        assert!(!installed.expire_if_due(now + Duration::days(3)));
        assert!(!installed.mark_clicked(now));
        assert_eq!(installed.status, InvitationStatus::Installed);

        let mut expired = sample(now);
        expired.expire();
        assert!(!expired.mark_clicked(now));
        assert_eq!(expired.status, InvitationStatus::Expired);
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let mut invitation = sample(now);
        assert!(!invitation.expire_if_due(invitation.expires_at - Duration::seconds(1)));
        assert!(invitation.expire_if_due(invitation.expires_at));
    }

    #[test]
    fn test_record_reminder_only_when_live() {
        let now = Utc::now();
        let mut invitation = sample(now);
        assert!(invitation.record_reminder(now));
        assert!(invitation.record_reminder(now));
        assert_eq!(invitation.tracking_data.reminder_count, 2);

        assert!(!invitation.record_reminder(invitation.expires_at));
        assert_eq!(invitation.tracking_data.reminder_count, 2);
    }

    #[test]
    fn test_contact_validation() {
        assert!(Contact::new("5551234567").validate().is_ok());
        assert!(Contact::new("").validate().is_err());
        assert!(Contact::new("not a number").validate().is_err());

        let long_name = Contact::new("5551234567").with_name("x".repeat(101));
        assert!(long_name.validate().is_err());
    }

    #[test]
    fn test_contact_first_name() {
        assert_eq!(Contact::new("1").with_name("Ada Lovelace").first_name(), "Ada");
        assert_eq!(Contact::new("1").first_name(), "there");
        assert_eq!(Contact::new("1").with_name("   ").first_name(), "there");
    }

    #[test]
    fn test_compose_message() {
        let contact = Contact::new("5551234567").with_name("Grace Hopper");
        let link = "https://pollwave.app/i/abc";

        let templated = compose_message(MessageVariant::Friendly, None, &contact, link);
        assert!(templated.starts_with("Hi Grace"));
        assert!(templated.ends_with(link));

        let custom = compose_message(MessageVariant::Friendly, Some(" come vote "), &contact, link);
        assert_eq!(custom, format!("come vote {link}"));

        let blank = compose_message(MessageVariant::Urgent, Some("   "), &contact, link);
        assert!(blank.contains("expires soon"));

        let with_link = format!("tap {link} now");
        assert_eq!(
            compose_message(MessageVariant::Standard, Some(&with_link), &contact, link),
            with_link
        );
    }

    #[test]
    fn test_invite_link() {
        let id = Uuid::nil();
        assert_eq!(
            invite_link("https://pollwave.app/i/", id),
            format!("https://pollwave.app/i/{id}")
        );
    }

    #[test]
    fn test_invitation_serialization() {
        let invitation = sample(Utc::now());
        let json = serde_json::to_string(&invitation).unwrap();
        assert!(json.contains("\"status\":\"sent\""));
        assert!(json.contains("\"messageVariant\":\"standard\""));
        assert!(json.contains("\"reminderCount\":0"));
        assert!(!json.contains("clickedAt"));
    }
}
