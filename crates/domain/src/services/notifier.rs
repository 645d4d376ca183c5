//! Message delivery abstraction.
//!
//! The engine decides when and whether to deliver; transport belongs to the
//! surrounding infrastructure.

use std::sync::Mutex;
use std::time::Duration;

use crate::models::InviteNotification;

/// Result of a delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    /// Accepted by the transport.
    Delivered,
    /// Delivery failed.
    Failed(String),
}

impl DeliveryResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryResult::Delivered)
    }
}

/// Delivery collaborator for invite and reminder messages.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification to a phone number.
    async fn deliver(&self, recipient_phone: &str, notification: &InviteNotification)
        -> DeliveryResult;
}

/// A notification captured by [`MockNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDelivery {
    pub recipient_phone: String,
    pub notification: InviteNotification,
}

/// Mock notifier for development and testing.
///
/// Logs and records notifications but doesn't actually send them.
#[derive(Debug, Default)]
pub struct MockNotifier {
    /// Whether to simulate failures for testing.
    pub simulate_failure: bool,
    /// Artificial latency before answering.
    pub latency: Option<Duration>,
    delivered: Mutex<Vec<RecordedDelivery>>,
}

impl MockNotifier {
    /// Create a new mock notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock notifier that simulates failures.
    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            ..Self::default()
        }
    }

    /// Create a mock notifier that answers after `latency`.
    pub fn slow(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Snapshot of successful deliveries so far.
    pub fn delivered(&self) -> Vec<RecordedDelivery> {
        self.delivered
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    pub fn delivered_count(&self, kind: &str) -> usize {
        self.delivered()
            .iter()
            .filter(|d| d.notification.kind() == kind)
            .count()
    }
}

#[async_trait::async_trait]
impl Notifier for MockNotifier {
    async fn deliver(
        &self,
        recipient_phone: &str,
        notification: &InviteNotification,
    ) -> DeliveryResult {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.simulate_failure {
            tracing::warn!(
                recipient_phone = %recipient_phone,
                invitation_id = %notification.invitation_id(),
                "Mock notifier simulating failure"
            );
            return DeliveryResult::Failed("Simulated failure".to_string());
        }

        tracing::info!(
            recipient_phone = %recipient_phone,
            invitation_id = %notification.invitation_id(),
            kind = notification.kind(),
            "Mock: Would deliver notification"
        );

        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(RecordedDelivery {
                recipient_phone: recipient_phone.to_string(),
                notification: notification.clone(),
            });
        }

        DeliveryResult::Delivered
    }
}
