//! Delivery transport used by the worker process.
//!
//! Message transport lives outside this service; the worker only needs a
//! notifier to satisfy the engine, and logs what it would have sent.

use domain::models::InviteNotification;
use domain::services::{DeliveryResult, Notifier};
use tracing::info;

#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn deliver(
        &self,
        recipient_phone: &str,
        notification: &InviteNotification,
    ) -> DeliveryResult {
        info!(
            recipient_phone = %recipient_phone,
            invitation_id = %notification.invitation_id(),
            kind = notification.kind(),
            body = notification.body(),
            "Delivering notification"
        );
        DeliveryResult::Delivered
    }
}
