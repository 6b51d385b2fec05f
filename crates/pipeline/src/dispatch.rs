//! Notification dispatch seam.
//!
//! The evaluator records a notification first and dispatches after, so a
//! failed delivery never loses the breach record.

use async_trait::async_trait;
use tracing::info;

use pulse_core::{AlertNotification, Result};

/// Delivery channel for fired alerts.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notification: &AlertNotification) -> Result<()>;
}

/// Dispatcher that writes notifications to the structured log. The default
/// channel; real email/webhook delivery plugs in behind the same trait.
#[derive(Debug, Default, Clone)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn dispatch(&self, notification: &AlertNotification) -> Result<()> {
        info!(
            rule_id = %notification.rule_id,
            site_id = %notification.site_id,
            email = %notification.notification_email,
            message = %notification.message,
            "alert notification"
        );
        Ok(())
    }
}
