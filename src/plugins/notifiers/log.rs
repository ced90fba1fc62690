use async_trait::async_trait;

use crate::plugins::traits::{NotificationResult, NotifierPlugin, PriceDropEvent};

/// Writes price drops to the application log. Always registered, so a drop
/// is visible somewhere even when no external channel is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotifierPlugin for LogNotifier {
    fn name(&self) -> &str {
        "Log Notifier"
    }

    fn plugin_type(&self) -> &str {
        "log"
    }

    fn description(&self) -> &str {
        "Logs price drops through tracing"
    }

    async fn notify(&self, event: &PriceDropEvent) -> Result<NotificationResult, Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!(
            url = %event.url,
            old_price = %event.old_price,
            new_price = %event.new_price,
            "Price drop: {} {} -> {} ({})",
            event.product_name,
            event.old_price,
            event.new_price,
            event.difference
        );
        Ok(NotificationResult::sent(None))
    }

    async fn test_connection(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(true)
    }

    async fn shutdown(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}
