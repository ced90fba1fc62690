use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ChangeType, PriceDropNotification};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceDropEvent {
    pub url: String,
    pub product_name: String,
    pub image_url: Option<String>,
    pub change_type: ChangeType,
    pub old_price: String,
    pub new_price: String,
    pub difference: String,
    pub percent_change: Option<f64>,
    /// Lowest price in the recorded history, including this observation.
    pub lowest_price: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PriceDropEvent {
    pub fn to_notification(&self) -> PriceDropNotification {
        PriceDropNotification::new(
            self.url.clone(),
            self.product_name.clone(),
            self.old_price.clone(),
            self.new_price.clone(),
            self.timestamp,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl NotificationResult {
    pub fn sent(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Trait for implementing notification methods (log, Discord, email)
#[async_trait]
pub trait NotifierPlugin: Send + Sync {
    /// Plugin metadata
    fn name(&self) -> &str;
    fn plugin_type(&self) -> &str;
    fn description(&self) -> &str;

    /// Core functionality
    async fn notify(&self, event: &PriceDropEvent) -> Result<NotificationResult, Box<dyn std::error::Error + Send + Sync>>;
    async fn test_connection(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;

    /// Plugin lifecycle
    async fn shutdown(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
