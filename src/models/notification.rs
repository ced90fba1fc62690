use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::generate_id;

/// A recorded price drop, kept in the ledger's notification list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceDropNotification {
    pub id: String,
    pub url: String,
    pub product_name: String,
    pub old_price: String,
    pub new_price: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl PriceDropNotification {
    pub fn new(
        url: impl Into<String>,
        product_name: impl Into<String>,
        old_price: impl Into<String>,
        new_price: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_id(),
            url: url.into(),
            product_name: product_name.into(),
            old_price: old_price.into(),
            new_price: new_price.into(),
            timestamp,
            read: false,
        }
    }

    pub fn mark_read(&mut self) {
        self.read = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_creation() {
        let now = Utc::now();
        let mut notification =
            PriceDropNotification::new("https://shop.example/p/1", "Headphones", "$99", "$79", now);

        assert_eq!(notification.product_name, "Headphones");
        assert_eq!(notification.old_price, "$99");
        assert_eq!(notification.new_price, "$79");
        assert_eq!(notification.id.len(), 32);
        assert!(!notification.read);

        notification.mark_read();
        assert!(notification.read);
    }

    #[test]
    fn test_read_defaults_to_false_when_missing() {
        let json = serde_json::json!({
            "id": "abc",
            "url": "https://shop.example/p/1",
            "productName": "Headphones",
            "oldPrice": "$99",
            "newPrice": "$79",
            "timestamp": "2024-05-01T10:00:00Z"
        });

        let notification: PriceDropNotification = serde_json::from_value(json).unwrap();
        assert!(!notification.read);
    }
}
