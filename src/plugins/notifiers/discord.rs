use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::config::DiscordConfig;
use crate::models::ChangeType;
use crate::plugins::traits::{NotificationResult, NotifierPlugin, PriceDropEvent};

const FOOTER_TEXT: &str = "Pricewatch";

pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
    username: String,
    avatar_url: Option<String>,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>, username: impl Into<String>, avatar_url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            webhook_url: webhook_url.into(),
            username: username.into(),
            avatar_url,
        }
    }

    /// Returns `None` when no webhook is configured.
    pub fn from_config(config: &DiscordConfig) -> Option<Self> {
        let webhook_url = config.webhook_url.as_deref()?.trim();
        if webhook_url.is_empty() {
            return None;
        }
        Some(Self::new(webhook_url, config.username.clone(), config.avatar_url.clone()))
    }

    fn get_embed_color(&self, change_type: &ChangeType) -> u32 {
        match change_type {
            ChangeType::Decreased => 0x00ff00, // Green for price drops
            ChangeType::Increased => 0xff9900,
            ChangeType::Unchanged => 0x0099ff,
        }
    }

    fn get_emoji(&self, change_type: &ChangeType) -> &str {
        match change_type {
            ChangeType::Decreased => "📉",
            ChangeType::Increased => "📈",
            ChangeType::Unchanged => "📊",
        }
    }

    fn create_embed(&self, event: &PriceDropEvent) -> serde_json::Value {
        let mut fields = vec![json!({
            "name": "💰 Price Drop!",
            "value": format!(
                "**Old:** {}\n**New:** {}\n**Change:** {}",
                event.old_price, event.new_price, event.difference
            ),
            "inline": false
        })];

        if let Some(lowest) = &event.lowest_price {
            fields.push(json!({
                "name": "🎯 Lowest Recorded",
                "value": lowest,
                "inline": true
            }));
        }

        let mut embed = json!({
            "title": format!("{} {}", self.get_emoji(&event.change_type), event.product_name),
            "url": event.url,
            "color": self.get_embed_color(&event.change_type),
            "timestamp": event.timestamp.to_rfc3339(),
            "fields": fields,
            "footer": { "text": FOOTER_TEXT }
        });

        if let Some(image_url) = &event.image_url {
            embed["thumbnail"] = json!({ "url": image_url });
        }

        embed
    }

    fn create_webhook_payload(&self, event: &PriceDropEvent) -> serde_json::Value {
        let mut payload = json!({
            "username": self.username,
            "embeds": [self.create_embed(event)]
        });

        if let Some(avatar_url) = &self.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }

        payload
    }

    async fn post(&self, payload: &serde_json::Value) -> Result<reqwest::Response, Box<dyn std::error::Error + Send + Sync>> {
        let response = self.client.post(&self.webhook_url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Discord webhook returned {}: {}", status, body.trim()).into());
        }
        Ok(response)
    }
}

#[async_trait]
impl NotifierPlugin for DiscordNotifier {
    fn name(&self) -> &str {
        "Discord Notifier"
    }

    fn plugin_type(&self) -> &str {
        "discord"
    }

    fn description(&self) -> &str {
        "Sends rich notifications via Discord webhooks with embeds"
    }

    async fn notify(&self, event: &PriceDropEvent) -> Result<NotificationResult, Box<dyn std::error::Error + Send + Sync>> {
        let payload = self.create_webhook_payload(event);
        self.post(&payload).await?;

        tracing::debug!("Discord notification sent for {}", event.url);
        Ok(NotificationResult::sent(Some(format!(
            "discord-{}",
            event.timestamp.timestamp_millis()
        ))))
    }

    async fn test_connection(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let payload = json!({
            "content": "🧪 Pricewatch connection test",
            "username": self.username
        });
        self.post(&payload).await?;
        Ok(true)
    }

    async fn shutdown(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event() -> PriceDropEvent {
        PriceDropEvent {
            url: "https://shop.example/p/1".to_string(),
            product_name: "Kettle".to_string(),
            image_url: Some("https://cdn.example/k.jpg".to_string()),
            change_type: ChangeType::Decreased,
            old_price: "$30".to_string(),
            new_price: "$25".to_string(),
            difference: "-5 (-16.7%)".to_string(),
            percent_change: Some(-16.7),
            lowest_price: Some("$25".to_string()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_from_config_requires_webhook() {
        assert!(DiscordNotifier::from_config(&DiscordConfig::default()).is_none());

        let config = DiscordConfig {
            webhook_url: Some("https://discord.com/api/webhooks/1/abc".to_string()),
            ..DiscordConfig::default()
        };
        assert!(DiscordNotifier::from_config(&config).is_some());
    }

    #[test]
    fn test_embed_layout() {
        let notifier = DiscordNotifier::new("http://localhost/hook", "Pricewatch", None);
        let embed = notifier.create_embed(&event());

        assert_eq!(embed["title"], "📉 Kettle");
        assert_eq!(embed["color"], 0x00ff00);
        assert_eq!(embed["thumbnail"]["url"], "https://cdn.example/k.jpg");
        assert_eq!(embed["fields"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_notify_posts_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(json!({ "username": "Pricewatch" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = DiscordNotifier::new(format!("{}/hook", server.uri()), "Pricewatch", None);
        let result = notifier.notify(&event()).await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_notify_reports_webhook_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Unknown Webhook"))
            .mount(&server)
            .await;

        let notifier = DiscordNotifier::new(format!("{}/hook", server.uri()), "Pricewatch", None);
        let err = notifier.notify(&event()).await.unwrap_err();
        assert!(err.to_string().contains("Unknown Webhook"));
    }
}
