use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::notifiers::{DiscordNotifier, EmailNotifier, LogNotifier};
use super::traits::{NotificationResult, NotifierPlugin, PriceDropEvent};
use crate::config::NotificationsConfig;
use crate::utils::error::AppError;

pub type NotifierPluginBox = Box<dyn NotifierPlugin>;

/// Fans a price drop out to every registered notifier. Delivery failures are
/// logged and counted, never returned: a broken webhook must not fail a price
/// check.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifiers: Arc<RwLock<HashMap<String, NotifierPluginBox>>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self {
            notifiers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Build a dispatcher with the log notifier plus whichever external
    /// channels are configured. A disabled config yields an empty dispatcher.
    pub async fn from_config(config: &NotificationsConfig) -> Result<Self, AppError> {
        let dispatcher = Self::new();
        if !config.enabled {
            tracing::info!("Notifications disabled");
            return Ok(dispatcher);
        }

        dispatcher.register_notifier(Box::new(LogNotifier::new())).await?;

        if let Some(discord) = DiscordNotifier::from_config(&config.discord) {
            dispatcher.register_notifier(Box::new(discord)).await?;
        }

        if config.email.is_configured() {
            let email = EmailNotifier::from_config(&config.email).map_err(|e| AppError::Plugin {
                plugin_type: "email".to_string(),
                message: format!("Invalid email configuration: {}", e),
            })?;
            if let Some(email) = email {
                dispatcher.register_notifier(Box::new(email)).await?;
            }
        }

        tracing::info!("Notifiers registered: {:?}", dispatcher.list_notifier_types().await);
        Ok(dispatcher)
    }

    /// Register a notifier plugin, replacing any of the same type
    pub async fn register_notifier(&self, plugin: NotifierPluginBox) -> Result<(), AppError> {
        let plugin_type = plugin.plugin_type().to_string();
        tracing::debug!("Registering notifier {} ({})", plugin.name(), plugin_type);

        let mut notifiers = self.notifiers.write().await;
        if let Some(previous) = notifiers.insert(plugin_type, plugin) {
            if let Err(e) = previous.shutdown().await {
                tracing::warn!("Error shutting down replaced notifier: {}", e);
            }
        }
        Ok(())
    }

    /// Check if a notifier plugin exists
    pub async fn has_notifier(&self, plugin_type: &str) -> bool {
        let notifiers = self.notifiers.read().await;
        notifiers.contains_key(plugin_type)
    }

    /// List all registered notifier types
    pub async fn list_notifier_types(&self) -> Vec<String> {
        let notifiers = self.notifiers.read().await;
        let mut types: Vec<String> = notifiers.keys().cloned().collect();
        types.sort();
        types
    }

    /// Deliver to every notifier concurrently. Returns the per-notifier
    /// results; a failing notifier shows up as an unsuccessful result.
    pub async fn dispatch(&self, event: &PriceDropEvent) -> Vec<(String, NotificationResult)> {
        let notifiers = self.notifiers.read().await;

        let deliveries = notifiers.iter().map(|(plugin_type, notifier)| async move {
            let result = match notifier.notify(event).await {
                Ok(result) => result,
                Err(e) => NotificationResult::failed(e.to_string()),
            };
            (plugin_type.clone(), result)
        });
        let results = join_all(deliveries).await;

        for (plugin_type, result) in &results {
            if result.success {
                metrics::counter!("pricewatch_notifications_sent_total", "notifier" => plugin_type.clone()).increment(1);
            } else {
                metrics::counter!("pricewatch_notifications_failed_total", "notifier" => plugin_type.clone()).increment(1);
                tracing::warn!(
                    "Notifier {} failed for {}: {}",
                    plugin_type,
                    event.url,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        results
    }

    /// Check every notifier's connectivity. Errors are reported as `false`.
    pub async fn test_all(&self) -> Vec<(String, Result<bool, String>)> {
        let notifiers = self.notifiers.read().await;
        let checks = notifiers.iter().map(|(plugin_type, notifier)| async move {
            let outcome = notifier.test_connection().await.map_err(|e| e.to_string());
            (plugin_type.clone(), outcome)
        });

        let mut results = join_all(checks).await;
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    /// Shutdown all plugins
    pub async fn shutdown(&self) -> Result<(), AppError> {
        let mut notifiers = self.notifiers.write().await;
        for (_, plugin) in notifiers.drain() {
            if let Err(e) = plugin.shutdown().await {
                tracing::warn!("Error shutting down notifier plugin: {}", e);
            }
        }
        Ok(())
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
