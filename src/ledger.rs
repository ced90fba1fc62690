//! Storage-backed price ledger.
//!
//! Tracked items and price-drop notifications are each kept as one JSON
//! array in the key-value store. Every mutation is a read-modify-write of the
//! whole array, serialized by `write_lock` so concurrent checks never lose
//! each other's updates.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Mutex;
use validator::Validate;

use crate::config::LedgerConfig;
use crate::models::{normalize_url, NewTrackedItem, PriceDropNotification, PriceObservation, TrackedItem};
use crate::price_comparator::{self, PriceChange};
use crate::storage::{KeyValueStore, NOTIFICATIONS_KEY, TRACKED_ITEMS_KEY};
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub url: String,
    pub appended: bool,
    pub previous: Option<PriceObservation>,
    pub current: PriceObservation,
    pub change: Option<PriceChange>,
    pub evicted: usize,
}

impl RecordOutcome {
    pub fn is_drop(&self) -> bool {
        self.change.as_ref().is_some_and(PriceChange::is_drop)
    }
}

pub struct PriceLedger {
    store: Arc<dyn KeyValueStore>,
    config: LedgerConfig,
    write_lock: Mutex<()>,
}

impl PriceLedger {
    pub fn new(store: Arc<dyn KeyValueStore>, config: LedgerConfig) -> Self {
        Self {
            store,
            config,
            write_lock: Mutex::new(()),
        }
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        match self.store.get(key).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save<T: Serialize>(&self, key: &str, records: &[T]) -> Result<()> {
        self.store.set(key, serde_json::to_value(records)?).await
    }

    pub async fn list(&self) -> Result<Vec<TrackedItem>> {
        self.load(TRACKED_ITEMS_KEY).await
    }

    pub async fn get(&self, url: &str) -> Result<Option<TrackedItem>> {
        let url = normalize_url(url)?;
        let items: Vec<TrackedItem> = self.list().await?;
        Ok(items.into_iter().find(|item| item.url == url))
    }

    pub async fn track(&self, mut new_item: NewTrackedItem) -> Result<TrackedItem> {
        new_item.url = normalize_url(&new_item.url)?;
        new_item.validate()?;

        let _guard = self.write_lock.lock().await;
        let mut items: Vec<TrackedItem> = self.list().await?;
        if items.iter().any(|item| item.url == new_item.url) {
            return Err(AppError::AlreadyTracked { url: new_item.url });
        }

        let item = TrackedItem::new(new_item, Utc::now());
        items.push(item.clone());
        self.save(TRACKED_ITEMS_KEY, &items).await?;

        tracing::info!("Tracking {} ({})", item.url, item.name);
        Ok(item)
    }

    pub async fn untrack(&self, url: &str) -> Result<TrackedItem> {
        let url = normalize_url(url)?;

        let _guard = self.write_lock.lock().await;
        let mut items: Vec<TrackedItem> = self.list().await?;
        let position = items
            .iter()
            .position(|item| item.url == url)
            .ok_or_else(|| AppError::NotFound { resource: url.clone() })?;

        let removed = items.remove(position);
        self.save(TRACKED_ITEMS_KEY, &items).await?;

        tracing::info!("Stopped tracking {}", url);
        Ok(removed)
    }

    /// Apply `f` to the stored item for `url` and persist the result.
    async fn update_item<R>(&self, url: &str, f: impl FnOnce(&mut TrackedItem) -> R) -> Result<R> {
        let url = normalize_url(url)?;

        let _guard = self.write_lock.lock().await;
        let mut items: Vec<TrackedItem> = self.list().await?;
        let item = items
            .iter_mut()
            .find(|item| item.url == url)
            .ok_or(AppError::NotFound { resource: url })?;

        let result = f(item);
        self.save(TRACKED_ITEMS_KEY, &items).await?;
        Ok(result)
    }

    /// Record a freshly observed price. The observation is only appended when
    /// it differs numerically from the latest entry; `last_checked` is
    /// updated either way.
    pub async fn record_observation(&self, url: &str, price: &str, at: DateTime<Utc>) -> Result<RecordOutcome> {
        let max_entries = self.config.max_history_entries;
        let observation = PriceObservation::new(price, at);

        let outcome = self
            .update_item(url, |item| {
                item.last_checked = Some(at);
                let previous = item.current_price().cloned();

                let appended = match &previous {
                    Some(prev) => price_comparator::prices_differ(&prev.price, &observation.price),
                    None => true,
                };
                let change = previous
                    .as_ref()
                    .filter(|_| appended)
                    .map(|prev| price_comparator::compare(&prev.price, &observation.price));

                let evicted = if appended {
                    item.push_observation(observation.clone(), max_entries)
                } else {
                    0
                };

                RecordOutcome {
                    url: item.url.clone(),
                    appended,
                    previous,
                    current: observation,
                    change,
                    evicted,
                }
            })
            .await?;

        if outcome.appended {
            tracing::debug!(
                "Recorded {} for {} (previous: {:?})",
                outcome.current.price,
                outcome.url,
                outcome.previous.as_ref().map(|p| &p.price)
            );
        }
        Ok(outcome)
    }

    pub async fn mark_checked(&self, url: &str, at: DateTime<Utc>) -> Result<()> {
        self.update_item(url, |item| item.last_checked = Some(at)).await
    }

    /// Refresh display fields from the latest extraction. Empty names are ignored.
    pub async fn update_details(&self, url: &str, name: Option<&str>, image_url: Option<&str>) -> Result<()> {
        self.update_item(url, |item| {
            if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
                item.name = name.to_string();
            }
            if let Some(image_url) = image_url {
                item.image_url = Some(image_url.to_string());
            }
        })
        .await
    }

    /// Items that need checking at `now`, least recently checked first.
    pub async fn due_items(&self, interval: Duration, now: DateTime<Utc>) -> Result<Vec<TrackedItem>> {
        let mut due: Vec<TrackedItem> = self
            .list()
            .await?
            .into_iter()
            .filter(|item| item.is_due(interval, now))
            .collect();
        // None sorts before Some, so never-checked items go first
        due.sort_by_key(|item| item.last_checked);
        Ok(due)
    }

    pub async fn notifications(&self) -> Result<Vec<PriceDropNotification>> {
        self.load(NOTIFICATIONS_KEY).await
    }

    pub async fn push_notification(&self, notification: PriceDropNotification) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut notifications: Vec<PriceDropNotification> = self.notifications().await?;
        notifications.push(notification);

        let overflow = notifications.len().saturating_sub(self.config.max_notifications);
        if overflow > 0 {
            notifications.drain(..overflow);
        }
        self.save(NOTIFICATIONS_KEY, &notifications).await
    }

    pub async fn unread_notifications(&self) -> Result<usize> {
        let notifications: Vec<PriceDropNotification> = self.notifications().await?;
        Ok(notifications.iter().filter(|n| !n.read).count())
    }

    pub async fn mark_notifications_read(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut notifications: Vec<PriceDropNotification> = self.notifications().await?;
        let mut marked = 0;
        for notification in notifications.iter_mut().filter(|n| !n.read) {
            notification.mark_read();
            marked += 1;
        }
        if marked > 0 {
            self.save(NOTIFICATIONS_KEY, &notifications).await?;
        }
        Ok(marked)
    }

    pub async fn clear_notifications(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store.remove(NOTIFICATIONS_KEY).await
    }
}
