//! Glue between extraction, the ledger and notifications: one URL at a time,
//! or every due URL with bounded concurrency.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;

use crate::config::SchedulerConfig;
use crate::extractor::{ExtractedProduct, PriceExtractor};
use crate::ledger::{PriceLedger, RecordOutcome};
use crate::models::{normalize_url, NewTrackedItem, TrackedItem};
use crate::plugins::{NotificationDispatcher, PriceDropEvent};
use crate::utils::error::{AppError, Result};

const MAX_NAME_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub url: String,
    pub success: bool,
    pub price: Option<String>,
    pub previous_price: Option<String>,
    /// A new history entry was written.
    pub price_changed: bool,
    pub price_drop: bool,
    pub notifications_sent: usize,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl CheckOutcome {
    fn failed(url: &str, error: impl Into<String>, started: Instant) -> Self {
        Self {
            url: url.to_string(),
            success: false,
            price: None,
            previous_price: None,
            price_changed: false,
            price_drop: false,
            notifications_sent: 0,
            error: Some(error.into()),
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRunSummary {
    pub started_at: DateTime<Utc>,
    pub checked: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub price_changes: usize,
    pub price_drops: usize,
    pub duration_ms: u64,
    pub outcomes: Vec<CheckOutcome>,
}

impl CheckRunSummary {
    fn from_outcomes(started_at: DateTime<Utc>, started: Instant, outcomes: Vec<CheckOutcome>) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.success).count();
        Self {
            started_at,
            checked: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            price_changes: outcomes.iter().filter(|o| o.price_changed).count(),
            price_drops: outcomes.iter().filter(|o| o.price_drop).count(),
            duration_ms: started.elapsed().as_millis() as u64,
            outcomes,
        }
    }
}

pub struct PriceChecker {
    ledger: Arc<PriceLedger>,
    extractor: Arc<dyn PriceExtractor>,
    dispatcher: NotificationDispatcher,
    config: SchedulerConfig,
}

impl PriceChecker {
    pub fn new(
        ledger: Arc<PriceLedger>,
        extractor: Arc<dyn PriceExtractor>,
        dispatcher: NotificationDispatcher,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            ledger,
            extractor,
            dispatcher,
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<PriceLedger> {
        &self.ledger
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// Start tracking a product page, recording its current price when the
    /// page shows one.
    pub async fn track_url(&self, url: &str) -> Result<TrackedItem> {
        let url = normalize_url(url)?;
        if self.ledger.get(&url).await?.is_some() {
            return Err(AppError::AlreadyTracked { url });
        }

        let product = self.extractor.extract(&url).await?;
        if product.price.is_none() {
            tracing::warn!("No price found on {}, tracking without history", url);
        }

        self.ledger
            .track(NewTrackedItem {
                url,
                name: product.name.chars().take(MAX_NAME_CHARS).collect(),
                image_url: product.image_url,
                price: product.price,
            })
            .await
    }

    /// Check one tracked URL. Extraction failures are reported in the
    /// outcome, not as errors; only ledger failures and unknown URLs error.
    pub async fn check_url(&self, url: &str) -> Result<CheckOutcome> {
        let started = Instant::now();
        let url = normalize_url(url)?;
        let item = self
            .ledger
            .get(&url)
            .await?
            .ok_or_else(|| AppError::NotFound { resource: url.clone() })?;

        metrics::counter!("pricewatch_checks_total").increment(1);

        let product = match self.extractor.extract(&url).await {
            Ok(product) => product,
            Err(e) => return self.fail_check(&url, e.to_string(), started).await,
        };
        let Some(price) = product.price.clone() else {
            return self.fail_check(&url, "No price found on page", started).await;
        };

        self.refresh_details(&item, &product).await?;
        let outcome = self.ledger.record_observation(&url, &price, Utc::now()).await?;

        let mut notifications_sent = 0;
        if outcome.is_drop() {
            metrics::counter!("pricewatch_price_drops_total").increment(1);
            notifications_sent = self.notify_drop(&item, &product, &outcome).await?;
        }

        let duration = started.elapsed();
        metrics::histogram!("pricewatch_check_duration_seconds").record(duration.as_secs_f64());

        Ok(CheckOutcome {
            url,
            success: true,
            price: Some(outcome.current.price.clone()),
            previous_price: outcome.previous.as_ref().map(|p| p.price.clone()),
            price_changed: outcome.appended,
            price_drop: outcome.is_drop(),
            notifications_sent,
            error: None,
            duration_ms: duration.as_millis() as u64,
        })
    }

    async fn fail_check(&self, url: &str, error: impl Into<String>, started: Instant) -> Result<CheckOutcome> {
        let error = error.into();
        metrics::counter!("pricewatch_check_failures_total").increment(1);
        tracing::warn!("Price check failed for {}: {}", url, error);

        // Failed checks still count as checked so a broken page isn't retried every tick
        self.ledger.mark_checked(url, Utc::now()).await?;
        Ok(CheckOutcome::failed(url, error, started))
    }

    async fn refresh_details(&self, item: &TrackedItem, product: &ExtractedProduct) -> Result<()> {
        let name: String = product.name.chars().take(MAX_NAME_CHARS).collect();
        let name_changed = !name.trim().is_empty() && name != item.name;
        let image_changed = product.image_url.is_some() && product.image_url != item.image_url;

        if name_changed || image_changed {
            self.ledger
                .update_details(&item.url, Some(&name), product.image_url.as_deref())
                .await?;
        }
        Ok(())
    }

    async fn notify_drop(&self, item: &TrackedItem, product: &ExtractedProduct, outcome: &RecordOutcome) -> Result<usize> {
        let Some(previous) = &outcome.previous else {
            return Ok(0);
        };
        let Some(change) = &outcome.change else {
            return Ok(0);
        };

        let lowest_price = self
            .ledger
            .get(&outcome.url)
            .await?
            .and_then(|item| item.lowest_price().map(|obs| obs.price.clone()));

        let product_name = if product.name.trim().is_empty() {
            item.name.clone()
        } else {
            product.name.clone()
        };

        let event = PriceDropEvent {
            url: outcome.url.clone(),
            product_name,
            image_url: product.image_url.clone().or_else(|| item.image_url.clone()),
            change_type: change.change_type,
            old_price: previous.price.clone(),
            new_price: outcome.current.price.clone(),
            difference: change.describe(),
            percent_change: change.percent_change,
            lowest_price,
            timestamp: outcome.current.timestamp,
        };

        tracing::info!(
            "Price drop for {}: {} -> {}",
            event.url,
            event.old_price,
            event.new_price
        );

        self.ledger.push_notification(event.to_notification()).await?;

        let results = self.dispatcher.dispatch(&event).await;
        Ok(results.iter().filter(|(_, result)| result.success).count())
    }

    /// Check every item that is due at `now`.
    pub async fn check_due(&self, now: DateTime<Utc>) -> Result<CheckRunSummary> {
        let due = self.ledger.due_items(self.config.check_interval(), now).await?;
        tracing::debug!("{} item(s) due for a price check", due.len());
        Ok(self.run_checks(due.into_iter().map(|item| item.url).collect()).await)
    }

    /// Check every tracked item regardless of when it was last checked.
    pub async fn check_all(&self) -> Result<CheckRunSummary> {
        let items = self.ledger.list().await?;
        Ok(self.run_checks(items.into_iter().map(|item| item.url).collect()).await)
    }

    async fn run_checks(&self, urls: Vec<String>) -> CheckRunSummary {
        let started_at = Utc::now();
        let started = Instant::now();
        let concurrency = self.config.max_concurrent_checks.max(1);

        let outcomes: Vec<CheckOutcome> = stream::iter(urls)
            .map(|url| async move {
                let item_started = Instant::now();
                match self.check_url(&url).await {
                    Ok(outcome) => outcome,
                    // Untracked mid-run, or the store failed
                    Err(e) => {
                        tracing::error!("Price check for {} aborted: {}", url, e);
                        CheckOutcome::failed(&url, e.to_string(), item_started)
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let summary = CheckRunSummary::from_outcomes(started_at, started, outcomes);
        if summary.checked > 0 {
            tracing::info!(
                "Checked {} item(s): {} succeeded, {} failed, {} price drop(s)",
                summary.checked,
                summary.succeeded,
                summary.failed,
                summary.price_drops
            );
        }
        summary
    }
}
