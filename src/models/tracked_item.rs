use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use validator::Validate;

use crate::models::PriceObservation;
use crate::price_comparator::parse_price;
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackedItem {
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
    /// Oldest first.
    #[serde(default)]
    pub price_history: Vec<PriceObservation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewTrackedItem {
    #[validate(url)]
    pub url: String,
    #[validate(length(min = 1, max = 500))]
    pub name: String,
    #[validate(url)]
    pub image_url: Option<String>,
    pub price: Option<String>,
}

/// Canonical form of a product URL, used as the ledger key.
pub fn normalize_url(input: &str) -> Result<String> {
    let mut url = Url::parse(input.trim())?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(AppError::Validation(format!(
            "Unsupported URL scheme '{}': {}",
            url.scheme(),
            input
        )));
    }
    url.set_fragment(None);
    Ok(url.to_string())
}

impl TrackedItem {
    pub fn new(new_item: NewTrackedItem, at: DateTime<Utc>) -> Self {
        let price_history = new_item
            .price
            .filter(|p| !p.trim().is_empty())
            .map(|p| vec![PriceObservation::new(p, at)])
            .unwrap_or_default();

        Self {
            url: new_item.url,
            name: new_item.name,
            image_url: new_item.image_url,
            added_at: at,
            last_checked: if price_history.is_empty() { None } else { Some(at) },
            price_history,
        }
    }

    pub fn current_price(&self) -> Option<&PriceObservation> {
        self.price_history.last()
    }

    /// Lowest numerically parseable price ever recorded.
    pub fn lowest_price(&self) -> Option<&PriceObservation> {
        self.price_history
            .iter()
            .filter_map(|obs| parse_price(&obs.price).map(|amount| (amount, obs)))
            .min_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, obs)| obs)
    }

    /// Never checked, or last checked at least `interval` ago.
    pub fn is_due(&self, interval: Duration, now: DateTime<Utc>) -> bool {
        match self.last_checked {
            Some(last_checked) => now.signed_duration_since(last_checked) >= interval,
            None => true,
        }
    }

    /// Append an observation and evict the oldest entries beyond `max_entries`.
    /// Returns how many entries were evicted.
    pub fn push_observation(&mut self, observation: PriceObservation, max_entries: usize) -> usize {
        self.price_history.push(observation);
        let overflow = self.price_history.len().saturating_sub(max_entries);
        if overflow > 0 {
            self.price_history.drain(..overflow);
        }
        overflow
    }
}
