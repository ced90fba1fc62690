use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One observed price for a tracked item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceObservation {
    /// The price as displayed on the page, currency included.
    pub price: String,
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
}

impl PriceObservation {
    pub fn new(price: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            price: price.into().trim().to_string(),
            date: at.date_naive(),
            timestamp: at,
        }
    }
}
