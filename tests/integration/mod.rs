// Integration tests for pricewatch
// These tests verify that all components work together correctly

pub mod checker_tests;
pub mod extractor_tests;
pub mod ledger_tests;
pub mod scheduler_tests;

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use pricewatch::config::{LedgerConfig, SchedulerConfig};
use pricewatch::extractor::{ExtractedProduct, PriceExtractor};
use pricewatch::plugins::NotificationDispatcher;
use pricewatch::storage::{KeyValueStore, MemoryStore};
use pricewatch::{AppError, PriceChecker, PriceLedger};

/// Extractor that replays a scripted list of prices per URL. `None` in the
/// script means the page shows no price; an exhausted script fails the
/// extraction.
#[derive(Default)]
pub struct ScriptedExtractor {
    scripts: Mutex<HashMap<String, VecDeque<Option<String>>>>,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, url: &str, prices: &[Option<&str>]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), prices.iter().map(|p| p.map(str::to_string)).collect());
        self
    }
}

#[async_trait]
impl PriceExtractor for ScriptedExtractor {
    async fn extract(&self, url: &str) -> pricewatch::Result<ExtractedProduct> {
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front);

        match next {
            Some(price) => Ok(ExtractedProduct {
                name: format!("Product at {}", url.rsplit('/').next().unwrap_or(url)),
                price,
                image_url: None,
            }),
            None => Err(AppError::Extraction(format!("No script left for {}", url))),
        }
    }
}

pub fn scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        check_on_startup: false,
        max_concurrent_checks: 2,
        ..SchedulerConfig::default()
    }
}

pub fn memory_ledger() -> Arc<PriceLedger> {
    ledger_on(Arc::new(MemoryStore::new()))
}

pub fn ledger_on(store: Arc<dyn KeyValueStore>) -> Arc<PriceLedger> {
    Arc::new(PriceLedger::new(store, LedgerConfig::default()))
}

pub fn create_test_checker(extractor: ScriptedExtractor, dispatcher: NotificationDispatcher) -> PriceChecker {
    PriceChecker::new(memory_ledger(), Arc::new(extractor), dispatcher, scheduler_config())
}
