pub mod config;
pub mod extractor;
pub mod ledger;
pub mod models;
pub mod plugins;
pub mod price_checker;
pub mod price_comparator;
pub mod scheduler;
pub mod scraper;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use ledger::PriceLedger;
pub use price_checker::PriceChecker;
pub use scheduler::PriceScheduler;
pub use utils::error::{AppError, Result};
