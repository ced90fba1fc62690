pub mod traits;
pub mod manager;
pub mod notifiers;

pub use manager::NotificationDispatcher;
pub use traits::{NotificationResult, NotifierPlugin, PriceDropEvent};
