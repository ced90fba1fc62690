use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod tracked_item;
pub mod price_history;
pub mod notification;

// Re-exports for convenience
pub use tracked_item::*;
pub use price_history::*;
pub use notification::*;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Increased,
    Decreased,
    Unchanged,
}

// Helper function to generate ids for stored records
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
