use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::Category;

/// A durable record of one classified support interaction. Created once,
/// never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: i64,
    pub user_message: String,
    pub bot_response: String,
    /// Ordered, duplicate-free, 1–2 entries. Never empty.
    pub categories: Vec<Category>,
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: u64,
}

/// Fields for a trace about to be persisted. The store assigns `id` and
/// `timestamp`.
#[derive(Debug, Clone)]
pub struct NewTrace {
    pub user_message: String,
    pub bot_response: String,
    pub categories: Vec<Category>,
    pub response_time_ms: u64,
}
