//! Analytics aggregator — category breakdown over multi-label traces.
//!
//! Percentages use total label occurrences as the denominator, not the trace
//! count: a two-label trace contributes two occurrences, which keeps the
//! percentages summing to ~100 despite multi-label data.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::db::RawAggregate;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryStat {
    pub count: u64,
    pub percentage: f64,
}

/// Per-category stats, always complete over the full registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    #[serde(rename = "Billing")]
    pub billing: CategoryStat,
    #[serde(rename = "Refund")]
    pub refund: CategoryStat,
    #[serde(rename = "Account Access")]
    pub account_access: CategoryStat,
    #[serde(rename = "Cancellation")]
    pub cancellation: CategoryStat,
    #[serde(rename = "General Inquiry")]
    pub general_inquiry: CategoryStat,
    #[serde(rename = "Error")]
    pub error: CategoryStat,
}

impl CategoryBreakdown {
    pub fn get(&self, category: Category) -> CategoryStat {
        match category {
            Category::Billing => self.billing,
            Category::Refund => self.refund,
            Category::AccountAccess => self.account_access,
            Category::Cancellation => self.cancellation,
            Category::GeneralInquiry => self.general_inquiry,
            Category::Error => self.error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub total_traces: u64,
    /// Mean of per-trace latency, rounded to the nearest integer; 0 when no
    /// traces exist.
    pub average_response_time_ms: u64,
    pub category_breakdown: CategoryBreakdown,
}

/// Compute the breakdown from one raw read pass over the trace table.
pub fn compute_breakdown(raw: &RawAggregate) -> AnalyticsReport {
    let mut counts: HashMap<Category, u64> = HashMap::new();
    let mut total_occurrences: u64 = 0;

    for set in &raw.category_sets {
        total_occurrences += set.len() as u64;
        for category in set {
            *counts.entry(*category).or_insert(0) += 1;
        }
    }

    let stat = |category: Category| -> CategoryStat {
        let count = counts.get(&category).copied().unwrap_or(0);
        let percentage = if total_occurrences == 0 {
            0.0
        } else {
            (count as f64 / total_occurrences as f64 * 1000.0).round() / 10.0
        };
        CategoryStat { count, percentage }
    };

    AnalyticsReport {
        total_traces: raw.total,
        average_response_time_ms: raw.avg_latency_ms.round() as u64,
        category_breakdown: CategoryBreakdown {
            billing: stat(Category::Billing),
            refund: stat(Category::Refund),
            account_access: stat(Category::AccountAccess),
            cancellation: stat(Category::Cancellation),
            general_inquiry: stat(Category::GeneralInquiry),
            error: stat(Category::Error),
        },
    }
}
