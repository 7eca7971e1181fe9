//! Seed dataset — a fixed set of pre-classified traces for local demos and
//! dashboard development. Loaded once via `supportlens-server --seed`.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use supportlens_core::category::Category;
use supportlens_core::db;
use supportlens_core::models::NewTrace;
use supportlens_core::SupportLensError;

struct SeedTrace {
    user_message: &'static str,
    bot_response: &'static str,
    categories: &'static [Category],
    response_time_ms: u64,
}

const SEED_TRACES: &[SeedTrace] = &[
    SeedTrace {
        user_message: "My invoice shows $49 but I signed up for the $29 plan. What happened?",
        bot_response: "Sorry for the surprise! Your account moved to the Pro tier during the last \
                       cycle. I can revert the plan and credit the $20 difference right away. \
                       Want me to go ahead?",
        categories: &[Category::Billing],
        response_time_ms: 812,
    },
    SeedTrace {
        user_message: "I was charged twice this month and want one of the charges back.",
        bot_response: "That duplicate charge is on us. I've started a refund for the second $49 \
                       payment; it should reach your card within 3-5 business days.",
        categories: &[Category::Refund, Category::Billing],
        response_time_ms: 1043,
    },
    SeedTrace {
        user_message: "How do I swap the credit card you have on file?",
        bot_response: "Head to Settings, then Billing, then Payment Methods, add the new card and \
                       mark it default. The next invoice charges it automatically.",
        categories: &[Category::Billing],
        response_time_ms: 654,
    },
    SeedTrace {
        user_message: "I signed up by accident three days ago. Can I get my money back?",
        bot_response: "No problem at all. You're inside the 14-day money-back window, so I've \
                       issued a full refund of $29. Expect it back within a week.",
        categories: &[Category::Refund],
        response_time_ms: 876,
    },
    SeedTrace {
        user_message: "I keep getting 'invalid credentials' even though my password is right.",
        bot_response: "Let's get you back in. Try the password reset link first; if that fails \
                       the account may be locked after repeated attempts, and I can unlock it \
                       once you confirm your registered email.",
        categories: &[Category::AccountAccess],
        response_time_ms: 934,
    },
    SeedTrace {
        user_message: "Lost my phone and can't pass the MFA prompt anymore.",
        bot_response: "I can help you recover access. Please confirm your billing address and the \
                       last 4 digits of your payment method, and I'll temporarily disable MFA so \
                       you can enrol a new device.",
        categories: &[Category::AccountAccess],
        response_time_ms: 1215,
    },
    SeedTrace {
        user_message: "Please cancel my subscription, and refund whatever is unused.",
        bot_response: "Sorry to see you go. I've scheduled the cancellation for the end of this \
                       billing period and calculated a prorated refund for the remaining days on \
                       your annual plan. You'll get a confirmation email shortly.",
        categories: &[Category::Cancellation, Category::Refund],
        response_time_ms: 1187,
    },
    SeedTrace {
        user_message: "How do I step down from Pro to the free tier?",
        bot_response: "You can downgrade under Settings, Billing, Change Plan. It takes effect at \
                       the end of the current period, and the free tier caps you at 100 \
                       transactions a month.",
        categories: &[Category::Cancellation],
        response_time_ms: 743,
    },
    SeedTrace {
        user_message: "Does the product integrate with QuickBooks?",
        bot_response: "Yes, there's a native QuickBooks Online integration on Pro and Enterprise. \
                       Invoices and payments sync hourly once you connect it under Settings, \
                       Integrations.",
        categories: &[Category::GeneralInquiry],
        response_time_ms: 712,
    },
    SeedTrace {
        user_message: "What's the difference between Pro and Enterprise pricing?",
        bot_response: "Pro is $49/month with 10,000 transactions and email support. Enterprise \
                       adds unlimited volume, SSO, a dedicated account manager and SLA terms at \
                       custom pricing. Happy to set up a demo.",
        categories: &[Category::GeneralInquiry, Category::Billing],
        response_time_ms: 834,
    },
];

/// Load the seed dataset unless the table already holds at least as many
/// traces. Timestamps are spread deterministically across the last 30 days,
/// newest entry first.
pub async fn seed(pool: &SqlitePool) -> Result<usize, SupportLensError> {
    let existing = db::aggregate_raw(pool).await?.total as usize;
    if existing >= SEED_TRACES.len() {
        tracing::info!(existing, "database already seeded; skipping");
        return Ok(0);
    }

    let now = Utc::now();
    let step = Duration::hours((30 * 24) / SEED_TRACES.len() as i64);

    for (i, entry) in SEED_TRACES.iter().enumerate() {
        let new = NewTrace {
            user_message: entry.user_message.to_string(),
            bot_response: entry.bot_response.to_string(),
            categories: entry.categories.to_vec(),
            response_time_ms: entry.response_time_ms,
        };
        let created_at = now - step * (i as i32 + 1);
        db::insert_trace_at(pool, &new, created_at).await?;
    }

    tracing::info!(count = SEED_TRACES.len(), "seeded trace dataset");
    Ok(SEED_TRACES.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use supportlens_core::config::DatabaseConfig;

    async fn test_pool() -> SqlitePool {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            bootstrap_max_attempts: 1,
            bootstrap_delay_ms: 10,
        };
        let pool = db::create_pool(&config).await.expect("pool");
        db::bootstrap_schema(&pool, &config).await.expect("schema");
        pool
    }

    #[test]
    fn test_seed_entries_respect_trace_invariants() {
        for entry in SEED_TRACES {
            assert!(!entry.user_message.trim().is_empty());
            assert!(!entry.bot_response.trim().is_empty());
            assert!(!entry.categories.is_empty() && entry.categories.len() <= 2);
            assert!(!entry.categories.contains(&Category::Error));
            if entry.categories.len() == 2 {
                assert_ne!(entry.categories[0], entry.categories[1]);
            }
        }
    }

    #[tokio::test]
    async fn test_seed_loads_once_and_is_ordered() {
        let pool = test_pool().await;

        let inserted = seed(&pool).await.unwrap();
        assert_eq!(inserted, SEED_TRACES.len());

        // Second run is a no-op.
        assert_eq!(seed(&pool).await.unwrap(), 0);

        let traces = db::list_traces(&pool, None).await.unwrap();
        assert_eq!(traces.len(), SEED_TRACES.len());
        for pair in traces.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }
}
