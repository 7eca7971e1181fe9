//! Datastore connector — sole owner of trace storage.
//!
//! SQLite via sqlx. Categories are persisted as an ordered JSON array in a
//! TEXT column; containment filtering goes through `json_each` so a filter
//! matches exact array elements rather than raw substrings.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};
use thiserror::Error;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;

use crate::category::Category;
use crate::config::DatabaseConfig;
use crate::models::{NewTrace, Trace};

/// Storage-layer errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt trace row {id}: {detail}")]
    CorruptRow { id: i64, detail: String },

    #[error("response time {0}ms exceeds the storable range")]
    LatencyOutOfRange(u64),
}

/// One read pass over the trace table, sufficient for the analytics
/// aggregator without N per-category queries.
#[derive(Debug, Clone)]
pub struct RawAggregate {
    pub total: u64,
    pub avg_latency_ms: f64,
    pub category_sets: Vec<Vec<Category>>,
}

/// Open (or create) the SQLite pool.
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let connect_opts = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    // In-memory databases give every connection its own database; pin the
    // pool to one connection so all units of work share a view.
    let max_connections = if config.url.contains(":memory:") {
        1
    } else {
        config.max_connections
    };

    sqlx::pool::PoolOptions::<Sqlite>::new()
        .max_connections(max_connections)
        .connect_with(connect_opts)
        .await
}

/// Idempotently ensure the trace table exists, retrying with a fixed delay
/// when the store is transiently unreachable at process start. Exhausting
/// the bounded attempts returns the last error; the caller treats that as
/// fatal.
pub async fn bootstrap_schema(
    pool: &SqlitePool,
    config: &DatabaseConfig,
) -> Result<(), sqlx::Error> {
    retry_bootstrap(config, || ensure_schema(pool)).await
}

/// `bootstrap_max_attempts` counts total attempts, the first one included,
/// so the strategy contributes one fewer retry delay.
async fn retry_bootstrap<F, Fut>(config: &DatabaseConfig, mut op: F) -> Result<(), sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), sqlx::Error>>,
{
    let retries = config.bootstrap_max_attempts.saturating_sub(1);
    let strategy = FixedInterval::from_millis(config.bootstrap_delay_ms).take(retries);

    Retry::spawn(strategy, || {
        let attempt = op();
        async move {
            attempt.await.map_err(|e| {
                tracing::warn!(error = %e, "schema bootstrap attempt failed; retrying");
                e
            })
        }
    })
    .await
}

async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS traces (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            user_message      TEXT    NOT NULL,
            bot_response      TEXT    NOT NULL,
            categories        TEXT    NOT NULL,
            timestamp         TEXT    NOT NULL,
            response_time_ms  INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Lightweight connectivity probe. Never errors; failures surface as `false`.
pub async fn health_check(pool: &SqlitePool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}

/// Serialize a category set for the TEXT column.
fn serialize_categories(categories: &[Category]) -> String {
    // Serializing an array of plain strings cannot fail.
    serde_json::to_string(categories).expect("category list serialization cannot fail")
}

/// Persist one trace. The store assigns the id and the UTC second-precision
/// timestamp. Atomic: a single INSERT statement.
pub async fn insert_trace(pool: &SqlitePool, new: &NewTrace) -> Result<Trace, StoreError> {
    insert_trace_at(pool, new, Utc::now()).await
}

/// Persist one trace with an explicit creation time. Exists for the seed
/// loader, which back-dates its dataset; request-path writes go through
/// [`insert_trace`].
pub async fn insert_trace_at(
    pool: &SqlitePool,
    new: &NewTrace,
    created_at: DateTime<Utc>,
) -> Result<Trace, StoreError> {
    let timestamp = created_at.to_rfc3339_opts(SecondsFormat::Secs, true);
    let categories_json = serialize_categories(&new.categories);
    let response_time_ms: i64 = new
        .response_time_ms
        .try_into()
        .map_err(|_| StoreError::LatencyOutOfRange(new.response_time_ms))?;

    let result = sqlx::query(
        r#"
        INSERT INTO traces (user_message, bot_response, categories, timestamp, response_time_ms)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&new.user_message)
    .bind(&new.bot_response)
    .bind(&categories_json)
    .bind(&timestamp)
    .bind(response_time_ms)
    .execute(pool)
    .await?;

    let id = result.last_insert_rowid();

    // Re-parse the stored timestamp so the returned trace matches a later
    // read exactly (second precision).
    let timestamp = parse_timestamp(id, &timestamp)?;

    Ok(Trace {
        id,
        user_message: new.user_message.clone(),
        bot_response: new.bot_response.clone(),
        categories: new.categories.clone(),
        timestamp,
        response_time_ms: new.response_time_ms,
    })
}

/// All traces, most recent first. With a filter, only traces whose category
/// set contains the given label; multi-label traces match on any element.
pub async fn list_traces(
    pool: &SqlitePool,
    category_filter: Option<Category>,
) -> Result<Vec<Trace>, StoreError> {
    let rows: Vec<SqliteRow> = match category_filter {
        Some(category) => {
            sqlx::query(
                r#"
                SELECT id, user_message, bot_response, categories, timestamp, response_time_ms
                FROM traces
                WHERE EXISTS (
                    SELECT 1 FROM json_each(traces.categories)
                    WHERE json_each.value = ?1
                )
                ORDER BY timestamp DESC, id DESC
                "#,
            )
            .bind(category.as_str())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                r#"
                SELECT id, user_message, bot_response, categories, timestamp, response_time_ms
                FROM traces
                ORDER BY timestamp DESC, id DESC
                "#,
            )
            .fetch_all(pool)
            .await?
        }
    };

    rows.iter().map(trace_from_row).collect()
}

/// Single read pass for analytics: row count, mean latency and every stored
/// category set.
pub async fn aggregate_raw(pool: &SqlitePool) -> Result<RawAggregate, StoreError> {
    let rows: Vec<SqliteRow> = sqlx::query("SELECT id, categories, response_time_ms FROM traces")
        .fetch_all(pool)
        .await?;

    let total = rows.len() as u64;
    let mut latency_sum: u64 = 0;
    let mut category_sets = Vec::with_capacity(rows.len());

    for row in &rows {
        let id: i64 = row.get("id");
        latency_sum += row.get::<i64, _>("response_time_ms").max(0) as u64;
        category_sets.push(parse_categories(id, &row.get::<String, _>("categories"))?);
    }

    let avg_latency_ms = if total == 0 {
        0.0
    } else {
        latency_sum as f64 / total as f64
    };

    Ok(RawAggregate {
        total,
        avg_latency_ms,
        category_sets,
    })
}

// ============================================================================
// Row conversion helpers
// ============================================================================

fn trace_from_row(row: &SqliteRow) -> Result<Trace, StoreError> {
    let id: i64 = row.get("id");
    let categories = parse_categories(id, &row.get::<String, _>("categories"))?;
    let timestamp = parse_timestamp(id, &row.get::<String, _>("timestamp"))?;

    Ok(Trace {
        id,
        user_message: row.get("user_message"),
        bot_response: row.get("bot_response"),
        categories,
        timestamp,
        response_time_ms: row.get::<i64, _>("response_time_ms").max(0) as u64,
    })
}

fn parse_categories(id: i64, raw: &str) -> Result<Vec<Category>, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::CorruptRow {
        id,
        detail: format!("invalid category list '{raw}': {e}"),
    })
}

fn parse_timestamp(id: i64, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow {
            id,
            detail: format!("invalid timestamp '{raw}': {e}"),
        })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> DatabaseConfig {
        DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 5,
            bootstrap_max_attempts: 2,
            bootstrap_delay_ms: 10,
        }
    }

    async fn test_pool() -> SqlitePool {
        let config = memory_config();
        let pool = create_pool(&config).await.expect("pool");
        bootstrap_schema(&pool, &config).await.expect("schema");
        pool
    }

    fn new_trace(message: &str, categories: Vec<Category>, latency: u64) -> NewTrace {
        NewTrace {
            user_message: message.to_string(),
            bot_response: format!("reply to: {message}"),
            categories,
            response_time_ms: latency,
        }
    }

    #[tokio::test]
    async fn test_bootstrap_schema_is_idempotent() {
        let config = memory_config();
        let pool = create_pool(&config).await.unwrap();
        bootstrap_schema(&pool, &config).await.unwrap();
        bootstrap_schema(&pool, &config).await.unwrap();
        assert!(health_check(&pool).await);
    }

    #[tokio::test]
    async fn test_bootstrap_schema_errors_when_store_unreachable() {
        let mut config = memory_config();
        config.bootstrap_max_attempts = 3;
        config.bootstrap_delay_ms = 5;

        let pool = create_pool(&config).await.unwrap();
        pool.close().await;

        let result = bootstrap_schema(&pool, &config).await;
        assert!(result.is_err(), "exhausted bootstrap must surface the error");
    }

    #[tokio::test]
    async fn test_bootstrap_recovers_after_transient_failure() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let mut config = memory_config();
        config.bootstrap_max_attempts = 3;
        config.bootstrap_delay_ms = 5;

        let attempts = AtomicUsize::new(0);
        let result = retry_bootstrap(&config, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(sqlx::Error::PoolClosed)
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_bootstrap_stops_after_configured_attempts() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let mut config = memory_config();
        config.bootstrap_max_attempts = 3;
        config.bootstrap_delay_ms = 5;

        let attempts = AtomicUsize::new(0);
        let result = retry_bootstrap(&config, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(sqlx::Error::PoolClosed) }
        })
        .await;

        assert!(result.is_err());
        // The configured value counts total attempts, not extra retries.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let pool = test_pool().await;

        let a = insert_trace(&pool, &new_trace("first", vec![Category::Billing], 100))
            .await
            .unwrap();
        let b = insert_trace(&pool, &new_trace("second", vec![Category::Refund], 200))
            .await
            .unwrap();

        assert!(b.id > a.id, "ids must be monotonically increasing");
        assert_eq!(a.response_time_ms, 100);
        assert_eq!(a.categories, vec![Category::Billing]);
    }

    #[tokio::test]
    async fn test_inserted_trace_matches_later_read() {
        let pool = test_pool().await;

        let stored = insert_trace(
            &pool,
            &new_trace("hello", vec![Category::Billing, Category::Refund], 42),
        )
        .await
        .unwrap();

        let listed = list_traces(&pool, None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, stored.id);
        assert_eq!(listed[0].categories, stored.categories);
        assert_eq!(listed[0].timestamp, stored.timestamp);
        assert_eq!(listed[0].user_message, "hello");
    }

    #[tokio::test]
    async fn test_insert_rejects_unstorable_latency() {
        let pool = test_pool().await;

        let result = insert_trace(
            &pool,
            &new_trace("slow", vec![Category::Billing], u64::MAX),
        )
        .await;

        assert!(matches!(result, Err(StoreError::LatencyOutOfRange(_))));
        assert!(list_traces(&pool, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_traces_newest_first() {
        let pool = test_pool().await;

        for i in 0..3 {
            insert_trace(&pool, &new_trace(&format!("msg {i}"), vec![Category::Billing], 10))
                .await
                .unwrap();
        }

        let traces = list_traces(&pool, None).await.unwrap();
        assert_eq!(traces.len(), 3);
        // Same-second inserts fall back to id ordering.
        assert!(traces[0].id > traces[1].id && traces[1].id > traces[2].id);
    }

    #[tokio::test]
    async fn test_filter_matches_multi_label_traces() {
        let pool = test_pool().await;

        insert_trace(&pool, &new_trace("a", vec![Category::Billing], 10))
            .await
            .unwrap();
        insert_trace(
            &pool,
            &new_trace("b", vec![Category::Refund, Category::Billing], 10),
        )
        .await
        .unwrap();
        insert_trace(&pool, &new_trace("c", vec![Category::Cancellation], 10))
            .await
            .unwrap();

        let billing = list_traces(&pool, Some(Category::Billing)).await.unwrap();
        assert_eq!(billing.len(), 2);
        assert!(billing
            .iter()
            .all(|t| t.categories.contains(&Category::Billing)));

        let refund = list_traces(&pool, Some(Category::Refund)).await.unwrap();
        assert_eq!(refund.len(), 1);
        assert_eq!(refund[0].user_message, "b");
    }

    #[tokio::test]
    async fn test_filter_is_element_match_not_substring() {
        let pool = test_pool().await;

        insert_trace(&pool, &new_trace("a", vec![Category::AccountAccess], 10))
            .await
            .unwrap();

        // "Error" must not match inside other labels, and no label is a
        // substring of "Account Access" at the element level.
        let err = list_traces(&pool, Some(Category::Error)).await.unwrap();
        assert!(err.is_empty());

        let access = list_traces(&pool, Some(Category::AccountAccess))
            .await
            .unwrap();
        assert_eq!(access.len(), 1);
    }

    #[tokio::test]
    async fn test_aggregate_raw_over_empty_table() {
        let pool = test_pool().await;

        let raw = aggregate_raw(&pool).await.unwrap();
        assert_eq!(raw.total, 0);
        assert_eq!(raw.avg_latency_ms, 0.0);
        assert!(raw.category_sets.is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_raw_counts_and_mean() {
        let pool = test_pool().await;

        insert_trace(&pool, &new_trace("a", vec![Category::Billing], 800))
            .await
            .unwrap();
        insert_trace(
            &pool,
            &new_trace("b", vec![Category::Billing, Category::Refund], 1000),
        )
        .await
        .unwrap();

        let raw = aggregate_raw(&pool).await.unwrap();
        assert_eq!(raw.total, 2);
        assert_eq!(raw.avg_latency_ms, 900.0);
        assert_eq!(raw.category_sets.len(), 2);
    }

    #[tokio::test]
    async fn test_health_check_reports_closed_pool() {
        let pool = test_pool().await;
        assert!(health_check(&pool).await);

        pool.close().await;
        assert!(!health_check(&pool).await);
    }
}
