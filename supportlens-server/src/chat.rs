//! Interaction orchestrator — the `/chat` use case.
//!
//! Per request: validate, probe storage, classify, persist, respond. Each
//! step runs strictly in that order with no retries; retry is a client
//! concern. Storage availability gates chat availability because every
//! interaction must be durably recorded, but a persistence failure after a
//! successful classification only drops the trace id, never the reply.

use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;

use supportlens_core::category::Category;
use supportlens_core::classifier::ClassifierBackend;
use supportlens_core::db;
use supportlens_core::models::NewTrace;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChatError {
    /// Client error: the message was empty or whitespace-only. Rejected
    /// before any external or storage work.
    #[error("message cannot be empty")]
    EmptyMessage,

    /// The storage probe failed; no classification was attempted since the
    /// interaction could not be recorded anyway.
    #[error("trace storage is unavailable")]
    StorageUnavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub reply: String,
    pub categories: Vec<Category>,
    pub latency_ms: u64,
    pub degraded: bool,
    /// `None` when the trace could not be persisted after classification.
    pub trace_id: Option<i64>,
}

pub async fn handle_chat(
    pool: &SqlitePool,
    classifier: &dyn ClassifierBackend,
    message: &str,
) -> Result<ChatOutcome, ChatError> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ChatError::EmptyMessage);
    }

    if !db::health_check(pool).await {
        tracing::error!("storage health probe failed; rejecting chat request");
        return Err(ChatError::StorageUnavailable);
    }

    let classification = classifier.classify(message).await;
    if classification.degraded {
        tracing::warn!(
            backend = classifier.name(),
            latency_ms = classification.latency_ms,
            cause = ?classification.cause,
            "serving degraded classification outcome"
        );
    }

    let new = NewTrace {
        user_message: message.to_string(),
        bot_response: classification.reply.clone(),
        categories: classification.categories.clone(),
        response_time_ms: classification.latency_ms,
    };

    let trace_id = match db::insert_trace(pool, &new).await {
        Ok(trace) => {
            tracing::info!(
                trace_id = trace.id,
                degraded = classification.degraded,
                latency_ms = classification.latency_ms,
                "recorded chat trace"
            );
            Some(trace.id)
        }
        Err(e) => {
            // The user already has a usable reply; losing the trace is an
            // operational fault, not a request failure.
            tracing::error!(error = %e, "failed to record chat trace; returning reply without id");
            None
        }
    };

    Ok(ChatOutcome {
        reply: classification.reply,
        categories: classification.categories,
        latency_ms: classification.latency_ms,
        degraded: classification.degraded,
        trace_id,
    })
}

// ============================================================================
// TESTS
// ============================================================================
