//! SupportLens HTTP REST API
//!
//! Axum-based HTTP server exposing the classification pipeline and trace
//! analytics.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a
//! pure inner function. The inner functions are directly testable without
//! axum dispatch machinery.
//!
//! Endpoints:
//! - POST /chat      — classify a message, record the trace, return the reply
//! - POST /traces    — persist a pre-classified trace
//! - GET  /traces    — list traces, newest first, optional category filter
//! - GET  /analytics — aggregate stats with per-category breakdown
//! - GET  /health    — storage + classifier health

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use supportlens_core::category::{self, Category};
use supportlens_core::classifier::{ClassifierBackend, ClassifierHealth};
use supportlens_core::models::NewTrace;
use supportlens_core::{analytics, db, SupportLensConfig};

use crate::chat::{self, ChatError};

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub pool: SqlitePool,
    pub classifier: Arc<dyn ClassifierBackend>,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/traces", post(create_trace_handler).get(list_traces_handler))
        .route("/analytics", get(analytics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    pool: SqlitePool,
    classifier: Arc<dyn ClassifierBackend>,
    config: SupportLensConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = Arc::new(HttpState { pool, classifier });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("SupportLens HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct TraceCreateRequest {
    pub user_message: String,
    pub bot_response: String,
    pub response_time_ms: u64,
    /// Optional pre-classified labels; normalized like classifier output
    /// (filter, dedup, truncate, default).
    pub categories: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TracesQuery {
    pub category: Option<String>,
}

fn error_body(msg: impl Into<String>) -> serde_json::Value {
    serde_json::json!({
        "error": msg.into(),
        "status": "error",
    })
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner chat — runs the orchestrator and maps its errors to HTTP codes.
pub async fn chat_inner(
    pool: &SqlitePool,
    classifier: &dyn ClassifierBackend,
    req: ChatRequest,
) -> (StatusCode, serde_json::Value) {
    match chat::handle_chat(pool, classifier, &req.message).await {
        Ok(outcome) => match serde_json::to_value(&outcome) {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string())),
        },
        Err(ChatError::EmptyMessage) => (
            StatusCode::BAD_REQUEST,
            error_body("message cannot be empty"),
        ),
        Err(ChatError::StorageUnavailable) => (
            StatusCode::SERVICE_UNAVAILABLE,
            error_body("trace storage is unavailable"),
        ),
    }
}

/// Inner create-trace — validates, normalizes the supplied labels, persists.
pub async fn create_trace_inner(
    pool: &SqlitePool,
    req: TraceCreateRequest,
) -> (StatusCode, serde_json::Value) {
    if req.user_message.trim().is_empty() || req.bot_response.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            error_body("user_message and bot_response are required"),
        );
    }

    let categories = category::normalize(req.categories.unwrap_or_default());

    let new = NewTrace {
        user_message: req.user_message,
        bot_response: req.bot_response,
        categories,
        response_time_ms: req.response_time_ms,
    };

    match db::insert_trace(pool, &new).await {
        Ok(trace) => match serde_json::to_value(&trace) {
            Ok(body) => (StatusCode::CREATED, body),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string())),
        },
        Err(e) => {
            tracing::error!(error = %e, "trace insert failed");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string()))
        }
    }
}

/// Inner list-traces — parses the optional filter and reads the store.
/// A read fault surfaces as a service error, never as a silent empty list.
pub async fn list_traces_inner(
    pool: &SqlitePool,
    query: TracesQuery,
) -> (StatusCode, serde_json::Value) {
    let filter = match query.category {
        None => None,
        Some(label) => match Category::parse(&label) {
            Some(category) => Some(category),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    error_body(format!("unknown category: {label}")),
                );
            }
        },
    };

    match db::list_traces(pool, filter).await {
        Ok(traces) => match serde_json::to_value(&traces) {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string())),
        },
        Err(e) => {
            tracing::error!(error = %e, "trace listing failed");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string()))
        }
    }
}

/// Inner analytics — one raw read pass plus the pure breakdown computation.
pub async fn analytics_inner(pool: &SqlitePool) -> (StatusCode, serde_json::Value) {
    match db::aggregate_raw(pool).await {
        Ok(raw) => {
            let report = analytics::compute_breakdown(&raw);
            match serde_json::to_value(&report) {
                Ok(body) => (StatusCode::OK, body),
                Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string())),
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "analytics aggregation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(e.to_string()))
        }
    }
}

/// Inner health — `unhealthy` iff storage is down; `degraded` iff storage is
/// up but the classifier is not configured; `healthy` otherwise.
pub async fn health_inner(
    pool: &SqlitePool,
    classifier: &dyn ClassifierBackend,
) -> (StatusCode, serde_json::Value) {
    let storage_up = db::health_check(pool).await;
    let classifier_health = classifier.health();

    let overall = if !storage_up {
        "unhealthy"
    } else if classifier_health != ClassifierHealth::Configured {
        "degraded"
    } else {
        "healthy"
    };

    let status = if storage_up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        serde_json::json!({
            "overall": overall,
            "storage": if storage_up { "up" } else { "down" },
            "classifier": classifier_health,
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn chat_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    let (status, body) = chat_inner(&state.pool, state.classifier.as_ref(), req).await;
    (status, Json(body))
}

pub async fn create_trace_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<TraceCreateRequest>,
) -> impl IntoResponse {
    let (status, body) = create_trace_inner(&state.pool, req).await;
    (status, Json(body))
}

pub async fn list_traces_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<TracesQuery>,
) -> impl IntoResponse {
    let (status, body) = list_traces_inner(&state.pool, query).await;
    (status, Json(body))
}

pub async fn analytics_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = analytics_inner(&state.pool).await;
    (status, Json(body))
}

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.pool, state.classifier.as_ref()).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests — inner functions called directly; router coverage lives in
// tests/http_integration.rs
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use supportlens_core::classifier::NullClassifier;
    use supportlens_core::config::DatabaseConfig;

    async fn make_pool() -> SqlitePool {
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

    #[tokio::test]
    async fn test_create_trace_inner_normalizes_labels() {
        let pool = make_pool().await;

        let req = TraceCreateRequest {
            user_message: "refund twice?".to_string(),
            bot_response: "handled".to_string(),
            response_time_ms: 640,
            categories: Some(vec![
                "Refund".to_string(),
                "Refund".to_string(),
                "Billing".to_string(),
            ]),
        };

        let (status, body) = create_trace_inner(&pool, req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["categories"], serde_json::json!(["Refund", "Billing"]));
        assert_eq!(body["response_time_ms"], 640);
        assert!(body["id"].is_number());
    }

    #[tokio::test]
    async fn test_create_trace_inner_defaults_missing_categories() {
        let pool = make_pool().await;

        let req = TraceCreateRequest {
            user_message: "hello".to_string(),
            bot_response: "hi".to_string(),
            response_time_ms: 0,
            categories: None,
        };

        let (status, body) = create_trace_inner(&pool, req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["categories"], serde_json::json!(["General Inquiry"]));
    }

    #[tokio::test]
    async fn test_create_trace_inner_rejects_blank_fields() {
        let pool = make_pool().await;

        let req = TraceCreateRequest {
            user_message: "   ".to_string(),
            bot_response: "hi".to_string(),
            response_time_ms: 0,
            categories: None,
        };

        let (status, body) = create_trace_inner(&pool, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_list_traces_inner_rejects_unknown_filter() {
        let pool = make_pool().await;

        let (status, body) = list_traces_inner(
            &pool,
            TracesQuery {
                category: Some("Shipping".to_string()),
            },
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Shipping"));
    }

    #[tokio::test]
    async fn test_list_traces_inner_read_fault_is_a_service_error() {
        let pool = make_pool().await;
        pool.close().await;

        let (status, body) = list_traces_inner(&pool, TracesQuery::default()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_health_inner_degraded_without_classifier_credential() {
        let pool = make_pool().await;
        let classifier = NullClassifier::new(ClassifierHealth::Unconfigured);

        let (status, body) = health_inner(&pool, &classifier).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["overall"], "degraded");
        assert_eq!(body["storage"], "up");
        assert_eq!(body["classifier"], "unconfigured");
    }

    #[tokio::test]
    async fn test_health_inner_unhealthy_when_storage_down() {
        let pool = make_pool().await;
        pool.close().await;
        let classifier = NullClassifier::new(ClassifierHealth::Unconfigured);

        let (status, body) = health_inner(&pool, &classifier).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["overall"], "unhealthy");
        assert_eq!(body["storage"], "down");
    }

    #[tokio::test]
    async fn test_chat_inner_maps_empty_message_to_400() {
        let pool = make_pool().await;
        let classifier = NullClassifier::new(ClassifierHealth::Unconfigured);

        let (status, body) = chat_inner(
            &pool,
            &classifier,
            ChatRequest {
                message: "  ".to_string(),
            },
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_chat_inner_maps_storage_down_to_503() {
        let pool = make_pool().await;
        pool.close().await;
        let classifier = NullClassifier::new(ClassifierHealth::Unconfigured);

        let (status, _body) = chat_inner(
            &pool,
            &classifier,
            ChatRequest {
                message: "hello".to_string(),
            },
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
