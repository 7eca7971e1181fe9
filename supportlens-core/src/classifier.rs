//! Classification gateway — wraps the Gemini generateContent call.
//!
//! Provides a `ClassifierBackend` trait with two implementations:
//! - **Gemini** — one structured-output call that produces both the support
//!   reply and 1–2 topic categories
//! - **Null** — used when no credential is configured; degrades immediately
//!
//! The gateway never propagates call-time failures: every outcome is a
//! well-formed [`Classification`], degraded or not.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::category::{self, Category, ASSIGNABLE};
use crate::config::ClassifierConfig;

/// Fixed user-facing reply for every degraded outcome.
pub const APOLOGY_REPLY: &str =
    "I'm sorry, I wasn't able to process your request just now. \
     Please try again in a moment, and if the problem persists our team will follow up.";

// ============================================================================
// ClassifierBackend trait
// ============================================================================

/// Abstraction over classification providers.
#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    /// Classify a user message. Infallible by contract: external failures
    /// resolve to a degraded [`Classification`], never an error.
    ///
    /// The caller guarantees `user_message` is non-empty after trimming.
    async fn classify(&self, user_message: &str) -> Classification;

    /// Static health of this backend, for the health endpoint.
    fn health(&self) -> ClassifierHealth;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Classifier state as reported by `GET /health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierHealth {
    Configured,
    Unconfigured,
    Error,
}

// ============================================================================
// Outcome and error types
// ============================================================================

/// The outcome of one classification attempt, degraded or successful.
#[derive(Debug, Clone)]
pub struct Classification {
    pub reply: String,
    /// 1–2 registry categories, duplicate-free, first-seen order.
    /// Exactly `[Error]` when `degraded` is true.
    pub categories: Vec<Category>,
    /// Elapsed wall time of the external call; 0 when no call was attempted.
    pub latency_ms: u64,
    pub degraded: bool,
    /// Present iff `degraded` is true.
    pub cause: Option<DegradedCause>,
}

impl Classification {
    fn degraded(latency_ms: u64, cause: DegradedCause) -> Self {
        Self {
            reply: APOLOGY_REPLY.to_string(),
            categories: vec![Category::Error],
            latency_ms,
            degraded: true,
            cause: Some(cause),
        }
    }
}

/// Why a classification degraded. Rate limiting is kept distinct so the
/// caller can surface a retryable signal if it chooses not to swallow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedCause {
    Unconfigured,
    RateLimited,
    Upstream,
}

/// Classification call errors. Internal to the gateway: `classify` converts
/// them into degraded outcomes.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("rate limited by the generation API")]
    RateLimited,

    #[error("malformed structured output: {0}")]
    MalformedOutput(String),

    #[error("Missing API key")]
    MissingApiKey,
}

// ============================================================================
// Gateway configuration
// ============================================================================

/// Runtime configuration for the Gemini classifier.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub reply_word_limit: usize,
}

impl GatewayConfig {
    /// Build from file config, taking the key from `GEMINI_API_KEY` when the
    /// caller does not supply one explicitly.
    pub fn new(api_key: Option<String>, config: &ClassifierConfig) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
            reply_word_limit: config.reply_word_limit,
        }
    }
}

/// Create the appropriate backend from configuration. A missing key yields
/// the null backend rather than an error: chat stays up in degraded mode.
pub fn create_classifier(config: GatewayConfig) -> Box<dyn ClassifierBackend> {
    if config.api_key.is_empty() {
        tracing::warn!("GEMINI_API_KEY not set; classifier runs unconfigured (degraded replies)");
        return Box::new(NullClassifier::new(ClassifierHealth::Unconfigured));
    }
    match GeminiClassifier::new(config) {
        Ok(client) => Box::new(client),
        Err(e) => {
            tracing::error!(error = %e, "failed to construct Gemini classifier");
            Box::new(NullClassifier::new(ClassifierHealth::Error))
        }
    }
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    code: u16,
    message: String,
}

/// The structured output the model is contractually required to return.
#[derive(Debug, Deserialize)]
struct StructuredOutput {
    reply: String,
    categories: Vec<String>,
}

/// JSON schema constraining the model's output: a reply string plus 1–2
/// categories drawn strictly from the assignable registry labels.
fn response_schema() -> serde_json::Value {
    let labels: Vec<&str> = ASSIGNABLE.iter().map(|c| c.as_str()).collect();
    serde_json::json!({
        "type": "object",
        "properties": {
            "reply": { "type": "string" },
            "categories": {
                "type": "array",
                "items": { "type": "string", "enum": labels },
                "minItems": 1,
                "maxItems": 2
            }
        },
        "required": ["reply", "categories"]
    })
}

/// The single deterministic prompt for the combined reply-and-classify call.
fn build_prompt(user_message: &str, reply_word_limit: usize) -> String {
    format!(
        r#"You are a helpful and empathetic customer support agent for a SaaS billing and
subscription management platform used by thousands of small businesses.

Your responsibilities:
- Answer billing questions (invoices, charges, payment methods, pricing tiers)
- Handle refund requests (explain the 14-day money-back policy, initiate credits)
- Resolve account access issues (password resets, MFA, locked accounts)
- Assist with subscription changes (upgrades, downgrades, cancellations)
- Answer general product and feature questions

Tone guidelines:
- Be friendly, concise, and professional
- Acknowledge the customer's frustration when appropriate
- Always give a clear next step or resolution
- Keep replies under {reply_word_limit} words

Categories:
  Billing        - Questions about invoices, charges, payment methods, pricing, or subscription fees.
  Refund         - Requests to return a product, get money back, dispute a charge, or process a credit.
  Account Access - Issues logging in, resetting passwords, locked accounts, or MFA problems.
  Cancellation   - Requests to cancel a subscription, downgrade a plan, or close an account.
  General Inquiry- Anything that does not fit the above.

For the customer message below, respond with a JSON object with two keys:
  "reply"      - your support response (string, under {reply_word_limit} words)
  "categories" - the 1 or 2 best-matching categories from the list above (exact strings)

Customer: {user_message}"#
    )
}

// ============================================================================
// GeminiClassifier
// ============================================================================

/// Gemini classifier — one generateContent call per message, constrained by
/// a response schema.
#[derive(Debug, Clone)]
pub struct GeminiClassifier {
    client: Client,
    config: GatewayConfig,
    base_url: String,
}

impl GeminiClassifier {
    pub fn new(config: GatewayConfig) -> Result<Self, ClassifierError> {
        Self::with_base_url(config, "https://generativelanguage.googleapis.com/v1beta".to_string())
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(config: GatewayConfig, base_url: String) -> Result<Self, ClassifierError> {
        if config.api_key.is_empty() {
            return Err(ClassifierError::MissingApiKey);
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    async fn classify_once(
        &self,
        user_message: &str,
    ) -> Result<(String, Vec<Category>), ClassifierError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.config.model, self.config.api_key
        );

        let request = GenerateRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: build_prompt(user_message, self.config.reply_word_limit),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: response_schema(),
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();

        if status.as_u16() == 429 {
            return Err(ClassifierError::RateLimited);
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let error_detail = serde_json::from_str::<GeminiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error);

            let (code, message) = error_detail
                .map(|e| (e.code, e.message))
                .unwrap_or((status.as_u16(), error_body));

            return Err(ClassifierError::Api { code, message });
        }

        let generate_response: GenerateResponse = response.json().await?;

        let text = generate_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| {
                ClassifierError::MalformedOutput("no candidate text in response".to_string())
            })?;

        let output: StructuredOutput = serde_json::from_str(text).map_err(|e| {
            ClassifierError::MalformedOutput(format!("candidate text is not contract JSON: {e}"))
        })?;

        // A blank reply is schema-valid but unusable; stored traces require
        // a non-empty bot response.
        let reply = output.reply.trim();
        if reply.is_empty() {
            return Err(ClassifierError::MalformedOutput(
                "empty reply in structured output".to_string(),
            ));
        }

        // The schema constrains the label list, but the output is still
        // normalized here: anything non-conforming is dropped at this
        // boundary, never stored.
        let categories = category::normalize(&output.categories);

        Ok((reply.to_string(), categories))
    }
}

#[async_trait]
impl ClassifierBackend for GeminiClassifier {
    async fn classify(&self, user_message: &str) -> Classification {
        let start = Instant::now();
        match self.classify_once(user_message).await {
            Ok((reply, categories)) => Classification {
                reply,
                categories,
                latency_ms: start.elapsed().as_millis() as u64,
                degraded: false,
                cause: None,
            },
            Err(e) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let cause = match e {
                    ClassifierError::RateLimited => DegradedCause::RateLimited,
                    _ => DegradedCause::Upstream,
                };
                tracing::warn!(
                    latency_ms,
                    error = %e,
                    "classification call failed; returning degraded outcome"
                );
                Classification::degraded(latency_ms, cause)
            }
        }
    }

    fn health(&self) -> ClassifierHealth {
        ClassifierHealth::Configured
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// NullClassifier
// ============================================================================

/// Backend used when no usable Gemini client exists. Degrades immediately
/// without attempting any call.
pub struct NullClassifier {
    health: ClassifierHealth,
}

impl NullClassifier {
    pub fn new(health: ClassifierHealth) -> Self {
        Self { health }
    }
}

#[async_trait]
impl ClassifierBackend for NullClassifier {
    async fn classify(&self, _user_message: &str) -> Classification {
        Classification::degraded(0, DegradedCause::Unconfigured)
    }

    fn health(&self) -> ClassifierHealth {
        self.health
    }

    fn name(&self) -> &str {
        "null"
    }
}

// ============================================================================
// TESTS
// ============================================================================
