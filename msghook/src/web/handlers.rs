//! HTTP endpoint handlers.
//!
//! Every handler is independent and stateless apart from the shared
//! [`AppState`]. The webhook handler:
//! 1. Verifies the body signature
//! 2. Validates the payload
//! 3. Inserts the message, ignoring duplicates
//! 4. Returns 200 OK

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{ApiError, FieldError, ValidationError};
use crate::message::{parse_timestamp, WebhookMessage};
use crate::store::{InsertOutcome, MessageFilter, MessagePage, MessageStore, Pagination, Stats};
use crate::web::metrics::{record_webhook, PROMETHEUS_CONTENT_TYPE};
use crate::web::signature::{verify_signature, SIGNATURE_HEADER};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: MessageStore,
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(config: Config, store: MessageStore, metrics: PrometheusHandle) -> Self {
        Self {
            config: Arc::new(config),
            store,
            metrics,
        }
    }
}

// =============================================================================
// Webhook
// =============================================================================

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
}

/// Message ingestion endpoint.
///
/// Duplicate deliveries of the same `message_id` are accepted and ignored.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    info!(
        body_length = body.len(),
        has_signature = !signature.is_empty(),
        "webhook_received"
    );

    let secret = match state.config.webhook_secret.as_deref() {
        Some(secret) if !secret.is_empty() => secret,
        _ => {
            error!("webhook_secret_not_configured");
            record_webhook("invalid_signature");
            return Err(ApiError::Authentication);
        }
    };

    if !verify_signature(secret, &body, signature) {
        warn!(
            has_signature = !signature.is_empty(),
            "webhook_signature_invalid"
        );
        record_webhook("invalid_signature");
        return Err(ApiError::Authentication);
    }

    let message = WebhookMessage::from_slice(&body).map_err(|e| {
        warn!(error = %e, "webhook_validation_failed");
        record_webhook("validation_error");
        e
    })?;

    match state.store.insert(&message).await {
        Ok(InsertOutcome::Created) => {
            record_webhook("created");
            info!(
                message_id = %message.message_id,
                sender = %message.sender,
                "message_ingested"
            );
        }
        Ok(InsertOutcome::Duplicate) => {
            record_webhook("duplicate");
            info!(message_id = %message.message_id, "message_duplicate_ignored");
        }
        Err(e) => {
            record_webhook("error");
            error!(message_id = %message.message_id, error = %e, "message_insert_failed");
            return Err(e.into());
        }
    }

    Ok(Json(WebhookResponse { status: "ok" }))
}

// =============================================================================
// Messages
// =============================================================================

/// Raw query parameters for `GET /messages`.
///
/// Kept as strings so that parse failures are reported as validation errors.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
    #[serde(rename = "from")]
    pub sender: Option<String>,
    pub since: Option<String>,
    pub q: Option<String>,
}

impl ListParams {
    /// Convert into a store filter and a clamped page window.
    pub fn into_query(self) -> Result<(MessageFilter, Pagination), ValidationError> {
        let mut errors = Vec::new();

        let limit = parse_int("limit", non_empty(self.limit), &mut errors);
        let offset = parse_int("offset", non_empty(self.offset), &mut errors);

        let since = match non_empty(self.since) {
            Some(raw) => match parse_timestamp(&raw) {
                Ok(ts) => Some(ts),
                Err(msg) => {
                    errors.push(FieldError::new("since", msg));
                    None
                }
            },
            None => None,
        };

        if !errors.is_empty() {
            return Err(ValidationError::with_fields(errors));
        }

        let filter = MessageFilter {
            sender: non_empty(self.sender),
            since,
            text_contains: non_empty(self.q),
        };

        Ok((filter, Pagination::new(limit, offset)))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse_int(field: &str, raw: Option<String>, errors: &mut Vec<FieldError>) -> Option<i64> {
    let raw = raw?;
    match raw.trim().parse::<i64>() {
        Ok(v) => Some(v),
        Err(_) => {
            errors.push(FieldError::new(field, "must be an integer"));
            None
        }
    }
}

/// Paginated, filtered message listing ordered by `ts`, then `message_id`.
pub async fn list_messages(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<MessagePage>, ApiError> {
    let Query(params) =
        params.map_err(|rejection| ValidationError::single("query", rejection.body_text()))?;

    let (filter, page) = params.into_query()?;
    let result = state.store.list(&filter, page).await?;

    Ok(Json(result))
}

// =============================================================================
// Stats
// =============================================================================

/// Aggregate statistics endpoint.
pub async fn stats(State(state): State<AppState>) -> Result<Json<Stats>, ApiError> {
    let stats = state.store.stats(state.config.stats_top_senders).await?;
    Ok(Json(stats))
}

// =============================================================================
// Health
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub database: &'static str,
    pub webhook_secret: &'static str,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<ReadinessChecks>,
}

/// Liveness probe: always OK while the process is serving.
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        checks: None,
    })
}

/// Readiness probe: storage answers and a webhook secret is configured.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database_ok = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "readiness_database_unreachable");
            false
        }
    };

    let secret_ok = state.config.is_webhook_secret_configured();
    if !secret_ok {
        warn!("readiness_webhook_secret_not_configured");
    }

    let checks = ReadinessChecks {
        database: if database_ok { "ok" } else { "failed" },
        webhook_secret: if secret_ok { "ok" } else { "not configured" },
    };

    if database_ok && secret_ok {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                checks: Some(checks),
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "not ready",
                checks: Some(checks),
            }),
        )
    }
}

// =============================================================================
// Metrics
// =============================================================================

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.metrics.render(),
    )
}
