//! Web server module.
//!
//! This module provides the HTTP surface of the service:
//! - Receives signed webhooks and stores each message once
//! - Serves paginated message queries and aggregate stats
//! - Exposes liveness, readiness and Prometheus metrics

pub mod handlers;
pub mod metrics;
pub mod router;
pub mod signature;

pub use handlers::{AppState, HealthResponse, ListParams, WebhookResponse};
pub use self::metrics::{install_recorder, spawn_upkeep};
pub use router::router;
pub use signature::{compute_signature, verify_signature, SIGNATURE_HEADER};
