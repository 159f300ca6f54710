//! msghook - Signed webhook ingestion service.
//!
//! Accepts HMAC-signed message callbacks, stores each message exactly once
//! in SQLite, and serves read endpoints over the stored data.
//!
//! ## Architecture
//!
//! ```text
//! POST /webhook → signature check → payload validation → MessageStore (insert or ignore)
//! GET  /messages, /stats         → MessageStore (read)
//! ```

pub mod config;
pub mod error;
pub mod message;
pub mod store;
pub mod web;

// Re-export commonly used types
pub use config::{Config, InvalidEnvVar, LogFormat};
pub use error::{ApiError, FieldError, ValidationError};
pub use message::{Message, WebhookMessage};
pub use store::{InsertOutcome, MessageFilter, MessagePage, MessageStore, Pagination, Stats};
pub use web::AppState;
