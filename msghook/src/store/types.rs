//! Query inputs and result shapes for the message store.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::message::Message;

/// Default page size for message listings.
pub const DEFAULT_LIMIT: i64 = 50;

/// Largest page size a caller may request.
pub const MAX_LIMIT: i64 = 100;

/// Result of an insert-or-ignore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written.
    Created,
    /// A row with the same message_id already existed; nothing changed.
    Duplicate,
}

/// Filters for listing messages. All present filters are combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    /// Exact sender match
    pub sender: Option<String>,
    /// Inclusive lower bound on `ts`
    pub since: Option<DateTime<Utc>>,
    /// Case-insensitive substring of `text`
    pub text_contains: Option<String>,
}

/// A page window over the ordered message list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    /// Clamp `limit` to `[1, MAX_LIMIT]` and `offset` to `>= 0`.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of messages plus the metadata needed to fetch the next one.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub data: Vec<Message>,
    /// Number of rows matching the filter, ignoring pagination
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    /// Offset of the following page, or `None` on the last page
    pub next_offset: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderCount {
    #[serde(rename = "from")]
    pub sender: String,
    pub count: i64,
}

/// Aggregates over the whole message table.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total_messages: i64,
    pub senders_count: i64,
    pub messages_per_sender: Vec<SenderCount>,
    pub first_message_ts: Option<DateTime<Utc>>,
    pub last_message_ts: Option<DateTime<Utc>>,
}
