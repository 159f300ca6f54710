//! Persistence layer.
//!
//! [`MessageStore`] is the only component that reads or writes the
//! `messages` table.

pub mod messages;
pub mod types;

pub use messages::MessageStore;
pub use types::{
    InsertOutcome, MessageFilter, MessagePage, Pagination, SenderCount, Stats, DEFAULT_LIMIT,
    MAX_LIMIT,
};
