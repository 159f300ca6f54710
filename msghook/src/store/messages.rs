//! SQLite-backed message store.
//!
//! The `messages` table is the only table. `message_id` is the primary key,
//! so exactly-once ingestion is `INSERT ... ON CONFLICT DO NOTHING` and the
//! database resolves concurrent duplicates.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use tracing::{debug, info};

use super::types::{
    InsertOutcome, MessageFilter, MessagePage, Pagination, SenderCount, Stats,
};
use crate::message::{Message, WebhookMessage};

/// Data-access object for stored messages.
#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct MessageRow {
    message_id: String,
    sender: String,
    recipient: String,
    ts: i64,
    text: String,
    created_at: i64,
}

impl TryFrom<MessageRow> for Message {
    type Error = sqlx::Error;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message {
            ts: from_micros(row.ts)?,
            created_at: from_micros(row.created_at)?,
            message_id: row.message_id,
            sender: row.sender,
            recipient: row.recipient,
            text: row.text,
        })
    }
}

impl MessageStore {
    /// Open a pool for `database_url`, creating the database file and its
    /// parent directory when missing.
    ///
    /// In-memory databases are pinned to a single long-lived connection so
    /// every query sees the same data.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let in_memory = database_url.contains(":memory:");

        if !in_memory {
            if let Some(parent) = options.get_filename().parent() {
                let exists = tokio::fs::try_exists(parent).await.unwrap_or(false);
                if !parent.as_os_str().is_empty() && !exists {
                    tokio::fs::create_dir_all(parent).await?;
                    info!(path = %parent.display(), "database_directory_created");
                }
            }
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await?;

        info!(
            in_memory = in_memory,
            filename = %display_filename(database_url),
            "database_connected"
        );

        Ok(Self { pool })
    }

    /// Apply embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database_migrations_applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Trivial connectivity probe used by readiness checks.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Insert a message unless one with the same `message_id` already exists.
    pub async fn insert(&self, msg: &WebhookMessage) -> Result<InsertOutcome, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO messages (message_id, sender, recipient, ts, text, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (message_id) DO NOTHING
            "#,
        )
        .bind(&msg.message_id)
        .bind(&msg.sender)
        .bind(&msg.recipient)
        .bind(msg.ts.timestamp_micros())
        .bind(&msg.text)
        .bind(Utc::now().timestamp_micros())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(InsertOutcome::Created)
        } else {
            Ok(InsertOutcome::Duplicate)
        }
    }

    /// List messages ordered by `ts ASC, message_id ASC`.
    pub async fn list(
        &self,
        filter: &MessageFilter,
        page: Pagination,
    ) -> Result<MessagePage, sqlx::Error> {
        let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM messages");
        push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut select = QueryBuilder::<Sqlite>::new(
            "SELECT message_id, sender, recipient, ts, text, created_at FROM messages",
        );
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY ts ASC, message_id ASC LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);

        let rows = select
            .build_query_as::<MessageRow>()
            .fetch_all(&self.pool)
            .await?;
        let data = rows
            .into_iter()
            .map(Message::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let end = page.offset + data.len() as i64;
        let next_offset = if !data.is_empty() && end < total {
            Some(end)
        } else {
            None
        };

        debug!(
            total = total,
            returned = data.len(),
            limit = page.limit,
            offset = page.offset,
            "messages_listed"
        );

        Ok(MessagePage {
            data,
            total,
            limit: page.limit,
            offset: page.offset,
            next_offset,
        })
    }

    /// Aggregate statistics over all stored messages.
    ///
    /// Runs inside one transaction so the totals and the per-sender
    /// breakdown describe the same snapshot.
    pub async fn stats(&self, top_senders: u32) -> Result<Stats, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let (total_messages, senders_count, first_ts, last_ts): (i64, i64, Option<i64>, Option<i64>) =
            sqlx::query_as(
                r#"
                SELECT COUNT(*), COUNT(DISTINCT sender), MIN(ts), MAX(ts)
                FROM messages
                "#,
            )
            .fetch_one(&mut *tx)
            .await?;

        let per_sender: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT sender, COUNT(*) AS count
            FROM messages
            GROUP BY sender
            ORDER BY count DESC, sender ASC
            LIMIT ?
            "#,
        )
        .bind(i64::from(top_senders))
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            total_messages = total_messages,
            senders_count = senders_count,
            "stats_generated"
        );

        Ok(Stats {
            total_messages,
            senders_count,
            messages_per_sender: per_sender
                .into_iter()
                .map(|(sender, count)| SenderCount { sender, count })
                .collect(),
            first_message_ts: first_ts.map(from_micros).transpose()?,
            last_message_ts: last_ts.map(from_micros).transpose()?,
        })
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &MessageFilter) {
    let mut separator = " WHERE ";

    if let Some(sender) = &filter.sender {
        query.push(separator).push("sender = ").push_bind(sender.clone());
        separator = " AND ";
    }

    if let Some(since) = filter.since {
        query
            .push(separator)
            .push("ts >= ")
            .push_bind(since.timestamp_micros());
        separator = " AND ";
    }

    if let Some(needle) = &filter.text_contains {
        query
            .push(separator)
            .push("text LIKE ")
            .push_bind(like_pattern(needle))
            .push(" ESCAPE '\\'");
    }
}

/// `%needle%` with LIKE wildcards in the needle escaped.
///
/// Case folding is left to SQLite's `LIKE`, which ignores ASCII case and
/// compares every other character exactly, on both sides alike.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| sqlx::Error::Decode(format!("timestamp out of range: {micros}").into()))
}

/// File name part of a SQLite URL, for logging.
fn display_filename(database_url: &str) -> &str {
    let trimmed = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    Path::new(trimmed)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(trimmed)
}
