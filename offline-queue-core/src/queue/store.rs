//! SQLite-backed queue store

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::InboundMessage;
use crate::queue::types::{MessageStatus, QueueStats, QueuedMessage};
use crate::utils::now_ms;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 4;

const SELECT_COLUMNS: &str = "id, channel, account_id, sender_id, chat_id, body, media_path, \
     metadata, queued_at, attempts, last_attempt_at, status, last_error";

/// Durable store of queued messages
///
/// Every mutating call is a single auto-committed statement against a
/// WAL-mode database with `synchronous = FULL`, so it is visible to the
/// next read and survives a crash once it returns. State transitions are
/// conditional updates, which keeps concurrent callers from
/// double-dispatching a message.
pub struct MessageQueue {
    pool: SqlitePool,
    path: PathBuf,
    /// Last assigned `queued_at`, keeps enqueue timestamps non-decreasing
    last_queued_at: AtomicI64,
}

impl MessageQueue {
    /// Open (or create) the queue database at `path`
    pub async fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        let queue = Self {
            pool,
            path,
            last_queued_at: AtomicI64::new(0),
        };
        queue.init_schema().await?;

        let latest: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(queued_at), 0) FROM queued_messages")
            .fetch_one(&queue.pool)
            .await?;
        queue.last_queued_at.store(latest, Ordering::SeqCst);

        info!("Offline queue opened at {}", queue.path.display());
        Ok(queue)
    }

    async fn init_schema(&self) -> crate::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS queued_messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                channel TEXT NOT NULL,
                account_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                chat_id TEXT NOT NULL,
                body TEXT NOT NULL,
                media_path TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                queued_at INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_attempt_at INTEGER,
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'processing', 'failed', 'completed')),
                last_error TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_queued_messages_status ON queued_messages(status)",
            "CREATE INDEX IF NOT EXISTS idx_queued_messages_queued_at ON queued_messages(queued_at, seq)",
            "CREATE INDEX IF NOT EXISTS idx_queued_messages_channel_account ON queued_messages(channel, account_id)",
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    /// Database file backing this queue
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wall-clock now, never earlier than a previously assigned timestamp
    fn next_queued_at(&self) -> i64 {
        let now = now_ms();
        let previous = self.last_queued_at.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }

    /// Persist a new pending message
    ///
    /// Returns only after the insert is committed; storage faults are
    /// returned to the caller rather than dropping the message.
    pub async fn enqueue(&self, msg: &InboundMessage) -> crate::Result<QueuedMessage> {
        let id = Uuid::new_v4().to_string();
        let queued_at = self.next_queued_at();
        let metadata = serde_json::to_string(&msg.metadata)?;

        sqlx::query(
            "INSERT INTO queued_messages
                (id, channel, account_id, sender_id, chat_id, body, media_path,
                 metadata, queued_at, attempts, last_attempt_at, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, 'pending')",
        )
        .bind(&id)
        .bind(&msg.channel)
        .bind(&msg.account_id)
        .bind(&msg.sender_id)
        .bind(&msg.chat_id)
        .bind(&msg.body)
        .bind(msg.media_path.as_deref())
        .bind(&metadata)
        .bind(queued_at)
        .execute(&self.pool)
        .await?;

        debug!(
            "Queued message {} from {}:{} (sender {})",
            id, msg.channel, msg.chat_id, msg.sender_id
        );

        Ok(QueuedMessage {
            id,
            channel: msg.channel.clone(),
            account_id: msg.account_id.clone(),
            sender_id: msg.sender_id.clone(),
            chat_id: msg.chat_id.clone(),
            body: msg.body.clone(),
            media_path: msg.media_path.clone(),
            metadata: msg.metadata.clone(),
            queued_at,
            attempts: 0,
            last_attempt_at: None,
            status: MessageStatus::Pending,
            last_error: None,
        })
    }

    /// Oldest-first pending messages, at most `limit`
    pub async fn get_pending(&self, limit: usize) -> crate::Result<Vec<QueuedMessage>> {
        self.list(Some(MessageStatus::Pending), limit).await
    }

    /// Messages in FIFO order, optionally filtered by status
    pub async fn list(
        &self,
        status: Option<MessageStatus>,
        limit: usize,
    ) -> crate::Result<Vec<QueuedMessage>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {} FROM queued_messages WHERE status = ?
                     ORDER BY queued_at ASC, seq ASC LIMIT ?",
                    SELECT_COLUMNS
                ))
                .bind(status.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM queued_messages ORDER BY queued_at ASC, seq ASC LIMIT ?",
                    SELECT_COLUMNS
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_message).collect()
    }

    /// All messages for one channel account, FIFO order
    pub async fn list_for_account(
        &self,
        channel: &str,
        account_id: &str,
        limit: usize,
    ) -> crate::Result<Vec<QueuedMessage>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM queued_messages WHERE channel = ? AND account_id = ?
             ORDER BY queued_at ASC, seq ASC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(channel)
        .bind(account_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    /// Look up a single message
    pub async fn get(&self, id: &str) -> crate::Result<Option<QueuedMessage>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM queued_messages WHERE id = ?",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_message).transpose()
    }

    /// `pending -> processing`, counting the attempt
    ///
    /// Returns `false` without touching the record if it is not pending,
    /// so a message can only be dispatched once.
    pub async fn mark_processing(&self, id: &str) -> crate::Result<bool> {
        let result = sqlx::query(
            "UPDATE queued_messages
             SET status = 'processing', attempts = attempts + 1, last_attempt_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() == 1;
        if !applied {
            debug!("Message {} not pending, skipping dispatch", id);
        }
        Ok(applied)
    }

    /// `processing -> completed`; repeated calls are harmless no-ops
    pub async fn mark_completed(&self, id: &str) -> crate::Result<bool> {
        let result = sqlx::query(
            "UPDATE queued_messages SET status = 'completed', last_error = NULL
             WHERE id = ? AND status = 'processing'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() == 1;
        if !applied {
            debug!("Message {} not processing, completion ignored", id);
        }
        Ok(applied)
    }

    /// `processing -> failed`; failed messages are never retried automatically
    pub async fn mark_failed(&self, id: &str, error: &str) -> crate::Result<bool> {
        let result = sqlx::query(
            "UPDATE queued_messages SET status = 'failed', last_error = ?
             WHERE id = ? AND status = 'processing'",
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() == 1;
        if !applied {
            debug!("Message {} not processing, failure ignored", id);
        }
        Ok(applied)
    }

    /// Return every `processing` message to `pending`
    ///
    /// Recovery after an unclean shutdown. Attempts are left unchanged.
    pub async fn reset_processing(&self) -> crate::Result<u64> {
        let reset = sqlx::query(
            "UPDATE queued_messages SET status = 'pending' WHERE status = 'processing'",
        )
        .execute(&self.pool)
        .await?
        .rows_affected();

        if reset > 0 {
            warn!("Recovered {} interrupted message(s) back to pending", reset);
        }
        Ok(reset)
    }

    /// Delete completed/failed messages queued more than `max_age_ms` ago
    ///
    /// Pending and processing messages are never deleted here.
    pub async fn cleanup(&self, max_age_ms: i64) -> crate::Result<u64> {
        let cutoff = now_ms().saturating_sub(max_age_ms.max(0));
        let removed = sqlx::query(
            "DELETE FROM queued_messages
             WHERE status IN ('completed', 'failed') AND queued_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if removed > 0 {
            info!("Cleaned up {} finished message(s)", removed);
        }
        Ok(removed)
    }

    /// Drop the oldest pending messages beyond `max_size`
    pub async fn enforce_max_size(&self, max_size: u64) -> crate::Result<u64> {
        let max_size = i64::try_from(max_size).unwrap_or(i64::MAX);
        let dropped = sqlx::query(
            "DELETE FROM queued_messages WHERE seq IN (
                SELECT seq FROM queued_messages
                WHERE status = 'pending'
                ORDER BY queued_at ASC, seq ASC
                LIMIT MAX((SELECT COUNT(*) FROM queued_messages WHERE status = 'pending') - ?, 0)
             )",
        )
        .bind(max_size)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if dropped > 0 {
            warn!(
                "Queue over capacity ({}), dropped {} oldest pending message(s)",
                max_size, dropped
            );
        }
        Ok(dropped)
    }

    /// Aggregate counts by status
    pub async fn stats(&self) -> crate::Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) AS total,
                COALESCE(SUM(status = 'pending'), 0) AS pending,
                COALESCE(SUM(status = 'processing'), 0) AS processing,
                COALESCE(SUM(status = 'failed'), 0) AS failed,
                COALESCE(SUM(status = 'completed'), 0) AS completed,
                MIN(CASE WHEN status = 'pending' THEN queued_at END) AS oldest_queued_at
             FROM queued_messages",
        )
        .fetch_one(&self.pool)
        .await?;

        let count = |column: &str| -> crate::Result<u64> {
            let value: i64 = row.try_get(column)?;
            Ok(u64::try_from(value).unwrap_or(0))
        };

        Ok(QueueStats {
            total: count("total")?,
            pending: count("pending")?,
            processing: count("processing")?,
            failed: count("failed")?,
            completed: count("completed")?,
            oldest_queued_at: row.try_get("oldest_queued_at")?,
        })
    }

    /// Close the pool, flushing pending writes
    pub async fn close(&self) {
        self.pool.close().await;
        debug!("Offline queue closed");
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_message(row: &SqliteRow) -> crate::Result<QueuedMessage> {
    let metadata: String = row.try_get("metadata")?;
    let status: String = row.try_get("status")?;
    let attempts: i64 = row.try_get("attempts")?;

    Ok(QueuedMessage {
        id: row.try_get("id")?,
        channel: row.try_get("channel")?,
        account_id: row.try_get("account_id")?,
        sender_id: row.try_get("sender_id")?,
        chat_id: row.try_get("chat_id")?,
        body: row.try_get("body")?,
        media_path: row.try_get("media_path")?,
        metadata: serde_json::from_str(&metadata)?,
        queued_at: row.try_get("queued_at")?,
        attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        last_attempt_at: row.try_get("last_attempt_at")?,
        status: status.parse()?,
        last_error: row.try_get("last_error")?,
    })
}
