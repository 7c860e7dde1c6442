//! Chanscope Store - SQLite persistence for channel comment analytics.
//!
//! This crate owns every table the sync engine touches:
//!
//! - **Directory**: channels, users and admin links ([`directory`])
//! - **Posts/Comments**: ingested content keyed by external ids ([`content`])
//! - **Sync bookkeeping**: cooldown records, per-post stamps, advisory locks
//!   and the atomic batch commit ([`sync_state`])
//! - **Retention**: rolling-window comment cleanup ([`retention`])
//! - **Leaderboard**: per-author aggregation ([`leaderboard`])
//!
//! # Example
//!
//! ```ignore
//! use chanscope_store::Store;
//!
//! let store = Store::open(&db_path).await?;
//! let channel = store.upsert_channel(-1001234567890, Some("my_channel")).await?;
//! let top = store.top_commenters(channel.id, from, to, 10).await?;
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::instrument;

pub mod content;
pub mod directory;
pub mod leaderboard;
pub mod retention;
pub mod schema;
pub mod sync_state;

pub use schema::{
    AuthorKind, Channel, CommentAuthor, CommitStats, LeaderboardRow, NewComment, NewPost, Post,
    SyncBatch,
};
pub use sync_state::LockAttempt;

/// Store handle backed by a SQLite pool. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database at `db_path` and ensure the schema exists.
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let options = SqliteConnectOptions::from_str("sqlite:")?
            .filename(db_path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Private in-memory database, mostly for tests.
    ///
    /// A single connection that never expires: every pooled connection to
    /// `sqlite::memory:` would otherwise get its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    #[instrument(skip_all)]
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS channels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL UNIQUE,
                username TEXT UNIQUE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id INTEGER NOT NULL UNIQUE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS admin_channels (
                user_id INTEGER NOT NULL REFERENCES users(id),
                channel_id INTEGER NOT NULL REFERENCES channels(id),
                linked_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, channel_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel_id INTEGER NOT NULL REFERENCES channels(id),
                external_post_id INTEGER NOT NULL,
                published_at INTEGER NOT NULL,
                UNIQUE(channel_id, external_post_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL REFERENCES posts(id),
                user_id INTEGER NOT NULL REFERENCES users(id),
                external_comment_id INTEGER NOT NULL,
                author_kind TEXT NOT NULL,
                commented_at INTEGER NOT NULL,
                UNIQUE(post_id, external_comment_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS channel_sync (
                channel_id INTEGER PRIMARY KEY REFERENCES channels(id),
                last_synced_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS post_sync (
                post_id INTEGER PRIMARY KEY REFERENCES posts(id),
                last_synced_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sync_locks (
                channel_id INTEGER PRIMARY KEY REFERENCES channels(id),
                holder TEXT NOT NULL,
                acquired_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        // Window scans
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_posts_published ON posts(channel_id, published_at)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_comments_commented ON comments(commented_at)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_user ON comments(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_schema_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("chanscope.db");

        let store = Store::open(&db_path).await.unwrap();
        assert!(db_path.exists());

        let channel = store.upsert_channel(-100, Some("disk")).await.unwrap();
        drop(store);

        // Reopen: schema init is idempotent and data survives
        let store = Store::open(&db_path).await.unwrap();
        let found = store.find_channel_by_chat_id(-100).await.unwrap().unwrap();
        assert_eq!(found, channel);
    }
}
