//! Sync bookkeeping: cooldown records, per-post stamps and advisory locks.
//!
//! Every write of a sync run lands through [`Store::commit_sync`] in one
//! transaction, so the channel cooldown only advances together with the
//! posts and comments it covers.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, info, instrument};

use crate::schema::{from_millis, to_millis, CommitStats, SyncBatch};
use crate::Store;

/// Result of a non-blocking lock attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAttempt {
    Acquired,
    /// Another holder owns an unexpired lock.
    Held,
}

impl Store {
    /// When the channel last completed a sync, if ever.
    pub async fn channel_last_synced_at(&self, channel_id: i64) -> Result<Option<DateTime<Utc>>> {
        let row: Option<i64> =
            sqlx::query_scalar("SELECT last_synced_at FROM channel_sync WHERE channel_id = ?1")
                .bind(channel_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(from_millis))
    }

    /// Overwrite the channel cooldown record.
    pub async fn set_channel_synced_at(&self, channel_id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        stamp_channel(&mut conn, channel_id, at).await
    }

    /// Overwrite a post's comment-sync record.
    pub async fn set_post_synced_at(&self, post_id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO post_sync (post_id, last_synced_at) VALUES (?1, ?2)
             ON CONFLICT(post_id) DO UPDATE SET last_synced_at = excluded.last_synced_at",
        )
        .bind(post_id)
        .bind(to_millis(at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Try to take the per-channel sync lock without waiting.
    ///
    /// One conditional write: it inserts a fresh lock or takes over an expired
    /// one, and touches nothing while another holder's lock is still live.
    #[instrument(skip(self))]
    pub async fn try_acquire_sync_lock(
        &self,
        channel_id: i64,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<LockAttempt> {
        let result = sqlx::query(
            "INSERT INTO sync_locks (channel_id, holder, acquired_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(channel_id) DO UPDATE SET
                holder = excluded.holder,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
             WHERE sync_locks.expires_at <= excluded.acquired_at",
        )
        .bind(channel_id)
        .bind(holder)
        .bind(to_millis(now))
        .bind(to_millis(now + ttl))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(LockAttempt::Acquired)
        } else {
            debug!("Sync lock for channel {} is held elsewhere", channel_id);
            Ok(LockAttempt::Held)
        }
    }

    /// Release a lock taken by `holder`. Releasing someone else's lock is a no-op.
    pub async fn release_sync_lock(&self, channel_id: i64, holder: &str) -> Result<()> {
        sqlx::query("DELETE FROM sync_locks WHERE channel_id = ?1 AND holder = ?2")
            .bind(channel_id)
            .bind(holder)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Apply a sync batch atomically and advance the channel cooldown.
    ///
    /// Posts, users and comments are inserted with ignore-on-conflict, so
    /// replaying a batch is a no-op apart from the sync stamps.
    #[instrument(skip(self, batch), fields(channel_id = batch.channel_id))]
    pub async fn commit_sync(&self, batch: &SyncBatch) -> Result<CommitStats> {
        let mut stats = CommitStats::default();
        let synced_at = to_millis(batch.synced_at);
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to open sync transaction")?;

        for post in &batch.posts {
            let result = sqlx::query(
                "INSERT INTO posts (channel_id, external_post_id, published_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(channel_id, external_post_id) DO NOTHING",
            )
            .bind(batch.channel_id)
            .bind(post.external_post_id)
            .bind(to_millis(post.published_at))
            .execute(&mut *tx)
            .await?;
            stats.posts_inserted += result.rows_affected();
        }

        for external_id in batch.author_ids() {
            let result = sqlx::query(
                "INSERT INTO users (external_id) VALUES (?1) ON CONFLICT(external_id) DO NOTHING",
            )
            .bind(external_id)
            .execute(&mut *tx)
            .await?;
            stats.users_inserted += result.rows_affected();
        }

        for comment in &batch.comments {
            let result = sqlx::query(
                "INSERT INTO comments (post_id, user_id, external_comment_id, author_kind, commented_at)
                 SELECT p.id, u.id, ?3, ?4, ?5 FROM posts p, users u
                 WHERE p.channel_id = ?1 AND p.external_post_id = ?2 AND u.external_id = ?6
                 ON CONFLICT(post_id, external_comment_id) DO NOTHING",
            )
            .bind(batch.channel_id)
            .bind(comment.external_post_id)
            .bind(comment.external_comment_id)
            .bind(comment.author.kind.as_str())
            .bind(to_millis(comment.commented_at))
            .bind(comment.author.external_id)
            .execute(&mut *tx)
            .await?;
            stats.comments_inserted += result.rows_affected();
        }

        for external_post_id in &batch.touched_posts {
            let result = sqlx::query(
                "INSERT INTO post_sync (post_id, last_synced_at)
                 SELECT id, ?3 FROM posts WHERE channel_id = ?1 AND external_post_id = ?2
                 ON CONFLICT(post_id) DO UPDATE SET last_synced_at = excluded.last_synced_at",
            )
            .bind(batch.channel_id)
            .bind(*external_post_id)
            .bind(synced_at)
            .execute(&mut *tx)
            .await?;
            stats.posts_stamped += result.rows_affected();
        }

        stamp_channel(&mut tx, batch.channel_id, batch.synced_at).await?;

        tx.commit().await.context("Failed to commit sync transaction")?;

        info!(
            "Committed sync for channel {}: {} new posts, {} new users, {} new comments, {} posts stamped",
            batch.channel_id,
            stats.posts_inserted,
            stats.users_inserted,
            stats.comments_inserted,
            stats.posts_stamped
        );
        Ok(stats)
    }
}

async fn stamp_channel(conn: &mut SqliteConnection, channel_id: i64, at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "INSERT INTO channel_sync (channel_id, last_synced_at) VALUES (?1, ?2)
         ON CONFLICT(channel_id) DO UPDATE SET last_synced_at = excluded.last_synced_at",
    )
    .bind(channel_id)
    .bind(to_millis(at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}
