//! Post and comment reads.
//!
//! Writes go through [`Store::commit_sync`]; this module only answers the
//! questions the sync engine and reports ask about stored content.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::schema::{from_millis, to_millis, Post};
use crate::Store;

/// Keeps `IN (...)` lists under SQLite's bound-parameter limit.
const MAX_IN_PARAMS: usize = 500;

impl Store {
    /// Largest external post id stored for a channel (the high-water mark), 0 if none.
    pub async fn max_external_post_id(&self, channel_id: i64) -> Result<i64> {
        let max: Option<i64> =
            sqlx::query_scalar("SELECT MAX(external_post_id) FROM posts WHERE channel_id = ?1")
                .bind(channel_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(max.unwrap_or(0))
    }

    /// Which of `external_ids` are already stored for the channel.
    pub async fn existing_post_ids(
        &self,
        channel_id: i64,
        external_ids: &[i64],
    ) -> Result<HashSet<i64>> {
        let mut found = HashSet::new();
        for chunk in external_ids.chunks(MAX_IN_PARAMS) {
            let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let query = format!(
                "SELECT external_post_id FROM posts WHERE channel_id = ? AND external_post_id IN ({})",
                placeholders
            );
            let mut q = sqlx::query_scalar::<_, i64>(&query).bind(channel_id);
            for id in chunk {
                q = q.bind(*id);
            }
            found.extend(q.fetch_all(&self.pool).await?);
        }
        Ok(found)
    }

    /// Posts at or below `max_external_post_id` published strictly after `published_after`,
    /// oldest first.
    pub async fn posts_published_after(
        &self,
        channel_id: i64,
        published_after: DateTime<Utc>,
        max_external_post_id: i64,
    ) -> Result<Vec<Post>> {
        let rows = sqlx::query_as::<_, (i64, i64, i64, i64)>(
            "SELECT id, channel_id, external_post_id, published_at FROM posts
             WHERE channel_id = ?1 AND published_at > ?2 AND external_post_id <= ?3
             ORDER BY external_post_id",
        )
        .bind(channel_id)
        .bind(to_millis(published_after))
        .bind(max_external_post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(post_from_row).collect())
    }

    /// A single post by its external id.
    pub async fn find_post(&self, channel_id: i64, external_post_id: i64) -> Result<Option<Post>> {
        let row = sqlx::query_as::<_, (i64, i64, i64, i64)>(
            "SELECT id, channel_id, external_post_id, published_at FROM posts
             WHERE channel_id = ?1 AND external_post_id = ?2",
        )
        .bind(channel_id)
        .bind(external_post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(post_from_row))
    }

    /// Number of posts stored for a channel.
    pub async fn post_count(&self, channel_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE channel_id = ?1")
            .bind(channel_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Total comment count across all channels.
    pub async fn comment_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// External comment ids stored for a channel, ascending.
    pub async fn comment_ids(&self, channel_id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT c.external_comment_id FROM comments c
             JOIN posts p ON p.id = c.post_id
             WHERE p.channel_id = ?1
             ORDER BY c.external_comment_id",
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Last comment-sync time for each of `post_ids` that has one.
    pub async fn post_sync_times(&self, post_ids: &[i64]) -> Result<HashMap<i64, DateTime<Utc>>> {
        let mut times = HashMap::new();
        for chunk in post_ids.chunks(MAX_IN_PARAMS) {
            let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let query = format!(
                "SELECT post_id, last_synced_at FROM post_sync WHERE post_id IN ({})",
                placeholders
            );
            let mut q = sqlx::query_as::<_, (i64, i64)>(&query);
            for id in chunk {
                q = q.bind(*id);
            }
            for (post_id, synced_at) in q.fetch_all(&self.pool).await? {
                times.insert(post_id, from_millis(synced_at));
            }
        }
        Ok(times)
    }
}

fn post_from_row((id, channel_id, external_post_id, published_at): (i64, i64, i64, i64)) -> Post {
    Post {
        id,
        channel_id,
        external_post_id,
        published_at: from_millis(published_at),
    }
}
