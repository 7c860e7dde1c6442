//! Per-author comment aggregation.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::schema::{to_millis, LeaderboardRow};
use crate::Store;

impl Store {
    /// Top commenters of a channel within `[window_from, window_to]`.
    ///
    /// Ordered by comment count descending; equal counts fall back to the
    /// author's external id so the order is stable across runs.
    #[instrument(skip(self))]
    pub async fn top_commenters(
        &self,
        channel_id: i64,
        window_from: DateTime<Utc>,
        window_to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LeaderboardRow>> {
        let rows = sqlx::query_as::<_, (i64, i64, i64)>(
            "SELECT u.external_id,
                    COUNT(c.id) AS comments_count,
                    COUNT(DISTINCT c.post_id) AS posts_count
             FROM comments c
             JOIN posts p ON p.id = c.post_id
             JOIN users u ON u.id = c.user_id
             WHERE p.channel_id = ?1
               AND c.commented_at >= ?2
               AND c.commented_at <= ?3
             GROUP BY u.id, u.external_id
             ORDER BY comments_count DESC, u.external_id ASC
             LIMIT ?4",
        )
        .bind(channel_id)
        .bind(to_millis(window_from))
        .bind(to_millis(window_to))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(author_external_id, comments_count, posts_count)| LeaderboardRow {
                author_external_id,
                comments_count,
                posts_count,
            })
            .collect())
    }
}
