//! Rolling-window retention.
//!
//! The sweep is global: every report build deletes comments older than the
//! window start across all channels, not only the channel being reported.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::schema::to_millis;
use crate::Store;

/// Rows deleted per statement, keeping the write lock short on large tables.
const DELETE_BATCH: i64 = 5_000;

impl Store {
    /// Delete every comment with `commented_at < window_from`. Returns the number removed.
    #[instrument(skip(self))]
    pub async fn cleanup_old_comments(&self, window_from: DateTime<Utc>) -> Result<u64> {
        let cutoff = to_millis(window_from);
        let mut deleted = 0u64;

        loop {
            let result = sqlx::query(
                "DELETE FROM comments WHERE id IN (
                    SELECT id FROM comments WHERE commented_at < ?1 LIMIT ?2
                 )",
            )
            .bind(cutoff)
            .bind(DELETE_BATCH)
            .execute(&self.pool)
            .await?;

            let affected = result.rows_affected();
            deleted += affected;
            if affected < DELETE_BATCH as u64 {
                break;
            }
        }

        if deleted > 0 {
            info!("Retention: deleted {} comments older than {}", deleted, window_from);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::schema::{AuthorKind, CommentAuthor, NewComment, NewPost, SyncBatch};

    async fn seed(store: &Store, chat_id: i64, comments: &[(i64, DateTime<Utc>)]) -> i64 {
        let channel = store.upsert_channel(chat_id, None).await.unwrap();
        let mut batch = SyncBatch::new(channel.id, Utc::now());
        batch.push_post(NewPost {
            external_post_id: 1,
            published_at: Utc::now() - Duration::days(100),
        });
        for &(comment_id, commented_at) in comments {
            batch.push_comment(NewComment {
                external_post_id: 1,
                external_comment_id: comment_id,
                author: CommentAuthor::new(AuthorKind::User, comment_id),
                commented_at,
            });
        }
        store.commit_sync(&batch).await.unwrap();
        channel.id
    }

    #[tokio::test]
    async fn test_cleanup_is_global_and_strict() {
        let store = Store::in_memory().await.unwrap();
        let now = Utc::now();
        let window_from = now - Duration::days(90);

        let first = seed(
            &store,
            -1,
            &[
                (901, now - Duration::days(91)),
                (902, now - Duration::days(89)),
                (903, window_from),
            ],
        )
        .await;
        let second = seed(&store, -2, &[(904, now - Duration::days(200))]).await;

        let deleted = store.cleanup_old_comments(window_from).await.unwrap();

        assert_eq!(deleted, 2);
        // A comment exactly at the window start stays
        assert_eq!(store.comment_ids(first).await.unwrap(), vec![902, 903]);
        assert!(store.comment_ids(second).await.unwrap().is_empty());
        // Nothing left to delete
        assert_eq!(store.cleanup_old_comments(window_from).await.unwrap(), 0);
    }
}
