//! Record types for the channel/comment store.
//!
//! - `Channel`, `Post`: rows owned by the store
//! - `AuthorKind`, `CommentAuthor`: who wrote a comment
//! - `SyncBatch`: every write of one sync run, applied atomically by
//!   [`Store::commit_sync`](crate::Store::commit_sync)
//! - `LeaderboardRow`: one author's activity inside an analysis window

use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A channel known to the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Internal row id.
    pub id: i64,
    /// External chat identifier (e.g. -1001234567890).
    pub chat_id: i64,
    /// Public username without the leading `@`. Needed to resolve a gateway handle.
    pub username: Option<String>,
}

/// A channel post observed during sync. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub channel_id: i64,
    pub external_post_id: i64,
    pub published_at: DateTime<Utc>,
}

/// Who posted a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorKind {
    /// A person (or bot) account.
    User,
    /// A channel commenting as itself.
    Channel,
    /// A group chat acting as sender.
    Chat,
}

impl AuthorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorKind::User => "user",
            AuthorKind::Channel => "channel",
            AuthorKind::Chat => "chat",
        }
    }
}

/// Resolved comment author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub kind: AuthorKind,
    pub external_id: i64,
}

impl CommentAuthor {
    pub fn new(kind: AuthorKind, external_id: i64) -> Self {
        Self { kind, external_id }
    }
}

/// A post discovered on the gateway and not yet stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub external_post_id: i64,
    pub published_at: DateTime<Utc>,
}

/// A comment staged for insertion, addressed by its post's external id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub external_post_id: i64,
    pub external_comment_id: i64,
    pub author: CommentAuthor,
    pub commented_at: DateTime<Utc>,
}

/// All writes produced by one sync run of one channel.
///
/// The engine fills the batch while paging through the gateway; nothing is
/// written until the batch is committed, so an aborted run leaves no partial
/// post/comment graph and does not advance the channel cooldown.
#[derive(Debug, Clone)]
pub struct SyncBatch {
    pub channel_id: i64,
    pub synced_at: DateTime<Utc>,
    pub posts: Vec<NewPost>,
    pub comments: Vec<NewComment>,
    /// External ids of posts whose comments were (re-)fetched in this run.
    pub touched_posts: BTreeSet<i64>,
}

impl SyncBatch {
    pub fn new(channel_id: i64, synced_at: DateTime<Utc>) -> Self {
        Self {
            channel_id,
            synced_at,
            posts: Vec::new(),
            comments: Vec::new(),
            touched_posts: BTreeSet::new(),
        }
    }

    pub fn push_post(&mut self, post: NewPost) {
        self.posts.push(post);
    }

    pub fn push_comment(&mut self, comment: NewComment) {
        self.comments.push(comment);
    }

    /// Record that a post's comments were fetched, even if none were found.
    pub fn touch_post(&mut self, external_post_id: i64) {
        self.touched_posts.insert(external_post_id);
    }

    /// Distinct author ids referenced by staged comments.
    pub fn author_ids(&self) -> BTreeSet<i64> {
        self.comments.iter().map(|c| c.author.external_id).collect()
    }
}

/// Row counts written by a committed [`SyncBatch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitStats {
    pub posts_inserted: u64,
    pub users_inserted: u64,
    pub comments_inserted: u64,
    pub posts_stamped: u64,
}

/// Per-author activity inside a window, ordered by `comments_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardRow {
    pub author_external_id: i64,
    pub comments_count: i64,
    pub posts_count: i64,
}

pub(crate) fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_author_ids_are_distinct() {
        let now = Utc::now();
        let mut batch = SyncBatch::new(1, now);
        for (comment_id, author) in [(1, 10), (2, 10), (3, 11)] {
            batch.push_comment(NewComment {
                external_post_id: 7,
                external_comment_id: comment_id,
                author: CommentAuthor::new(AuthorKind::User, author),
                commented_at: now,
            });
        }
        batch.touch_post(7);
        batch.touch_post(7);

        assert_eq!(batch.author_ids().into_iter().collect::<Vec<_>>(), vec![10, 11]);
        assert_eq!(batch.touched_posts.len(), 1);
    }

    #[test]
    fn test_millis_conversion_keeps_precision() {
        let dt = Utc.timestamp_millis_opt(1_700_000_000_123).single().unwrap();
        assert_eq!(from_millis(to_millis(dt)), dt);
    }
}
