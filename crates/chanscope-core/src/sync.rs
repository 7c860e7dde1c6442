//! Channel sync engine.
//!
//! One run for one channel:
//! 1. take the per-channel advisory lock (non-blocking)
//! 2. cooldown gate, then resolvability gate
//! 3. page new posts past the stored high-water mark, fetching comments
//!    only for posts that report replies
//! 4. re-fetch comments of existing posts according to [`ResyncPolicy`]
//! 5. commit everything in one store transaction
//!
//! Steps 3-4 only stage writes in a [`SyncBatch`] and run under a wall-clock
//! budget. A gateway failure, an unresolvable channel or an exhausted budget
//! leaves the store untouched and yields `synced: false`.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use chanscope_store::{Channel, LockAttempt, NewComment, NewPost, Store, SyncBatch};

use crate::config::{RetryConfig, SyncConfig};
use crate::error::{GatewayError, SyncError};
use crate::gateway::{call_with_backoff, ChannelHandle, Message, MessageQuery, MessagingGateway};
use crate::policy::ResyncPolicy;

/// Why a sync call did not reach the gateway or did not commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The channel synced less than a cooldown ago.
    Cooldown,
    /// Another run holds the channel lock.
    LockHeld,
    /// No username to resolve a gateway handle with.
    NoUsername,
    /// The gateway does not know the channel or denies access.
    Unresolvable,
    /// The gateway kept failing after retries.
    GatewayFailure,
    /// The run exceeded its wall-clock budget.
    BudgetExceeded,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Cooldown => "cooldown",
            SkipReason::LockHeld => "lock_held",
            SkipReason::NoUsername => "no_username",
            SkipReason::Unresolvable => "unresolvable",
            SkipReason::GatewayFailure => "gateway_failure",
            SkipReason::BudgetExceeded => "budget_exceeded",
        }
    }
}

/// Counters for one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub gateway_calls: u64,
    pub post_pages: u64,
    pub new_posts: u64,
    pub resynced_posts: u64,
    pub comments_seen: u64,
    pub comments_inserted: u64,
    pub users_inserted: u64,
    pub dropped_messages: u64,
}

/// Result of [`SyncEngine::sync_channel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub synced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    pub stats: SyncStats,
}

impl SyncOutcome {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            synced: false,
            skipped: Some(reason),
            stats: SyncStats::default(),
        }
    }

    fn completed(stats: SyncStats) -> Self {
        Self {
            synced: true,
            skipped: None,
            stats,
        }
    }
}

/// Staged writes and counters of a run in progress.
struct SyncRun {
    batch: SyncBatch,
    stats: SyncStats,
}

pub struct SyncEngine {
    store: Store,
    gateway: Arc<dyn MessagingGateway>,
    config: SyncConfig,
    retry: RetryConfig,
    policy: ResyncPolicy,
}

impl SyncEngine {
    pub fn new(
        store: Store,
        gateway: Arc<dyn MessagingGateway>,
        config: SyncConfig,
        retry: RetryConfig,
    ) -> Self {
        let policy = ResyncPolicy::from_config(&config);
        Self {
            store,
            gateway,
            config,
            retry,
            policy,
        }
    }

    /// Sync one channel. Recoverable failures become `synced: false`;
    /// store failures are returned as errors.
    #[instrument(skip(self, channel), fields(chat_id = channel.chat_id))]
    pub async fn sync_channel(
        &self,
        channel: &Channel,
        window_from: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SyncOutcome> {
        let holder = Uuid::new_v4().to_string();
        let attempt = self
            .store
            .try_acquire_sync_lock(channel.id, &holder, now, self.config.lock_ttl())
            .await?;
        if attempt == LockAttempt::Held {
            info!("Skipping sync of {}: another sync is running", channel.chat_id);
            return Ok(SyncOutcome::skipped(SkipReason::LockHeld));
        }

        let result = self.sync_locked(channel, window_from, now).await;

        if let Err(e) = self.store.release_sync_lock(channel.id, &holder).await {
            warn!("Failed to release sync lock for {}: {}", channel.chat_id, e);
        }
        result
    }

    async fn sync_locked(
        &self,
        channel: &Channel,
        window_from: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SyncOutcome> {
        if let Some(last) = self.store.channel_last_synced_at(channel.id).await? {
            if now - last < self.config.cooldown() {
                debug!("Channel {} synced at {}, within cooldown", channel.chat_id, last);
                return Ok(SyncOutcome::skipped(SkipReason::Cooldown));
            }
        }

        let Some(username) = channel.username.as_deref() else {
            warn!("Channel {} has no username, cannot sync", channel.chat_id);
            return Ok(SyncOutcome::skipped(SkipReason::NoUsername));
        };

        let collected = tokio::time::timeout(
            self.config.sync_budget(),
            self.collect(channel, username, window_from, now),
        )
        .await;

        let mut run = match collected {
            Ok(Ok(run)) => run,
            Ok(Err(SyncError::Gateway(e))) => {
                let reason = if e.is_unresolvable() {
                    SkipReason::Unresolvable
                } else {
                    SkipReason::GatewayFailure
                };
                warn!("Sync of {} (@{}) aborted: {}", channel.chat_id, username, e);
                return Ok(SyncOutcome::skipped(reason));
            }
            Ok(Err(SyncError::Store(e))) => return Err(e),
            Err(_) => {
                warn!(
                    "Sync of {} exceeded its {:?} budget, discarding staged writes",
                    channel.chat_id,
                    self.config.sync_budget()
                );
                return Ok(SyncOutcome::skipped(SkipReason::BudgetExceeded));
            }
        };

        let committed = self.store.commit_sync(&run.batch).await?;
        run.stats.comments_inserted = committed.comments_inserted;
        run.stats.users_inserted = committed.users_inserted;

        info!(
            "Synced {}: {} new posts, {} re-synced, {} new comments, {} gateway calls",
            channel.chat_id,
            run.stats.new_posts,
            run.stats.resynced_posts,
            run.stats.comments_inserted,
            run.stats.gateway_calls
        );
        Ok(SyncOutcome::completed(run.stats))
    }

    /// Gateway phase: resolve, then new posts, then re-sync of existing posts.
    async fn collect(
        &self,
        channel: &Channel,
        username: &str,
        window_from: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SyncRun, SyncError> {
        let mut run = SyncRun {
            batch: SyncBatch::new(channel.id, now),
            stats: SyncStats::default(),
        };

        run.stats.gateway_calls += 1;
        let gateway = self.gateway.as_ref();
        let handle = call_with_backoff("resolve_entity", &self.retry, move || {
            gateway.resolve_entity(username)
        })
        .await?;

        let max_id_before = self.store.max_external_post_id(channel.id).await?;
        debug!("Channel {} high-water mark: {}", channel.chat_id, max_id_before);

        self.ingest_new_posts(&handle, channel, max_id_before, window_from, &mut run)
            .await?;
        self.resync_existing_posts(&handle, channel, max_id_before, window_from, now, &mut run)
            .await?;

        Ok(run)
    }

    async fn list(
        &self,
        handle: &ChannelHandle,
        query: MessageQuery,
        stats: &mut SyncStats,
    ) -> Result<Vec<Message>, GatewayError> {
        stats.gateway_calls += 1;
        let gateway = self.gateway.as_ref();
        let query = &query;
        call_with_backoff("list_messages", &self.retry, move || {
            gateway.list_messages(handle, query)
        })
        .await
    }

    /// Page posts with id greater than `max_id_before`, oldest first.
    async fn ingest_new_posts(
        &self,
        handle: &ChannelHandle,
        channel: &Channel,
        max_id_before: i64,
        window_from: DateTime<Utc>,
        run: &mut SyncRun,
    ) -> Result<(), SyncError> {
        let page_size = self.config.page_size;
        let mut min_id = max_id_before;
        let mut seen = HashSet::new();
        let mut pages = 0;

        loop {
            if pages >= self.config.max_post_pages {
                warn!(
                    "Channel {}: stopped after {} post pages",
                    channel.chat_id, pages
                );
                break;
            }
            pages += 1;
            run.stats.post_pages += 1;

            let page = self
                .list(handle, MessageQuery::posts_after(min_id, page_size), &mut run.stats)
                .await?;
            if page.is_empty() {
                break;
            }
            let page_len = page.len();

            let mut posts = Vec::with_capacity(page_len);
            for message in page {
                if !message.is_well_formed() || message.id <= max_id_before {
                    debug!("Skipping malformed post {}", message.id);
                    run.stats.dropped_messages += 1;
                    continue;
                }
                if seen.insert(message.id) {
                    posts.push(message);
                }
            }

            let page_max = posts.iter().map(|m| m.id).max();
            let Some(page_max) = page_max.filter(|&id| id > min_id) else {
                debug!("Channel {}: post page made no progress past {}", channel.chat_id, min_id);
                break;
            };

            let ids: Vec<i64> = posts.iter().map(|m| m.id).collect();
            let existing = self.store.existing_post_ids(channel.id, &ids).await?;

            for post in &posts {
                if !existing.contains(&post.id) {
                    if let Some(published_at) = post.date {
                        run.batch.push_post(NewPost {
                            external_post_id: post.id,
                            published_at,
                        });
                        run.stats.new_posts += 1;
                    }
                }

                if post.reply_count() > 0 {
                    self.ingest_comments(handle, post.id, window_from, run).await?;
                } else {
                    run.batch.touch_post(post.id);
                }
            }

            min_id = page_max;
            if page_len < page_size as usize {
                break;
            }
        }

        Ok(())
    }

    /// Re-fetch comments of already stored posts that are still inside the re-sync bands.
    async fn resync_existing_posts(
        &self,
        handle: &ChannelHandle,
        channel: &Channel,
        max_id_before: i64,
        window_from: DateTime<Utc>,
        now: DateTime<Utc>,
        run: &mut SyncRun,
    ) -> Result<(), SyncError> {
        let candidates = self
            .store
            .posts_published_after(channel.id, self.policy.medium_cutoff(now), max_id_before)
            .await?;
        if candidates.is_empty() {
            return Ok(());
        }

        let ids: Vec<i64> = candidates.iter().map(|p| p.id).collect();
        let synced = self.store.post_sync_times(&ids).await?;

        for post in &candidates {
            let last = synced.get(&post.id).copied();
            if !self.policy.should_resync(post.published_at, last, now) {
                continue;
            }
            self.ingest_comments(handle, post.external_post_id, window_from, run)
                .await?;
            run.stats.resynced_posts += 1;
        }

        Ok(())
    }

    /// Page a post's reply thread forward by offset, stopping at the first
    /// comment older than the window.
    async fn ingest_comments(
        &self,
        handle: &ChannelHandle,
        external_post_id: i64,
        window_from: DateTime<Utc>,
        run: &mut SyncRun,
    ) -> Result<(), SyncError> {
        let page_size = self.config.page_size;
        let mut offset_id = 0;
        let mut pages = 0;

        'pages: loop {
            if pages >= self.config.max_comment_pages {
                warn!(
                    "Post {}: stopped after {} comment pages",
                    external_post_id, pages
                );
                break;
            }
            pages += 1;

            let page = self
                .list(
                    handle,
                    MessageQuery::replies(external_post_id, offset_id, page_size),
                    &mut run.stats,
                )
                .await?;
            if page.is_empty() {
                break;
            }
            let page_len = page.len();
            let mut next_offset = offset_id;

            for message in &page {
                if message.id > 0 {
                    next_offset = message.id;
                }
                let Some(commented_at) = message.date.filter(|_| message.id > 0) else {
                    debug!("Post {}: skipping malformed comment {}", external_post_id, message.id);
                    run.stats.dropped_messages += 1;
                    continue;
                };
                if commented_at < window_from {
                    debug!(
                        "Post {}: comment {} predates the window, stopping",
                        external_post_id, message.id
                    );
                    break 'pages;
                }
                let Some(author) = message.author() else {
                    debug!(
                        "Post {}: comment {} has no resolvable author",
                        external_post_id, message.id
                    );
                    run.stats.dropped_messages += 1;
                    continue;
                };

                run.batch.push_comment(NewComment {
                    external_post_id,
                    external_comment_id: message.id,
                    author,
                    commented_at,
                });
                run.stats.comments_seen += 1;
            }

            if page_len < page_size as usize || next_offset == offset_id {
                break;
            }
            offset_id = next_offset;
        }

        run.batch.touch_post(external_post_id);
        Ok(())
    }
}
