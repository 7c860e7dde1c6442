//! Core-users report facade.
//!
//! `build_core_users_report_for_channel` is the one entry point chat
//! handlers call: resolve the channel, sync it opportunistically, sweep
//! expired comments, then rank authors inside the analysis window.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use chanscope_store::{Channel, LeaderboardRow, Store};

use crate::config::ChanscopeConfig;
use crate::gateway::MessagingGateway;
use crate::sync::{SyncEngine, SyncOutcome};
use crate::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    Ok,
    NoData,
}

/// One leaderboard entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreUserReportItem {
    pub author_external_id: i64,
    pub comments_count: i64,
    pub posts_count: i64,
    pub avg_comments_per_active_post: f64,
}

impl From<LeaderboardRow> for CoreUserReportItem {
    fn from(row: LeaderboardRow) -> Self {
        let avg = if row.posts_count == 0 {
            0.0
        } else {
            row.comments_count as f64 / row.posts_count as f64
        };
        Self {
            author_external_id: row.author_external_id,
            comments_count: row.comments_count,
            posts_count: row.posts_count,
            avg_comments_per_active_post: avg,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreUsersReport {
    #[serde(rename = "type")]
    pub kind: ReportKind,
    /// Whether this call completed a fresh sync.
    pub synced_with_telegram: bool,
    pub items: Vec<CoreUserReportItem>,
    pub window_from: DateTime<Utc>,
    pub window_to: DateTime<Utc>,
    /// Details of the sync attempt, absent for unknown channels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncOutcome>,
}

impl CoreUsersReport {
    fn no_data(window_from: DateTime<Utc>, window_to: DateTime<Utc>) -> Self {
        Self {
            kind: ReportKind::NoData,
            synced_with_telegram: false,
            items: Vec::new(),
            window_from,
            window_to,
            sync: None,
        }
    }
}

pub struct ReportService {
    store: Store,
    engine: SyncEngine,
    clock: Arc<dyn Clock>,
    window: chrono::Duration,
    top_users: usize,
}

impl ReportService {
    pub fn new(
        store: Store,
        gateway: Arc<dyn MessagingGateway>,
        config: &ChanscopeConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let engine = SyncEngine::new(
            store.clone(),
            gateway,
            config.sync.clone(),
            config.retry.clone(),
        );
        Self {
            store,
            engine,
            clock,
            window: config.sync.window(),
            top_users: config.sync.top_users,
        }
    }

    /// `[now - window, now]` for the current clock reading.
    pub fn window_at(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let from = now
            .checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        (from, now)
    }

    #[instrument(skip(self))]
    pub async fn build_core_users_report_for_channel(&self, chat_id: i64) -> Result<CoreUsersReport> {
        let now = self.clock.now();
        let (window_from, window_to) = self.window_at(now);

        let Some(channel) = self.store.find_channel_by_chat_id(chat_id).await? else {
            info!("Report requested for unknown channel {}", chat_id);
            return Ok(CoreUsersReport::no_data(window_from, window_to));
        };

        let outcome = self.engine.sync_channel(&channel, window_from, now).await?;
        self.store.cleanup_old_comments(window_from).await?;
        let items = self
            .load_top_users_for_channel(&channel, window_from, window_to)
            .await?;

        let kind = if items.is_empty() {
            ReportKind::NoData
        } else {
            ReportKind::Ok
        };
        Ok(CoreUsersReport {
            kind,
            synced_with_telegram: outcome.synced,
            items,
            window_from,
            window_to,
            sync: Some(outcome),
        })
    }

    /// Top authors of a channel inside `[window_from, window_to]`.
    pub async fn load_top_users_for_channel(
        &self,
        channel: &Channel,
        window_from: DateTime<Utc>,
        window_to: DateTime<Utc>,
    ) -> Result<Vec<CoreUserReportItem>> {
        let rows = self
            .store
            .top_commenters(channel.id, window_from, window_to, self.top_users)
            .await?;
        Ok(rows.into_iter().map(CoreUserReportItem::from).collect())
    }

    /// Run the retention sweep on its own, for the current window.
    pub async fn cleanup_old_comments(&self) -> Result<u64> {
        let (window_from, _) = self.window_at(self.clock.now());
        self.store.cleanup_old_comments(window_from).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_guards_zero_posts() {
        let item = CoreUserReportItem::from(LeaderboardRow {
            author_external_id: 1,
            comments_count: 0,
            posts_count: 0,
        });
        assert_eq!(item.avg_comments_per_active_post, 0.0);

        let item = CoreUserReportItem::from(LeaderboardRow {
            author_external_id: 1,
            comments_count: 5,
            posts_count: 2,
        });
        assert_eq!(item.avg_comments_per_active_post, 2.5);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let from: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let to: DateTime<Utc> = "2026-04-01T00:00:00Z".parse().unwrap();
        let mut report = CoreUsersReport::no_data(from, to);
        report.kind = ReportKind::Ok;
        report.items.push(CoreUserReportItem {
            author_external_id: 42,
            comments_count: 3,
            posts_count: 2,
            avg_comments_per_active_post: 1.5,
        });

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["type"], "ok");
        assert_eq!(json["syncedWithTelegram"], false);
        assert_eq!(json["items"][0]["authorExternalId"], 42);
        assert_eq!(json["items"][0]["avgCommentsPerActivePost"], 1.5);
        assert!(json.get("sync").is_none());

        let empty = serde_json::to_value(CoreUsersReport::no_data(from, to)).unwrap();
        assert_eq!(empty["type"], "no-data");
    }
}
