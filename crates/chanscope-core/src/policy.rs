//! Age-banded comment re-sync policy.
//!
//! Comments keep arriving on recent posts, so a post's comment thread is
//! re-fetched on a schedule that depends on how old the post is:
//! - Fresh (`age < fresh`): every sync
//! - Medium (`fresh <= age < medium`): when the last fetch is older than the interval
//! - Stale (`age >= medium`): never

use chrono::{DateTime, Duration, Utc};

use crate::config::SyncConfig;

/// Age band of a post relative to "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgeBand {
    Fresh,
    Medium,
    Stale,
}

/// Band edges and the medium-band interval.
#[derive(Debug, Clone, Copy)]
pub struct ResyncPolicy {
    pub fresh_age: Duration,
    pub medium_age: Duration,
    pub medium_interval: Duration,
}

impl ResyncPolicy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            fresh_age: config.fresh_post_age(),
            medium_age: config.medium_post_age(),
            medium_interval: config.medium_resync_interval(),
        }
    }

    /// Band for a post published at `published_at`. Edges are strict `<`.
    pub fn band(&self, published_at: DateTime<Utc>, now: DateTime<Utc>) -> AgeBand {
        let age = now - published_at;
        if age < self.fresh_age {
            AgeBand::Fresh
        } else if age < self.medium_age {
            AgeBand::Medium
        } else {
            AgeBand::Stale
        }
    }

    /// Oldest publish time that can still be re-synced.
    pub fn medium_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.medium_age
    }

    /// Whether an existing post's comments should be fetched again.
    pub fn should_resync(
        &self,
        published_at: DateTime<Utc>,
        last_synced_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        match self.band(published_at, now) {
            AgeBand::Fresh => true,
            AgeBand::Medium => match last_synced_at {
                None => true,
                Some(at) => now - at >= self.medium_interval,
            },
            AgeBand::Stale => false,
        }
    }
}

impl Default for ResyncPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}
