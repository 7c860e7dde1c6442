//! Engine configuration schema and loading.
//!
//! Settings live in a TOML file at `<data dir>/config.toml`. Every field has
//! a default, so a missing file or a partial file is valid:
//!
//! ```toml
//! [sync]
//! window_days = 90
//! cooldown_days = 1
//!
//! [retry]
//! max_retries = 5
//!
//! [gateway]
//! base_url = "http://127.0.0.1:8081"
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides `gateway.token`.
pub const GATEWAY_TOKEN_ENV: &str = "CHANSCOPE_GATEWAY_TOKEN";

/// Upper bound for every day-based setting (ten years).
pub const MAX_DAYS: i64 = 3_650;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChanscopeConfig {
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Sync and report policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Length of the analysis and retention window.
    pub window_days: i64,
    /// Minimum time between two completed syncs of one channel.
    pub cooldown_days: i64,
    /// Posts younger than this always get their comments re-fetched.
    pub fresh_post_days: i64,
    /// Posts older than this are never re-fetched.
    pub medium_post_days: i64,
    /// Re-fetch interval for posts between the fresh and medium ages.
    pub medium_resync_interval_hours: i64,
    /// Messages requested per gateway page.
    pub page_size: u32,
    /// Upper bound on post pages per run.
    pub max_post_pages: u32,
    /// Upper bound on comment pages per post.
    pub max_comment_pages: u32,
    /// Wall-clock budget for the gateway phase of one run.
    pub sync_budget_secs: u64,
    /// Lifetime of a per-channel sync lock.
    pub lock_ttl_secs: i64,
    /// Leaderboard size.
    pub top_users: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            window_days: 90,
            cooldown_days: 1,
            fresh_post_days: 3,
            medium_post_days: 10,
            medium_resync_interval_hours: 48,
            page_size: 100,
            max_post_pages: 50,
            max_comment_pages: 100,
            sync_budget_secs: 300,
            lock_ttl_secs: 900,
            top_users: 10,
        }
    }
}

impl SyncConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::days(self.window_days)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::days(self.cooldown_days)
    }

    pub fn fresh_post_age(&self) -> chrono::Duration {
        chrono::Duration::days(self.fresh_post_days)
    }

    pub fn medium_post_age(&self) -> chrono::Duration {
        chrono::Duration::days(self.medium_post_days)
    }

    pub fn medium_resync_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(self.medium_resync_interval_hours)
    }

    pub fn sync_budget(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sync_budget_secs)
    }

    pub fn lock_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lock_ttl_secs)
    }
}

/// Retry policy for retryable gateway errors.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.max_delay_ms)
    }
}

/// HTTP bridge settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the messaging bridge. `None` disables remote sync.
    pub base_url: Option<String>,
    /// Bearer token sent to the bridge.
    pub token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            request_timeout_secs: 30,
        }
    }
}

impl ChanscopeConfig {
    /// Load configuration from a TOML file, falling back to defaults when absent.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(token) = std::env::var(GATEWAY_TOKEN_ENV) {
            if !token.trim().is_empty() {
                config.gateway.token = Some(token);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Reject settings the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        let sync = &self.sync;
        if !(1..=MAX_DAYS).contains(&sync.window_days) {
            bail!("sync.window_days must be between 1 and {}", MAX_DAYS);
        }
        if !(0..=MAX_DAYS).contains(&sync.cooldown_days) {
            bail!("sync.cooldown_days must be between 0 and {}", MAX_DAYS);
        }
        if !(0..=MAX_DAYS).contains(&sync.medium_post_days) {
            bail!("sync.medium_post_days must be between 0 and {}", MAX_DAYS);
        }
        if sync.fresh_post_days < 0 || sync.fresh_post_days > sync.medium_post_days {
            bail!("sync.fresh_post_days must be between 0 and sync.medium_post_days");
        }
        if !(0..=MAX_DAYS * 24).contains(&sync.medium_resync_interval_hours) {
            bail!(
                "sync.medium_resync_interval_hours must be between 0 and {}",
                MAX_DAYS * 24
            );
        }
        if sync.page_size == 0 {
            bail!("sync.page_size must be positive");
        }
        if sync.max_post_pages == 0 || sync.max_comment_pages == 0 {
            bail!("page limits must be positive");
        }
        if sync.top_users == 0 {
            bail!("sync.top_users must be positive");
        }
        if sync.sync_budget_secs == 0 {
            bail!("sync.sync_budget_secs must be positive");
        }
        if !(1..=MAX_DAYS * 86_400).contains(&sync.lock_ttl_secs) {
            bail!("sync.lock_ttl_secs must be between 1 and {}", MAX_DAYS * 86_400);
        }
        // A lock that can expire mid-run lets a second sync of the channel start.
        if sync.lock_ttl_secs as u64 <= sync.sync_budget_secs {
            bail!("sync.lock_ttl_secs must exceed sync.sync_budget_secs");
        }
        if self.gateway.request_timeout_secs == 0 {
            bail!("gateway.request_timeout_secs must be positive");
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            bail!("retry.initial_delay_ms must not exceed retry.max_delay_ms");
        }
        Ok(())
    }
}
