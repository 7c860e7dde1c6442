//! Channel comment sync and core-user leaderboard engine.
//!
//! - [`gateway`]: messaging network access and the HTTP bridge adapter
//! - [`sync`]: cooldown-gated, age-banded incremental sync of one channel
//! - [`report`]: the report facade chat handlers call
//! - [`config`]: TOML settings

pub mod config;
pub mod error;
pub mod gateway;
pub mod policy;
pub mod report;
pub mod sync;

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

pub use chanscope_store::{Channel, Store};
pub use config::{ChanscopeConfig, GatewayConfig, RetryConfig, SyncConfig};
pub use error::{GatewayError, SyncError};
pub use gateway::{ChannelHandle, HttpGateway, Message, MessageQuery, MessagingGateway, Peer};
pub use policy::{AgeBand, ResyncPolicy};
pub use report::{CoreUserReportItem, CoreUsersReport, ReportKind, ReportService};
pub use sync::{SkipReason, SyncEngine, SyncOutcome, SyncStats};

#[derive(Debug, Clone)]
pub struct ChanscopePaths {
    pub base_dir: PathBuf,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
}

impl ChanscopePaths {
    pub fn from_env() -> Self {
        if let Some(dir) = std::env::var_os("CHANSCOPE_DATA_DIR") {
            return Self::from_base(PathBuf::from(dir));
        }
        if let Some(home) = std::env::var_os("HOME") {
            return Self::from_base(PathBuf::from(home).join(".chanscope"));
        }
        Self::from_base(PathBuf::from(".chanscope"))
    }

    pub fn from_base(base_dir: PathBuf) -> Self {
        let db_path = base_dir.join("chanscope.db");
        let config_path = base_dir.join("config.toml");
        Self {
            base_dir,
            db_path,
            config_path,
        }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }
}

/// Source of "now" for sync and report windows.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
