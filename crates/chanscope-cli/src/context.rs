//! Resolved paths, configuration and store shared by every command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use chanscope_core::{
    ChannelHandle, ChanscopeConfig, ChanscopePaths, GatewayError, HttpGateway, Message,
    MessageQuery, MessagingGateway, ReportService, Store, SystemClock,
};

pub struct AppContext {
    pub config: ChanscopeConfig,
    pub store: Store,
}

impl AppContext {
    /// Resolve paths (flags win over the data dir), load config and open the store.
    pub async fn open(db: Option<PathBuf>, config: Option<PathBuf>) -> Result<Self> {
        let paths = ChanscopePaths::from_env();
        if db.is_none() {
            paths.ensure_dirs()?;
        }
        let db_path = db.unwrap_or_else(|| paths.db_path.clone());
        let config_path = config.unwrap_or_else(|| paths.config_path.clone());
        debug!(
            "Using database {} and config {}",
            db_path.display(),
            config_path.display()
        );

        let config = ChanscopeConfig::load(&config_path)?;
        let store = Store::open(&db_path)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;

        Ok(Self { config, store })
    }

    pub fn has_gateway(&self) -> bool {
        self.config
            .gateway
            .base_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }

    /// Report service wired to the configured bridge, or to an offline
    /// gateway that serves stored data only.
    pub fn report_service(&self) -> Result<ReportService> {
        let gateway: Arc<dyn MessagingGateway> = match HttpGateway::from_config(&self.config.gateway)? {
            Some(http) => Arc::new(http),
            None => {
                info!("No gateway configured, reports use stored data only");
                Arc::new(OfflineGateway)
            }
        };
        Ok(ReportService::new(
            self.store.clone(),
            gateway,
            &self.config,
            Arc::new(SystemClock),
        ))
    }
}

/// Gateway used when no bridge is configured. Every lookup fails as unresolvable,
/// so sync is skipped without touching the cooldown record.
struct OfflineGateway;

#[async_trait]
impl MessagingGateway for OfflineGateway {
    async fn resolve_entity(&self, username: &str) -> Result<ChannelHandle, GatewayError> {
        Err(GatewayError::EntityNotFound(format!(
            "{} (no gateway configured)",
            username
        )))
    }

    async fn list_messages(
        &self,
        handle: &ChannelHandle,
        _query: &MessageQuery,
    ) -> Result<Vec<Message>, GatewayError> {
        Err(GatewayError::EntityNotFound(format!(
            "{} (no gateway configured)",
            handle.username
        )))
    }
}
