//! Error types for gateway access and sync runs.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by a [`MessagingGateway`](crate::gateway::MessagingGateway).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway asked us to slow down.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// The request did not complete in time.
    #[error("gateway request timed out")]
    Timeout,

    /// Connection reset, 5xx and similar.
    #[error("transient gateway failure: {0}")]
    Transient(String),

    /// The username or message does not resolve.
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    /// The account lost access to the channel.
    #[error("permission revoked: {0}")]
    PermissionRevoked(String),

    /// The gateway answered with something we cannot decode.
    #[error("malformed gateway response: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// Whether retrying the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimited { .. } | GatewayError::Timeout | GatewayError::Transient(_)
        )
    }

    /// Server-provided wait before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// The channel cannot be reached through this gateway account at all.
    pub fn is_unresolvable(&self) -> bool {
        matches!(
            self,
            GatewayError::EntityNotFound(_) | GatewayError::PermissionRevoked(_)
        )
    }
}

/// Failure while collecting a sync batch.
///
/// Gateway failures degrade to "skip sync, serve stored data"; store
/// failures are fatal and reach the caller.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(GatewayError::RateLimited { retry_after: None }.is_retryable());
        assert!(GatewayError::Timeout.is_retryable());
        assert!(GatewayError::Transient("reset".into()).is_retryable());
        assert!(!GatewayError::EntityNotFound("x".into()).is_retryable());
        assert!(!GatewayError::PermissionRevoked("x".into()).is_retryable());
        assert!(!GatewayError::Malformed("x".into()).is_retryable());
    }

    #[test]
    fn test_retry_after_only_for_rate_limit() {
        let wait = Duration::from_secs(7);
        assert_eq!(
            GatewayError::RateLimited {
                retry_after: Some(wait)
            }
            .retry_after(),
            Some(wait)
        );
        assert_eq!(GatewayError::Timeout.retry_after(), None);
    }

    #[test]
    fn test_unresolvable_kinds() {
        assert!(GatewayError::EntityNotFound("x".into()).is_unresolvable());
        assert!(GatewayError::PermissionRevoked("x".into()).is_unresolvable());
        assert!(!GatewayError::Timeout.is_unresolvable());
    }
}
