//! Messaging gateway abstraction.
//!
//! The engine talks to the messaging network through two calls:
//! - `resolve_entity`: username to [`ChannelHandle`]
//! - `list_messages`: id-paginated channel history or a post's reply thread
//!
//! [`HttpGateway`] is the production adapter. Tests substitute an in-memory
//! fake implementing the same trait.

mod http;

pub use http::HttpGateway;

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::warn;

use chanscope_store::{AuthorKind, CommentAuthor};

use crate::config::RetryConfig;
use crate::error::GatewayError;

/// Resolved channel reference, passed back on every listing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHandle {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub access_hash: Option<i64>,
}

/// Paging parameters for [`MessagingGateway::list_messages`].
///
/// `min_id` pages channel history forward (ids greater than `min_id`).
/// `reply_to` with `offset_id` pages a post's reply thread forward.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<i64>,
    pub limit: u32,
}

impl MessageQuery {
    /// Channel posts with id greater than `min_id`.
    pub fn posts_after(min_id: i64, limit: u32) -> Self {
        Self {
            min_id: Some(min_id),
            limit,
            ..Self::default()
        }
    }

    /// Replies to `post_id` after `offset_id`.
    pub fn replies(post_id: i64, offset_id: i64, limit: u32) -> Self {
        Self {
            offset_id: Some(offset_id),
            reply_to: Some(post_id),
            limit,
            ..Self::default()
        }
    }
}

/// Sender of a message as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_")]
pub enum Peer {
    #[serde(rename = "peerUser")]
    User { user_id: i64 },
    #[serde(rename = "peerChannel")]
    Channel { channel_id: i64 },
    #[serde(rename = "peerChat")]
    Chat { chat_id: i64 },
    #[serde(other)]
    Unknown,
}

impl Peer {
    /// Map a sender peer to a comment author. Unknown peers yield `None`.
    pub fn author(&self) -> Option<CommentAuthor> {
        match *self {
            Peer::User { user_id } => Some(CommentAuthor::new(AuthorKind::User, user_id)),
            Peer::Channel { channel_id } => {
                Some(CommentAuthor::new(AuthorKind::Channel, channel_id))
            }
            Peer::Chat { chat_id } => Some(CommentAuthor::new(AuthorKind::Chat, chat_id)),
            Peer::Unknown => None,
        }
    }
}

/// Thread metadata attached to channel posts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replies {
    #[serde(default)]
    pub replies: u32,
}

/// A channel post or a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    /// Send time; the wire carries epoch seconds.
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub replies: Option<Replies>,
    #[serde(default)]
    pub from_id: Option<Peer>,
}

impl Message {
    /// Number of replies the gateway reports for a post. Missing metadata counts as zero.
    pub fn reply_count(&self) -> u32 {
        self.replies.map(|r| r.replies).unwrap_or(0)
    }

    pub fn author(&self) -> Option<CommentAuthor> {
        self.from_id.as_ref().and_then(Peer::author)
    }

    /// Placeholder for a page item that could not be decoded.
    pub fn malformed(id: i64) -> Self {
        Self {
            id,
            date: None,
            replies: None,
            from_id: None,
        }
    }

    /// Messages without a positive id or a timestamp cannot be stored.
    pub fn is_well_formed(&self) -> bool {
        self.id > 0 && self.date.is_some()
    }
}

/// Client surface of the messaging network.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Resolve a public username to a channel handle.
    async fn resolve_entity(&self, username: &str) -> Result<ChannelHandle, GatewayError>;

    /// One page of messages. Pages are ascending by id.
    async fn list_messages(
        &self,
        handle: &ChannelHandle,
        query: &MessageQuery,
    ) -> Result<Vec<Message>, GatewayError>;
}

/// Run a gateway call, retrying retryable failures with exponential backoff.
///
/// A `retry_after` hint from the gateway replaces the computed delay for that attempt.
pub async fn call_with_backoff<T, F, Fut>(
    op: &str,
    retry: &RetryConfig,
    mut call: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut retries = 0;
    let mut delay = retry.initial_delay();

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && retries < retry.max_retries => {
                let wait = err.retry_after().unwrap_or(delay);
                warn!("{}: {}, retrying in {:?}", op, err, wait);
                sleep(wait).await;

                retries += 1;
                delay = std::cmp::min(delay * 2, retry.max_delay());
            }
            Err(err) => return Err(err),
        }
    }
}
