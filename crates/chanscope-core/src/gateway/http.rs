//! HTTP bridge adapter.
//!
//! Talks to a bridge process that owns the messaging session:
//! - `GET {base}/channels/{username}` returns a [`ChannelHandle`]
//! - `GET {base}/channels/{username}/messages?min_id=&offset_id=&reply_to=&limit=`
//!   returns a JSON array of messages, ascending by id
//!
//! Status codes map onto [`GatewayError`]: 404 is not-found, 401/403 is
//! revoked access, 429 is rate limiting (honouring `Retry-After`), 5xx is
//! transient.
//!
//! An item that does not decode still occupies its slot in the page, so the
//! engine's short-page check sees the length the bridge actually returned.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use super::{ChannelHandle, Message, MessageQuery, MessagingGateway};
use crate::config::GatewayConfig;
use crate::error::GatewayError;

pub struct HttpGateway {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpGateway {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Build from config. Returns `None` when no bridge is configured.
    pub fn from_config(config: &GatewayConfig) -> anyhow::Result<Option<Self>> {
        match config.base_url.as_deref() {
            Some(base_url) if !base_url.trim().is_empty() => Ok(Some(Self::new(
                base_url,
                config.token.clone(),
                Duration::from_secs(config.request_timeout_secs),
            )?)),
            _ => Ok(None),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<Response, GatewayError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        Err(match status {
            StatusCode::NOT_FOUND => GatewayError::EntityNotFound(what.to_string()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                GatewayError::PermissionRevoked(what.to_string())
            }
            StatusCode::TOO_MANY_REQUESTS => GatewayError::RateLimited {
                retry_after: retry_after(&response),
            },
            s if s.is_server_error() => GatewayError::Transient(format!("{} returned {}", what, s)),
            s => GatewayError::Malformed(format!("{} returned {}", what, s)),
        })
    }
}

#[async_trait]
impl MessagingGateway for HttpGateway {
    async fn resolve_entity(&self, username: &str) -> Result<ChannelHandle, GatewayError> {
        let response = self
            .send(self.get(&format!("/channels/{}", username)), username)
            .await?;
        response
            .json::<ChannelHandle>()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))
    }

    async fn list_messages(
        &self,
        handle: &ChannelHandle,
        query: &MessageQuery,
    ) -> Result<Vec<Message>, GatewayError> {
        let request = self
            .get(&format!("/channels/{}/messages", handle.username))
            .query(query);
        let response = self.send(request, &handle.username).await?;
        let items = response
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        Ok(decode_page(items))
    }
}

/// Decode a page item by item. Items that do not match the message shape
/// become messages that fail [`Message::is_well_formed`], keeping their id
/// when it is readable.
fn decode_page(items: Vec<serde_json::Value>) -> Vec<Message> {
    items
        .into_iter()
        .map(|item| {
            let id = item.get("id").and_then(serde_json::Value::as_i64);
            serde_json::from_value::<Message>(item).unwrap_or_else(|e| {
                debug!("Undecodable message {:?}: {}", id, e);
                Message::malformed(id.unwrap_or(0))
            })
        })
        .collect()
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transient(err.to_string())
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}
