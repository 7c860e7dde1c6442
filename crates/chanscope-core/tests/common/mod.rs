//! Deterministic in-memory gateway and report harness shared by integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use chanscope_core::gateway::Replies;
use chanscope_core::{
    ChannelHandle, ChanscopeConfig, Clock, CoreUsersReport, FixedClock, GatewayError, Message,
    MessageQuery, MessagingGateway, Peer, ReportService, RetryConfig, Store,
};
use chanscope_store::Channel;

pub const CHAT_ID: i64 = -1_001_234_567_890;
pub const USERNAME: &str = "testchannel";

/// Failure mode injected into every gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Transient,
    NotFound,
    Revoked,
}

impl Failure {
    fn to_error(self) -> GatewayError {
        match self {
            Failure::Transient => GatewayError::Transient("connection reset".into()),
            Failure::NotFound => GatewayError::EntityNotFound(USERNAME.into()),
            Failure::Revoked => GatewayError::PermissionRevoked(USERNAME.into()),
        }
    }
}

#[derive(Default)]
struct FakePost {
    date: Option<DateTime<Utc>>,
    comments: BTreeMap<i64, Message>,
}

#[derive(Default)]
struct FakeState {
    channels: HashMap<String, i64>,
    posts: BTreeMap<i64, FakePost>,
    failure: Option<Failure>,
    /// Calls up to this count succeed; later ones fail with `failure`.
    fail_after: Option<u64>,
    /// Remaining failing calls; `None` fails indefinitely.
    fail_times: Option<u64>,
    delay: Option<StdDuration>,
}

/// Channel history served from memory, paged the way the real gateway pages:
/// posts ascending by id above `min_id`, replies ascending by id above `offset_id`.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
    calls: AtomicU64,
    reply_calls: AtomicU64,
}

impl FakeGateway {
    pub fn new() -> Self {
        let gateway = Self::default();
        gateway.add_channel(USERNAME, 777);
        gateway
    }

    pub fn add_channel(&self, username: &str, id: i64) {
        self.state
            .lock()
            .unwrap()
            .channels
            .insert(username.to_string(), id);
    }

    pub fn add_post(&self, id: i64, date: DateTime<Utc>) {
        self.state.lock().unwrap().posts.insert(
            id,
            FakePost {
                date: Some(date),
                ..FakePost::default()
            },
        );
    }

    pub fn add_undated_post(&self, id: i64) {
        self.state.lock().unwrap().posts.insert(id, FakePost::default());
    }

    pub fn add_comment(&self, post_id: i64, id: i64, date: DateTime<Utc>, user_id: i64) {
        self.add_comment_from(post_id, id, Some(date), Some(Peer::User { user_id }));
    }

    pub fn add_comment_from(
        &self,
        post_id: i64,
        id: i64,
        date: Option<DateTime<Utc>>,
        from_id: Option<Peer>,
    ) {
        let mut state = self.state.lock().unwrap();
        let post = state.posts.entry(post_id).or_default();
        post.comments.insert(
            id,
            Message {
                id,
                date,
                replies: None,
                from_id,
            },
        );
    }

    pub fn fail_with(&self, failure: Option<Failure>) {
        let mut state = self.state.lock().unwrap();
        state.failure = failure;
        state.fail_after = None;
        state.fail_times = None;
    }

    /// Let the next `calls` calls through, then fail every call.
    pub fn fail_after(&self, calls: u64, failure: Failure) {
        self.fail_between(calls, None, failure);
    }

    /// Let the next `calls` calls through, then fail `times` calls (or all of them).
    pub fn fail_between(&self, calls: u64, times: Option<u64>, failure: Failure) {
        let mut state = self.state.lock().unwrap();
        state.failure = Some(failure);
        state.fail_after = Some(self.calls() + calls);
        state.fail_times = times;
    }

    pub fn delay_each_call(&self, delay: Option<StdDuration>) {
        self.state.lock().unwrap().delay = delay;
    }

    /// Every call made, including retries.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Reply-thread listing calls only.
    pub fn reply_calls(&self) -> u64 {
        self.reply_calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<Option<StdDuration>, GatewayError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock().unwrap();
        let Some(failure) = state.failure else {
            return Ok(state.delay);
        };
        if state.fail_after.is_some_and(|limit| call <= limit) {
            return Ok(state.delay);
        }
        if let Some(left) = state.fail_times.as_mut() {
            if *left == 0 {
                return Ok(state.delay);
            }
            *left -= 1;
        }
        Err(failure.to_error())
    }
}

#[async_trait]
impl MessagingGateway for FakeGateway {
    async fn resolve_entity(&self, username: &str) -> Result<ChannelHandle, GatewayError> {
        if let Some(delay) = self.enter()? {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock().unwrap();
        match state.channels.get(username) {
            Some(&id) => Ok(ChannelHandle {
                id,
                username: username.to_string(),
                access_hash: None,
            }),
            None => Err(GatewayError::EntityNotFound(username.to_string())),
        }
    }

    async fn list_messages(
        &self,
        _handle: &ChannelHandle,
        query: &MessageQuery,
    ) -> Result<Vec<Message>, GatewayError> {
        if let Some(delay) = self.enter()? {
            tokio::time::sleep(delay).await;
        }
        let limit = query.limit as usize;
        let state = self.state.lock().unwrap();

        if let Some(post_id) = query.reply_to {
            self.reply_calls.fetch_add(1, Ordering::SeqCst);
            let offset = query.offset_id.unwrap_or(0);
            let Some(post) = state.posts.get(&post_id) else {
                return Ok(Vec::new());
            };
            return Ok(post
                .comments
                .values()
                .filter(|c| offset <= 0 || c.id > offset)
                .take(limit)
                .cloned()
                .collect());
        }

        let min_id = query.min_id.unwrap_or(0);
        Ok(state
            .posts
            .iter()
            .filter(|(&id, _)| id > min_id)
            .take(limit)
            .map(|(&id, post)| Message {
                id,
                date: post.date,
                replies: (!post.comments.is_empty()).then(|| Replies {
                    replies: post.comments.len() as u32,
                }),
                from_id: None,
            })
            .collect())
    }
}

/// Config with fast retries so failure tests do not sleep.
pub fn test_config() -> ChanscopeConfig {
    let mut config = ChanscopeConfig::default();
    config.retry = RetryConfig {
        max_retries: 2,
        initial_delay_ms: 1,
        max_delay_ms: 2,
    };
    config
}

pub struct Harness {
    pub store: Store,
    pub gateway: Arc<FakeGateway>,
    pub clock: Arc<FixedClock>,
    pub service: ReportService,
    pub start: DateTime<Utc>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: ChanscopeConfig) -> Self {
        let store = Store::in_memory().await.unwrap();
        let gateway = Arc::new(FakeGateway::new());
        let start: DateTime<Utc> = "2026-03-01T12:00:00Z".parse().unwrap();
        let clock = Arc::new(FixedClock::new(start));
        let service = ReportService::new(store.clone(), gateway.clone(), &config, clock.clone());
        Self {
            store,
            gateway,
            clock,
            service,
            start,
        }
    }

    /// Register the test channel the way an admin link would.
    pub async fn channel(&self) -> Channel {
        self.store
            .upsert_channel(CHAT_ID, Some(USERNAME))
            .await
            .unwrap()
    }

    pub async fn report(&self) -> CoreUsersReport {
        self.service
            .build_core_users_report_for_channel(CHAT_ID)
            .await
            .unwrap()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn days_ago(&self, days: i64) -> DateTime<Utc> {
        self.now() - Duration::days(days)
    }

    pub fn hours_ago(&self, hours: i64) -> DateTime<Utc> {
        self.now() - Duration::hours(hours)
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}
