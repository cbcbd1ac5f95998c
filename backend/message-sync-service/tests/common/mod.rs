#![allow(dead_code)]

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use message_sync_service::config::Config;
use message_sync_service::error::{AppError, AppResult};
use message_sync_service::middleware::Claims;
use message_sync_service::models::{
    ContentType, ConversationType, FriendSummary, GroupSummary, SendMessageRequest, SessionSummary,
};
use message_sync_service::services::domain_clients::{GroupDomain, RelationshipDomain, SessionDomain};
use message_sync_service::services::{InMemoryMembershipDirectory, MembershipDirectory, SyncDomains};
use message_sync_service::state::{AppState, Backends};
use notification_bus::{BusError, NotificationEnvelope, NotificationPublisher, Target};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const TEST_SECRET: &str = "test-secret";

pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("JWT_SECRET", TEST_SECRET),
        ("STORAGE_BACKEND", "memory"),
        ("NOTIFICATION_BACKEND", "memory"),
        ("WS_HEARTBEAT_INTERVAL_SECS", "5"),
        ("WS_IDLE_TIMEOUT_SECS", "30"),
        ("SYNC_DOMAIN_TIMEOUT_MS", "200"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_vars(|key| vars.get(key).cloned()).expect("valid test config")
}

pub struct TestApp {
    pub state: AppState,
    pub membership: Arc<InMemoryMembershipDirectory>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(test_config(&[]), SyncDomains::default())
    }

    pub fn with(config: Config, domains: SyncDomains) -> Self {
        Self::with_backends(config, |backends| backends.domains = domains)
    }

    /// In-memory backends with individual pieces swapped out by `customize`.
    pub fn with_backends(config: Config, customize: impl FnOnce(&mut Backends)) -> Self {
        let (mut backends, membership) = Backends::in_memory(256);
        customize(&mut backends);
        Self {
            state: AppState::new(config, backends),
            membership,
        }
    }

    pub async fn conversation(&self, members: &[Uuid]) -> Uuid {
        let conversation_id = Uuid::new_v4();
        self.membership
            .set_members(conversation_id, members.iter().copied())
            .await;
        conversation_id
    }
}

pub fn text(conversation_id: Uuid, conversation_type: ConversationType, content: &str) -> SendMessageRequest {
    SendMessageRequest {
        conversation_id,
        conversation_type,
        content_type: ContentType::Text,
        content: content.to_string(),
        reply_to: None,
        at_users: Vec::new(),
        local_id: None,
    }
}

pub fn token_for(user_id: Uuid) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        exp: (now + 3600) as usize,
        iat: now as usize,
        device_id: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("encode test token")
}

/// Domain double returning fixed data and recording the `since` it was asked for
#[derive(Default)]
pub struct StaticDomain {
    pub friends: Vec<FriendSummary>,
    pub groups: Vec<GroupSummary>,
    pub sessions: Vec<SessionSummary>,
    pub seen_since: Mutex<Vec<Option<i64>>>,
}

impl StaticDomain {
    fn record(&self, since: Option<i64>) {
        self.seen_since.lock().unwrap().push(since);
    }
}

#[async_trait]
impl RelationshipDomain for StaticDomain {
    async fn friends(&self, _user_id: Uuid, since: Option<i64>) -> AppResult<Vec<FriendSummary>> {
        self.record(since);
        Ok(self.friends.clone())
    }
}

#[async_trait]
impl GroupDomain for StaticDomain {
    async fn groups(&self, _user_id: Uuid, since: Option<i64>) -> AppResult<Vec<GroupSummary>> {
        self.record(since);
        Ok(self.groups.clone())
    }
}

#[async_trait]
impl SessionDomain for StaticDomain {
    async fn sessions(&self, _user_id: Uuid, since: Option<i64>) -> AppResult<Vec<SessionSummary>> {
        self.record(since);
        Ok(self.sessions.clone())
    }
}

/// Domain that is always unreachable
pub struct UnreachableDomain;

#[async_trait]
impl RelationshipDomain for UnreachableDomain {
    async fn friends(&self, _user_id: Uuid, _since: Option<i64>) -> AppResult<Vec<FriendSummary>> {
        Err(AppError::Upstream("relationship-service unreachable".into()))
    }
}

/// Domain that answers after the sync timeout
pub struct SlowDomain;

#[async_trait]
impl SessionDomain for SlowDomain {
    async fn sessions(&self, _user_id: Uuid, _since: Option<i64>) -> AppResult<Vec<SessionSummary>> {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        Ok(Vec::new())
    }
}

/// Publisher whose every publish fails
pub struct BrokenPublisher;

#[async_trait]
impl NotificationPublisher for BrokenPublisher {
    async fn publish(
        &self,
        _target: Target,
        _envelope: &NotificationEnvelope,
    ) -> notification_bus::Result<usize> {
        Err(BusError::Closed)
    }
}

/// Membership directory whose `members` lookups start failing once `break_lookups` is called.
/// `is_member` keeps answering from the inner directory.
pub struct FlakyMembership {
    pub inner: Arc<InMemoryMembershipDirectory>,
    broken: AtomicBool,
}

impl FlakyMembership {
    pub fn new(inner: Arc<InMemoryMembershipDirectory>) -> Self {
        Self {
            inner,
            broken: AtomicBool::new(false),
        }
    }

    pub fn break_lookups(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MembershipDirectory for FlakyMembership {
    async fn members(&self, conversation_id: Uuid) -> AppResult<Vec<Uuid>> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(AppError::Database("membership db down".into()));
        }
        self.inner.members(conversation_id).await
    }

    async fn is_member(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        self.inner.is_member(conversation_id, user_id).await
    }
}
