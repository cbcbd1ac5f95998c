use crate::config::{Config, NotificationBackend, StorageBackend};
use crate::db;
use crate::error::AppResult;
use crate::middleware::JwtValidator;
use crate::services::domain_clients::HttpDomainClient;
use crate::services::membership::{InMemoryMembershipDirectory, MembershipDirectory, PgMembershipDirectory};
use crate::services::message_repository::{
    InMemoryMessageRepository, MessageRepository, PgMessageRepository,
};
use crate::services::read_receipts::{
    InMemoryReceiptRepository, PgReceiptRepository, ReceiptRepository,
};
use crate::services::sequencer::{InMemorySequencer, PgSequencer, Sequencer};
use crate::services::{
    MessageService, MessageStore, Notifier, ReadReceiptTracker, SyncCoordinator, SyncDomains,
};
use crate::websocket::{ConnectionRegistry, SubscriptionManager};
use notification_bus::{
    InMemoryNotificationBus, NotificationPublisher, NotificationSubscriber, RedisNotificationBus,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Storage, bus and domain implementations the service is assembled from
pub struct Backends {
    pub sequencer: Arc<dyn Sequencer>,
    pub messages: Arc<dyn MessageRepository>,
    pub receipts: Arc<dyn ReceiptRepository>,
    pub membership: Arc<dyn MembershipDirectory>,
    pub publisher: Arc<dyn NotificationPublisher>,
    pub subscriber: Arc<dyn NotificationSubscriber>,
    pub domains: SyncDomains,
}

impl Backends {
    /// Single-process backends. The membership directory is returned so the
    /// caller can populate it.
    pub fn in_memory(bus_capacity: usize) -> (Self, Arc<InMemoryMembershipDirectory>) {
        let membership = Arc::new(InMemoryMembershipDirectory::new());
        let bus = Arc::new(InMemoryNotificationBus::new(bus_capacity));

        let backends = Self {
            sequencer: Arc::new(InMemorySequencer::new()),
            messages: Arc::new(InMemoryMessageRepository::new()),
            receipts: Arc::new(InMemoryReceiptRepository::new()),
            membership: membership.clone(),
            publisher: bus.clone(),
            subscriber: bus,
            domains: SyncDomains::default(),
        };
        (backends, membership)
    }

    /// Backends selected by `STORAGE_BACKEND` and `NOTIFICATION_BACKEND`.
    pub async fn from_config(config: &Config) -> AppResult<Self> {
        let (mut backends, membership) = Self::in_memory(1024);

        if config.storage == StorageBackend::Memory {
            if config.memory_conversations.is_empty() {
                warn!("memory storage without MEMORY_CONVERSATIONS, every conversation is empty");
            }
            for (conversation_id, members) in &config.memory_conversations {
                membership
                    .set_members(*conversation_id, members.iter().copied())
                    .await;
            }
            info!(
                conversations = config.memory_conversations.len(),
                "using in-memory storage"
            );
        }

        if config.storage == StorageBackend::Postgres {
            let url = config.database_url.as_deref().unwrap_or_default();
            let pool = db::init_pool(url, config.db_max_connections).await?;
            backends.sequencer = Arc::new(PgSequencer::new(pool.clone()));
            backends.messages = Arc::new(PgMessageRepository::new(pool.clone()));
            backends.receipts = Arc::new(PgReceiptRepository::new(pool.clone()));
            backends.membership = Arc::new(PgMembershipDirectory::new(pool));
            info!("using postgres storage");
        }

        if config.notifications == NotificationBackend::Redis {
            let url = config.redis_url.as_deref().unwrap_or_default();
            let bus = Arc::new(RedisNotificationBus::new(url).await?);
            backends.publisher = bus.clone();
            backends.subscriber = bus;
            info!("using redis notification bus");
        }

        let timeout = config.sync.domain_timeout;
        let endpoints = &config.domains;
        if let Some(url) = &endpoints.relationship_url {
            backends.domains.relationships = Some(Arc::new(HttpDomainClient::new(url, timeout)?));
        }
        if let Some(url) = &endpoints.group_url {
            backends.domains.groups = Some(Arc::new(HttpDomainClient::new(url, timeout)?));
        }
        if let Some(url) = &endpoints.session_url {
            backends.domains.sessions = Some(Arc::new(HttpDomainClient::new(url, timeout)?));
        }

        Ok(backends)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub messages: Arc<MessageService>,
    pub store: Arc<MessageStore>,
    pub receipts: Arc<ReadReceiptTracker>,
    pub sync: Arc<SyncCoordinator>,
    pub membership: Arc<dyn MembershipDirectory>,
    pub notifier: Notifier,
    pub subscriber: Arc<dyn NotificationSubscriber>,
    pub registry: ConnectionRegistry,
    pub subscriptions: SubscriptionManager,
    pub jwt: Arc<JwtValidator>,
}

impl AppState {
    pub fn new(config: Config, backends: Backends) -> Self {
        let store = Arc::new(MessageStore::new(
            backends.sequencer,
            backends.messages,
            config.recall_window_secs,
        ));
        let receipts = Arc::new(ReadReceiptTracker::new(backends.receipts, store.clone()));
        let notifier = Notifier::new(backends.publisher);

        let messages = Arc::new(MessageService::new(
            store.clone(),
            receipts.clone(),
            backends.membership.clone(),
            notifier.clone(),
            config.max_content_length,
        ));
        let sync = Arc::new(SyncCoordinator::new(
            backends.domains,
            store.clone(),
            backends.membership.clone(),
            notifier.clone(),
            config.sync.clone(),
        ));

        let subscriptions = SubscriptionManager::new();

        Self {
            jwt: Arc::new(JwtValidator::new(&config.jwt_secret)),
            config: Arc::new(config),
            messages,
            store,
            receipts,
            sync,
            membership: backends.membership,
            notifier,
            subscriber: backends.subscriber,
            registry: ConnectionRegistry::new(subscriptions.clone()),
            subscriptions,
        }
    }
}
