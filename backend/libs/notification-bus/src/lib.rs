//! Topic-addressed notification bus.
//!
//! Fire-and-forget publish/subscribe for ephemeral notifications. Every
//! envelope targets exactly one of a user, a group or everyone; delivery is
//! at-most-once with no replay, so subscribers must treat a missed envelope as
//! something a later sync repairs.
//!
//! # Architecture
//!
//! ```text
//! message-sync-service (instance A):
//!   1. Persist message
//!   2. PUBLISH notify:user:message.new:<user_id> {"id": ..., "type": "message.new", ...}
//!      ↓
//! Redis Pub/Sub (PSUBSCRIBE notify:user:*, notify:group:*, notify:broadcast:*)
//!      ↓
//! message-sync-service (instances A, B, ...):
//!   3. Receive Delivery { topic, target, envelope }
//!   4. Push to the locally connected socket, if any
//! ```
//!
//! # Example
//!
//! ```no_run
//! use notification_bus::{
//!     NotificationEnvelope, NotificationPublisher, NotificationSubscriber, NotificationType,
//!     RedisNotificationBus, Target,
//! };
//! use uuid::Uuid;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), notification_bus::BusError> {
//! let bus = RedisNotificationBus::new("redis://localhost:6379").await?;
//! let mut subscription = bus.subscribe(1024).await?;
//!
//! let envelope = NotificationEnvelope::new(NotificationType::MessageNew, serde_json::json!({}));
//! bus.publish(Target::User(Uuid::new_v4()), &envelope).await?;
//!
//! while let Some(delivery) = subscription.deliveries.recv().await {
//!     println!("{} -> {:?}", delivery.topic, delivery.target);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

mod envelope;
mod error;
mod memory;
mod redis_bus;
pub mod topics;

pub use envelope::{NotificationEnvelope, NotificationType, Priority};
pub use error::BusError;
pub use memory::InMemoryNotificationBus;
pub use redis_bus::RedisNotificationBus;
pub use topics::{Target, TargetClass};

pub type Result<T> = std::result::Result<T, BusError>;

/// One envelope as received by a subscriber
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub topic: String,
    pub target: Target,
    pub envelope: NotificationEnvelope,
}

/// Live subscription: a bounded stream of deliveries fed by a background task
pub struct Subscription {
    pub deliveries: mpsc::Receiver<Delivery>,
    pub handle: JoinHandle<()>,
}

impl Subscription {
    /// Stop the background listener
    pub fn abort(&self) {
        self.handle.abort();
    }
}

#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    /// Publish one envelope to one target.
    ///
    /// Returns the number of subscribers that received it.
    async fn publish(&self, target: Target, envelope: &NotificationEnvelope) -> Result<usize>;
}

#[async_trait]
pub trait NotificationSubscriber: Send + Sync {
    /// Listen on every user, group and broadcast topic.
    ///
    /// Deliveries that find the channel full are dropped and logged.
    async fn subscribe(&self, capacity: usize) -> Result<Subscription>;
}

/// Hand a delivery to the subscriber without waiting.
///
/// Returns `false` once the receiving side is gone.
pub(crate) fn forward(tx: &mpsc::Sender<Delivery>, delivery: Delivery) -> bool {
    match tx.try_send(delivery) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                topic = %dropped.topic,
                envelope_id = %dropped.envelope.id,
                "subscriber channel full, dropping notification"
            );
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
