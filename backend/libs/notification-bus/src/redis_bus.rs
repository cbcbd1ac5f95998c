use crate::topics::{class_pattern, parse_topic, topic_for};
use crate::{
    forward, Delivery, NotificationEnvelope, NotificationPublisher, NotificationSubscriber, Result,
    Subscription, Target, TargetClass,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Redis Pub/Sub backed bus, shared by every service instance
#[derive(Clone)]
pub struct RedisNotificationBus {
    client: Client,
    manager: ConnectionManager,
}

impl RedisNotificationBus {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let manager = ConnectionManager::new(client.clone()).await?;

        Ok(Self { client, manager })
    }
}

#[async_trait]
impl NotificationPublisher for RedisNotificationBus {
    async fn publish(&self, target: Target, envelope: &NotificationEnvelope) -> Result<usize> {
        let topic = topic_for(&envelope.notification_type, &target);
        let payload = serde_json::to_string(envelope)?;

        let mut conn = self.manager.clone();
        let receivers: usize = conn.publish(&topic, payload).await?;

        debug!(
            envelope_id = %envelope.id,
            topic = %topic,
            receivers,
            "notification published"
        );

        Ok(receivers)
    }
}

#[async_trait]
impl NotificationSubscriber for RedisNotificationBus {
    async fn subscribe(&self, capacity: usize) -> Result<Subscription> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        for class in TargetClass::ALL {
            pubsub.psubscribe(class_pattern(class)).await?;
        }

        info!("subscribed to notification topics");

        let (tx, rx) = mpsc::channel(capacity.max(1));

        let handle = tokio::spawn(async move {
            let mut stream = pubsub.on_message();

            while let Some(msg) = stream.next().await {
                let topic = msg.get_channel_name().to_string();

                let payload = match msg.get_payload::<String>() {
                    Ok(p) => p,
                    Err(e) => {
                        error!(error = ?e, topic = %topic, "failed to read notification payload");
                        continue;
                    }
                };

                let target = match parse_topic(&topic) {
                    Ok((_, target)) => target,
                    Err(e) => {
                        warn!(error = %e, "ignoring notification on unknown topic");
                        continue;
                    }
                };

                let envelope: NotificationEnvelope = match serde_json::from_str(&payload) {
                    Ok(e) => e,
                    Err(e) => {
                        error!(error = ?e, topic = %topic, "failed to deserialize notification");
                        continue;
                    }
                };

                let delivery = Delivery {
                    topic,
                    target,
                    envelope,
                };
                if !forward(&tx, delivery) {
                    break;
                }
            }

            warn!("notification subscription ended");
        });

        Ok(Subscription {
            deliveries: rx,
            handle,
        })
    }
}
