use crate::topics::topic_for;
use crate::{
    forward, Delivery, NotificationEnvelope, NotificationPublisher, NotificationSubscriber, Result,
    Subscription, Target,
};
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// Process-local bus for single-instance deployments and tests
#[derive(Clone)]
pub struct InMemoryNotificationBus {
    sender: broadcast::Sender<Delivery>,
}

impl InMemoryNotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

impl Default for InMemoryNotificationBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl NotificationPublisher for InMemoryNotificationBus {
    async fn publish(&self, target: Target, envelope: &NotificationEnvelope) -> Result<usize> {
        let delivery = Delivery {
            topic: topic_for(&envelope.notification_type, &target),
            target,
            envelope: envelope.clone(),
        };

        // No live subscriber is not an error for a fire-and-forget bus
        let receivers = self.sender.send(delivery).unwrap_or(0);
        debug!(envelope_id = %envelope.id, receivers, "notification published");
        Ok(receivers)
    }
}

#[async_trait]
impl NotificationSubscriber for InMemoryNotificationBus {
    async fn subscribe(&self, capacity: usize) -> Result<Subscription> {
        let mut source = self.sender.subscribe();
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let handle = tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(delivery) => {
                        if !forward(&tx, delivery) {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "notification subscriber lagged, envelopes lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription {
            deliveries: rx,
            handle,
        })
    }
}
