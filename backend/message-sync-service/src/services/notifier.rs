use crate::metrics;
use notification_bus::{NotificationEnvelope, NotificationPublisher, Target};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Best-effort publishing front for the notification bus.
///
/// A failed publish is logged and counted, never returned: message and receipt
/// state can always be recovered through sync.
#[derive(Clone)]
pub struct Notifier {
    publisher: Arc<dyn NotificationPublisher>,
}

impl Notifier {
    pub fn new(publisher: Arc<dyn NotificationPublisher>) -> Self {
        Self { publisher }
    }

    pub async fn publish(&self, target: Target, envelope: &NotificationEnvelope) {
        let class = target.class().as_str();
        match self.publisher.publish(target, envelope).await {
            Ok(receivers) => {
                metrics::NOTIFICATIONS_PUBLISHED_TOTAL
                    .with_label_values(&[class, "ok"])
                    .inc();
                debug!(
                    envelope_id = %envelope.id,
                    notification_type = %envelope.notification_type,
                    ?target,
                    receivers,
                    "notification sent"
                );
            }
            Err(e) => {
                metrics::NOTIFICATIONS_PUBLISHED_TOTAL
                    .with_label_values(&[class, "error"])
                    .inc();
                warn!(
                    envelope_id = %envelope.id,
                    notification_type = %envelope.notification_type,
                    ?target,
                    error = %e,
                    "notification publish failed"
                );
            }
        }
    }

    pub async fn notify_user(&self, user_id: Uuid, envelope: &NotificationEnvelope) {
        self.publish(Target::User(user_id), envelope).await
    }

    /// One envelope per user; each publish fails independently.
    pub async fn notify_users(&self, user_ids: &[Uuid], envelope: &NotificationEnvelope) {
        let sends = user_ids.iter().map(|user_id| self.notify_user(*user_id, envelope));
        futures::future::join_all(sends).await;
    }

    pub async fn notify_group(&self, group_id: Uuid, envelope: &NotificationEnvelope) {
        self.publish(Target::Group(group_id), envelope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use notification_bus::{BusError, NotificationType};

    struct BrokenPublisher;

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

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let notifier = Notifier::new(Arc::new(BrokenPublisher));
        let envelope = NotificationEnvelope::new(NotificationType::MessageNew, serde_json::json!({}));

        let before = metrics::NOTIFICATIONS_PUBLISHED_TOTAL
            .with_label_values(&["user", "error"])
            .get();
        notifier.notify_users(&[Uuid::new_v4(), Uuid::new_v4()], &envelope).await;
        let after = metrics::NOTIFICATIONS_PUBLISHED_TOTAL
            .with_label_values(&["user", "error"])
            .get();

        assert!(after >= before + 2);
    }
}
