//! Routes bus deliveries to the sockets connected to this instance.

use crate::services::membership::MembershipDirectory;
use crate::websocket::message_types::ServerFrame;
use crate::websocket::registry::{ConnectionRegistry, SendOutcome};
use notification_bus::{Delivery, Subscription, Target};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct Dispatcher {
    registry: ConnectionRegistry,
    membership: Arc<dyn MembershipDirectory>,
}

impl Dispatcher {
    pub fn new(registry: ConnectionRegistry, membership: Arc<dyn MembershipDirectory>) -> Self {
        Self {
            registry,
            membership,
        }
    }

    /// Consume deliveries until the subscription ends.
    pub async fn run(self, mut subscription: Subscription) {
        while let Some(delivery) = subscription.deliveries.recv().await {
            self.dispatch(delivery).await;
        }
        warn!("notification subscription ended");
    }

    /// Push one delivery to its local recipients. Returns the frames queued.
    pub async fn dispatch(&self, delivery: Delivery) -> usize {
        let frame = match ServerFrame::Notification(delivery.envelope.clone()).to_json() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(topic = %delivery.topic, error = %e, "failed to encode notification");
                return 0;
            }
        };

        let recipients = match delivery.target {
            Target::User(user_id) => {
                if self.registry.subscriptions().is_bound(user_id).await {
                    vec![user_id]
                } else {
                    Vec::new()
                }
            }
            Target::Group(group_id) => {
                let members = match self.membership.members(group_id).await {
                    Ok(members) => members,
                    Err(e) => {
                        warn!(%group_id, error = %e, "group fan-out skipped, membership lookup failed");
                        return 0;
                    }
                };
                let mut local = Vec::new();
                for member in members {
                    if Some(member) == delivery.envelope.from_user_id {
                        continue;
                    }
                    if self.registry.subscriptions().is_bound(member).await {
                        local.push(member);
                    }
                }
                local
            }
            Target::Broadcast => self.registry.online_users().await,
        };

        self.push(&recipients, &frame, &delivery.topic).await
    }

    async fn push(&self, recipients: &[Uuid], frame: &str, topic: &str) -> usize {
        let mut queued = 0;
        for user_id in recipients {
            if self.registry.send(*user_id, frame.to_string()).await == SendOutcome::Queued {
                queued += 1;
            }
        }
        debug!(topic, recipients = recipients.len(), queued, "notification dispatched");
        queued
    }
}
