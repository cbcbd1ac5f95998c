//! Per-process registry of live websocket connections, one per user.
//!
//! A new connection for a user replaces the previous one: the old connection is
//! told to close through its cancellation channel and the map entry is swapped
//! under the same lock. Unregistering is conditional on the connection id, so a
//! slow close of a replaced connection cannot evict its successor.
//!
//! Online and offline transitions bind and unbind the user's notification
//! topics while the map lock is held, so bindings always match the map.
//!
//! The registry is not shared between gateway instances. Running more than one
//! instance needs sticky routing of a user to one instance.

use crate::metrics;
use crate::websocket::subscription::SubscriptionManager;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Unique identifier of one accepted socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Registry side of a connection
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user_id: Uuid,
    pub device_id: Option<String>,
    pub connected_at: DateTime<Utc>,
    outbound: mpsc::Sender<String>,
    cancel: oneshot::Sender<()>,
}

/// Session side of a connection
pub struct ConnectionChannels {
    pub outbound: mpsc::Receiver<String>,
    /// Fires when a newer connection for the same user replaces this one
    pub cancelled: oneshot::Receiver<()>,
}

impl ConnectionHandle {
    /// Sender for frames the session itself produces, e.g. replies
    pub fn sender(&self) -> mpsc::Sender<String> {
        self.outbound.clone()
    }

    pub fn new(
        user_id: Uuid,
        device_id: Option<String>,
        capacity: usize,
    ) -> (Self, ConnectionChannels) {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity.max(1));
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let handle = Self {
            id: ConnectionId::new(),
            user_id,
            device_id,
            connected_at: Utc::now(),
            outbound: outbound_tx,
            cancel: cancel_tx,
        };
        let channels = ConnectionChannels {
            outbound: outbound_rx,
            cancelled: cancel_rx,
        };
        (handle, channels)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterOutcome {
    /// Connection that was cancelled to make room for this one
    pub replaced: Option<ConnectionId>,
    /// The user had no connection before
    pub came_online: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// Queue full or connection closing; the frame is gone
    Dropped,
    Offline,
}

#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    // user_id -> current connection
    inner: Arc<Mutex<HashMap<Uuid, ConnectionHandle>>>,
    subscriptions: SubscriptionManager,
}

impl ConnectionRegistry {
    pub fn new(subscriptions: SubscriptionManager) -> Self {
        Self {
            inner: Arc::default(),
            subscriptions,
        }
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    pub async fn register(&self, handle: ConnectionHandle) -> RegisterOutcome {
        let user_id = handle.user_id;
        let connection_id = handle.id;

        let mut guard = self.inner.lock().await;
        let previous = guard.insert(user_id, handle);
        metrics::LIVE_CONNECTIONS.set(guard.len() as i64);
        if previous.is_none() {
            self.subscriptions.bind(user_id).await;
        }
        drop(guard);

        match previous {
            Some(old) => {
                // The old session may already be gone; nothing to cancel then
                let _ = old.cancel.send(());
                info!(
                    %user_id,
                    old_connection = %old.id,
                    new_connection = %connection_id,
                    "connection replaced"
                );
                RegisterOutcome {
                    replaced: Some(old.id),
                    came_online: false,
                }
            }
            None => {
                info!(%user_id, connection = %connection_id, "user online");
                RegisterOutcome {
                    replaced: None,
                    came_online: true,
                }
            }
        }
    }

    /// Remove `connection_id` if it is still the user's current connection.
    ///
    /// Returns `true` when the user went offline.
    pub async fn unregister(&self, user_id: Uuid, connection_id: ConnectionId) -> bool {
        let mut guard = self.inner.lock().await;
        let is_current = guard
            .get(&user_id)
            .is_some_and(|current| current.id == connection_id);
        if !is_current {
            debug!(%user_id, connection = %connection_id, "stale unregister ignored");
            return false;
        }

        guard.remove(&user_id);
        metrics::LIVE_CONNECTIONS.set(guard.len() as i64);
        self.subscriptions.unbind(user_id).await;
        info!(%user_id, connection = %connection_id, "user offline");
        true
    }

    /// Enqueue a frame without waiting. A full queue drops the frame.
    pub async fn send(&self, user_id: Uuid, frame: String) -> SendOutcome {
        let guard = self.inner.lock().await;
        let Some(connection) = guard.get(&user_id) else {
            return SendOutcome::Offline;
        };

        match connection.outbound.try_send(frame) {
            Ok(()) => SendOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                metrics::OUTBOUND_FRAMES_DROPPED_TOTAL.inc();
                warn!(
                    %user_id,
                    connection = %connection.id,
                    "outbound queue full, dropping frame"
                );
                SendOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(%user_id, connection = %connection.id, "outbound queue closed");
                SendOutcome::Dropped
            }
        }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.lock().await.contains_key(&user_id)
    }

    pub async fn online_count(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        self.inner.lock().await.keys().copied().collect()
    }

    pub async fn current_connection(&self, user_id: Uuid) -> Option<ConnectionId> {
        self.inner.lock().await.get(&user_id).map(|c| c.id)
    }
}
