//! Per-user notification bindings of this instance.
//!
//! The bus listener receives every user topic; only users bound here get their
//! envelopes pushed. Bindings follow online/offline transitions of the
//! registry, so a connection replacement leaves the binding untouched.
//!
//! The set is kept apart from the registry map. The dispatcher
//! checks a binding for every member of a group delivery, and those checks
//! take this read lock instead of the registry mutex that register,
//! unregister and send contend on.

use notification_bus::topics;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Default, Clone)]
pub struct SubscriptionManager {
    bound: Arc<RwLock<HashSet<Uuid>>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent. Returns `true` if the user was not bound before.
    pub async fn bind(&self, user_id: Uuid) -> bool {
        let added = self.bound.write().await.insert(user_id);
        if added {
            debug!(%user_id, pattern = %topics::user_binding(user_id), "bound user topics");
        }
        added
    }

    /// Idempotent. Returns `true` if the user was bound.
    pub async fn unbind(&self, user_id: Uuid) -> bool {
        let removed = self.bound.write().await.remove(&user_id);
        if removed {
            debug!(%user_id, pattern = %topics::user_binding(user_id), "unbound user topics");
        }
        removed
    }

    pub async fn is_bound(&self, user_id: Uuid) -> bool {
        self.bound.read().await.contains(&user_id)
    }

    pub async fn bound_count(&self) -> usize {
        self.bound.read().await.len()
    }
}
