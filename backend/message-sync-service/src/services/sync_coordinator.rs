//! Reconciles a device's last-known state with the server.
//!
//! Domain sections are fetched concurrently and independently: a domain that
//! fails or times out is logged and its section omitted, the rest of the sync
//! still succeeds. Message catch-up is per conversation and equally isolated.

use crate::config::SyncConfig;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{ConversationCursor, ConversationDelta, SyncRequest, SyncResponse};
use crate::services::domain_clients::{GroupDomain, RelationshipDomain, SessionDomain};
use crate::services::membership::MembershipDirectory;
use crate::services::message_store::MessageStore;
use crate::services::notifier::Notifier;
use futures::future::join_all;
use notification_bus::{NotificationEnvelope, NotificationType, Priority};
use serde_json::json;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Collaborating domains; `None` means the domain is not configured.
#[derive(Clone, Default)]
pub struct SyncDomains {
    pub relationships: Option<Arc<dyn RelationshipDomain>>,
    pub groups: Option<Arc<dyn GroupDomain>>,
    pub sessions: Option<Arc<dyn SessionDomain>>,
}

pub struct SyncCoordinator {
    domains: SyncDomains,
    store: Arc<MessageStore>,
    membership: Arc<dyn MembershipDirectory>,
    notifier: Notifier,
    limits: SyncConfig,
}

impl SyncCoordinator {
    pub fn new(
        domains: SyncDomains,
        store: Arc<MessageStore>,
        membership: Arc<dyn MembershipDirectory>,
        notifier: Notifier,
        limits: SyncConfig,
    ) -> Self {
        Self {
            domains,
            store,
            membership,
            notifier,
            limits,
        }
    }

    /// Run one domain call under the domain timeout. Failures become `None`.
    async fn guarded<T, F>(&self, domain: &'static str, call: Option<F>) -> Option<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        let Some(call) = call else {
            debug!(domain, "domain not configured, section omitted");
            metrics::SYNC_DOMAIN_FAILURES_TOTAL
                .with_label_values(&[domain])
                .inc();
            return None;
        };

        match tokio::time::timeout(self.limits.domain_timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(domain, error = %e, "domain sync failed, section omitted");
                metrics::SYNC_DOMAIN_FAILURES_TOTAL
                    .with_label_values(&[domain])
                    .inc();
                None
            }
            Err(_) => {
                warn!(
                    domain,
                    timeout_ms = self.limits.domain_timeout.as_millis() as u64,
                    "domain sync timed out, section omitted"
                );
                metrics::SYNC_DOMAIN_FAILURES_TOTAL
                    .with_label_values(&[domain])
                    .inc();
                None
            }
        }
    }

    fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.limits.default_limit)
            .clamp(1, self.limits.max_limit)
    }

    /// Full sync when `last_sync_time == 0`, otherwise only entities updated
    /// after it. Cursors drive per-conversation message catch-up.
    pub async fn full_or_incremental_sync(
        &self,
        user_id: Uuid,
        req: SyncRequest,
    ) -> AppResult<SyncResponse> {
        if req.last_sync_time < 0 {
            return Err(AppError::BadRequest(
                "lastSyncTime must not be negative".into(),
            ));
        }

        // Taken before any read so the next incremental sync cannot skip updates made meanwhile
        let sync_time = chrono::Utc::now().timestamp_millis();
        let full_sync = req.last_sync_time == 0;
        let since = (!full_sync).then_some(req.last_sync_time);

        let friends_call = self
            .domains
            .relationships
            .as_ref()
            .map(|d| d.friends(user_id, since));
        let groups_call = self.domains.groups.as_ref().map(|d| d.groups(user_id, since));
        let sessions_call = self
            .domains
            .sessions
            .as_ref()
            .map(|d| d.sessions(user_id, since));

        let (friends, groups, sessions, conversations) = tokio::join!(
            self.guarded("relationship", friends_call),
            self.guarded("group", groups_call),
            self.guarded("session", sessions_call),
            self.catch_up_messages(
                user_id,
                &req.conversation_cursors,
                req.limit_per_conversation
            ),
        );
        let conversations = conversations?;

        info!(
            %user_id,
            full_sync,
            friends = ?friends.as_ref().map(Vec::len),
            groups = ?groups.as_ref().map(Vec::len),
            sessions = ?sessions.as_ref().map(Vec::len),
            conversations = conversations.len(),
            "sync completed"
        );

        let envelope = NotificationEnvelope::new(
            NotificationType::SyncCompleted,
            json!({ "syncTime": sync_time, "fullSync": full_sync }),
        )
        .with_priority(Priority::Low);
        self.notifier.notify_user(user_id, &envelope).await;

        Ok(SyncResponse {
            friends,
            groups,
            sessions,
            conversations,
            sync_time,
            full_sync,
        })
    }

    /// Messages after each cursor, ascending, bounded per conversation.
    ///
    /// Conversations the user is not a member of, and conversations whose
    /// fetch fails, are left out.
    pub async fn catch_up_messages(
        &self,
        user_id: Uuid,
        cursors: &[ConversationCursor],
        limit_per_conversation: Option<usize>,
    ) -> AppResult<Vec<ConversationDelta>> {
        if let Some(bad) = cursors.iter().find(|c| c.last_seq < 0) {
            return Err(AppError::BadRequest(format!(
                "cursor for conversation {} is negative",
                bad.conversation_id
            )));
        }

        let limit = self.effective_limit(limit_per_conversation);

        let mut seen = HashSet::new();
        let unique: Vec<ConversationCursor> = cursors
            .iter()
            .filter(|c| seen.insert(c.conversation_id))
            .copied()
            .collect();

        let fetches = unique
            .into_iter()
            .map(|cursor| self.catch_up_one(user_id, cursor, limit));
        Ok(join_all(fetches).await.into_iter().flatten().collect())
    }

    async fn catch_up_one(
        &self,
        user_id: Uuid,
        cursor: ConversationCursor,
        limit: usize,
    ) -> Option<ConversationDelta> {
        let conversation_id = cursor.conversation_id;

        match self.membership.is_member(conversation_id, user_id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(%user_id, %conversation_id, "catch-up skipped, not a member");
                return None;
            }
            Err(e) => {
                warn!(%conversation_id, error = %e, "catch-up skipped, membership lookup failed");
                return None;
            }
        }

        let fetch_limit = limit as i64 + 1;
        // A cursor at i64::MAX has nothing after it
        let start_seq = cursor.last_seq.saturating_add(1);
        let mut messages = match self
            .store
            .get_range(conversation_id, start_seq, None, fetch_limit, false)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!(%conversation_id, error = %e, "catch-up failed for conversation");
                return None;
            }
        };

        let has_more = messages.len() > limit;
        messages.truncate(limit);
        let last_seq = messages
            .last()
            .map(|m| m.sequence)
            .unwrap_or(cursor.last_seq);

        Some(ConversationDelta {
            conversation_id,
            messages,
            has_more,
            last_seq,
        })
    }
}
