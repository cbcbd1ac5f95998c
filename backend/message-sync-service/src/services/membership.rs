//! Conversation membership lookups.
//!
//! Membership is owned by the group and relationship domains; this service only
//! reads a projection of it.

use crate::error::AppResult;
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    async fn members(&self, conversation_id: Uuid) -> AppResult<Vec<Uuid>>;

    async fn is_member(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        Ok(self.members(conversation_id).await?.contains(&user_id))
    }
}

pub struct PgMembershipDirectory {
    pool: PgPool,
}

impl PgMembershipDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipDirectory for PgMembershipDirectory {
    async fn members(&self, conversation_id: Uuid) -> AppResult<Vec<Uuid>> {
        let members: Vec<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM conversation_members WHERE conversation_id = $1 ORDER BY joined_at",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    async fn is_member(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM conversation_members
                WHERE conversation_id = $1 AND user_id = $2
            )
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

#[derive(Default)]
pub struct InMemoryMembershipDirectory {
    conversations: RwLock<HashMap<Uuid, HashSet<Uuid>>>,
}

impl InMemoryMembershipDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_member(&self, conversation_id: Uuid, user_id: Uuid) {
        self.conversations
            .write()
            .await
            .entry(conversation_id)
            .or_default()
            .insert(user_id);
    }

    pub async fn remove_member(&self, conversation_id: Uuid, user_id: Uuid) {
        if let Some(members) = self.conversations.write().await.get_mut(&conversation_id) {
            members.remove(&user_id);
        }
    }

    pub async fn set_members(&self, conversation_id: Uuid, members: impl IntoIterator<Item = Uuid>) {
        self.conversations
            .write()
            .await
            .insert(conversation_id, members.into_iter().collect());
    }
}

#[async_trait]
impl MembershipDirectory for InMemoryMembershipDirectory {
    async fn members(&self, conversation_id: Uuid) -> AppResult<Vec<Uuid>> {
        Ok(self
            .conversations
            .read()
            .await
            .get(&conversation_id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn is_member(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        Ok(self
            .conversations
            .read()
            .await
            .get(&conversation_id)
            .is_some_and(|m| m.contains(&user_id)))
    }
}
