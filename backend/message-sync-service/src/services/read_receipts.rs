use crate::error::{AppError, AppResult};
use crate::models::ReadReceipt;
use crate::services::message_store::MessageStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait ReceiptRepository: Send + Sync {
    /// Upsert keyed by (conversation, user). A smaller sequence than the stored
    /// one leaves the stored receipt untouched. Returns the receipt as stored.
    async fn upsert_monotonic(&self, receipt: &ReadReceipt) -> AppResult<ReadReceipt>;

    async fn find(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<Option<ReadReceipt>>;

    async fn list(&self, conversation_id: Uuid) -> AppResult<Vec<ReadReceipt>>;
}

#[derive(sqlx::FromRow)]
struct ReceiptRow {
    conversation_id: Uuid,
    user_id: Uuid,
    last_read_seq: i64,
    last_read_message_id: Option<Uuid>,
    read_at: DateTime<Utc>,
}

impl From<ReceiptRow> for ReadReceipt {
    fn from(row: ReceiptRow) -> Self {
        Self {
            conversation_id: row.conversation_id,
            user_id: row.user_id,
            last_read_seq: row.last_read_seq,
            last_read_message_id: row.last_read_message_id,
            read_at: row.read_at,
        }
    }
}

pub struct PgReceiptRepository {
    pool: PgPool,
}

impl PgReceiptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReceiptRepository for PgReceiptRepository {
    async fn upsert_monotonic(&self, receipt: &ReadReceipt) -> AppResult<ReadReceipt> {
        let row = sqlx::query_as::<_, ReceiptRow>(
            r#"
            INSERT INTO read_receipts (conversation_id, user_id, last_read_seq, last_read_message_id, read_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (conversation_id, user_id) DO UPDATE SET
                last_read_seq = GREATEST(read_receipts.last_read_seq, EXCLUDED.last_read_seq),
                last_read_message_id = CASE
                    WHEN EXCLUDED.last_read_seq > read_receipts.last_read_seq
                    THEN EXCLUDED.last_read_message_id
                    ELSE read_receipts.last_read_message_id
                END,
                read_at = CASE
                    WHEN EXCLUDED.last_read_seq > read_receipts.last_read_seq
                    THEN EXCLUDED.read_at
                    ELSE read_receipts.read_at
                END
            RETURNING conversation_id, user_id, last_read_seq, last_read_message_id, read_at
            "#,
        )
        .bind(receipt.conversation_id)
        .bind(receipt.user_id)
        .bind(receipt.last_read_seq)
        .bind(receipt.last_read_message_id)
        .bind(receipt.read_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<Option<ReadReceipt>> {
        let row = sqlx::query_as::<_, ReceiptRow>(
            r#"
            SELECT conversation_id, user_id, last_read_seq, last_read_message_id, read_at
            FROM read_receipts
            WHERE conversation_id = $1 AND user_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list(&self, conversation_id: Uuid) -> AppResult<Vec<ReadReceipt>> {
        let rows = sqlx::query_as::<_, ReceiptRow>(
            r#"
            SELECT conversation_id, user_id, last_read_seq, last_read_message_id, read_at
            FROM read_receipts
            WHERE conversation_id = $1
            ORDER BY last_read_seq DESC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(Default)]
pub struct InMemoryReceiptRepository {
    receipts: RwLock<HashMap<(Uuid, Uuid), ReadReceipt>>,
}

impl InMemoryReceiptRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReceiptRepository for InMemoryReceiptRepository {
    async fn upsert_monotonic(&self, receipt: &ReadReceipt) -> AppResult<ReadReceipt> {
        let mut receipts = self.receipts.write().await;
        let stored = receipts
            .entry((receipt.conversation_id, receipt.user_id))
            .and_modify(|existing| {
                if receipt.last_read_seq > existing.last_read_seq {
                    *existing = receipt.clone();
                }
            })
            .or_insert_with(|| receipt.clone());
        Ok(stored.clone())
    }

    async fn find(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<Option<ReadReceipt>> {
        Ok(self
            .receipts
            .read()
            .await
            .get(&(conversation_id, user_id))
            .cloned())
    }

    async fn list(&self, conversation_id: Uuid) -> AppResult<Vec<ReadReceipt>> {
        let mut list: Vec<ReadReceipt> = self
            .receipts
            .read()
            .await
            .values()
            .filter(|r| r.conversation_id == conversation_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.last_read_seq.cmp(&a.last_read_seq));
        Ok(list)
    }
}

/// Per (conversation, user) read positions and the unread counts derived from them
pub struct ReadReceiptTracker {
    receipts: Arc<dyn ReceiptRepository>,
    store: Arc<MessageStore>,
}

impl ReadReceiptTracker {
    pub fn new(receipts: Arc<dyn ReceiptRepository>, store: Arc<MessageStore>) -> Self {
        Self { receipts, store }
    }

    /// Record a read position. Values above the conversation head are clamped
    /// to the head; values below the stored position leave it unchanged.
    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        last_read_seq: i64,
        last_read_message_id: Option<Uuid>,
    ) -> AppResult<ReadReceipt> {
        if last_read_seq < 0 {
            return Err(AppError::BadRequest(format!(
                "lastReadSeq must not be negative, got {last_read_seq}"
            )));
        }

        let head = self.store.current_seq(conversation_id).await?;
        let clamped = last_read_seq.min(head);
        if clamped != last_read_seq {
            tracing::debug!(
                %conversation_id,
                %user_id,
                requested = last_read_seq,
                head,
                "read position clamped to conversation head"
            );
        }

        let receipt = ReadReceipt {
            conversation_id,
            user_id,
            last_read_seq: clamped,
            // A clamped position no longer identifies the client's message
            last_read_message_id: if clamped == last_read_seq {
                last_read_message_id
            } else {
                None
            },
            read_at: Utc::now(),
        };

        self.receipts.upsert_monotonic(&receipt).await
    }

    pub async fn last_read_seq(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<i64> {
        Ok(self
            .receipts
            .find(conversation_id, user_id)
            .await?
            .map(|r| r.last_read_seq)
            .unwrap_or(0))
    }

    /// Normal messages from other users above the stored read position.
    pub async fn unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<i64> {
        let last_read = self.last_read_seq(conversation_id, user_id).await?;
        self.unread_count_since(conversation_id, user_id, last_read)
            .await
    }

    pub async fn unread_count_since(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        last_read_seq: i64,
    ) -> AppResult<i64> {
        self.store
            .count_unread(conversation_id, user_id, last_read_seq)
            .await
    }

    pub async fn receipts_for(&self, conversation_id: Uuid) -> AppResult<Vec<ReadReceipt>> {
        self.receipts.list(conversation_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentType, ConversationType, NewMessage};
    use crate::services::message_repository::InMemoryMessageRepository;
    use crate::services::sequencer::InMemorySequencer;

    fn setup() -> (Arc<MessageStore>, ReadReceiptTracker) {
        let store = Arc::new(MessageStore::new(
            Arc::new(InMemorySequencer::new()),
            Arc::new(InMemoryMessageRepository::new()),
            120,
        ));
        let tracker =
            ReadReceiptTracker::new(Arc::new(InMemoryReceiptRepository::new()), store.clone());
        (store, tracker)
    }

    async fn send(store: &MessageStore, conversation_id: Uuid, sender_id: Uuid) -> i64 {
        store
            .send(NewMessage {
                conversation_id,
                conversation_type: ConversationType::Single,
                sender_id,
                content_type: ContentType::Text,
                content: "hi".into(),
                reply_to: None,
                mentioned_users: Vec::new(),
                local_id: None,
            })
            .await
            .unwrap()
            .sequence
    }

    #[tokio::test]
    async fn test_unread_accounting() {
        let (store, tracker) = setup();
        let conversation = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        send(&store, conversation, alice).await;
        send(&store, conversation, alice).await;
        tracker.mark_read(conversation, bob, 1, None).await.unwrap();
        assert_eq!(tracker.unread_count(conversation, bob).await.unwrap(), 1);

        send(&store, conversation, alice).await;
        assert_eq!(tracker.unread_count(conversation, bob).await.unwrap(), 2);

        tracker.mark_read(conversation, bob, 3, None).await.unwrap();
        assert_eq!(tracker.unread_count(conversation, bob).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_own_messages_are_never_unread() {
        let (store, tracker) = setup();
        let conversation = Uuid::new_v4();
        let alice = Uuid::new_v4();

        send(&store, conversation, alice).await;
        send(&store, conversation, alice).await;
        assert_eq!(tracker.unread_count(conversation, alice).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_position_never_moves_backwards() {
        let (store, tracker) = setup();
        let conversation = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        for _ in 0..5 {
            send(&store, conversation, alice).await;
        }

        tracker.mark_read(conversation, bob, 4, None).await.unwrap();
        let stored = tracker.mark_read(conversation, bob, 2, None).await.unwrap();

        assert_eq!(stored.last_read_seq, 4);
        assert_eq!(tracker.last_read_seq(conversation, bob).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_mark_read_clamps_to_head_and_rejects_negative() {
        let (store, tracker) = setup();
        let conversation = Uuid::new_v4();
        let bob = Uuid::new_v4();
        send(&store, conversation, Uuid::new_v4()).await;

        let stored = tracker
            .mark_read(conversation, bob, 99, Some(Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(stored.last_read_seq, 1);
        assert!(stored.last_read_message_id.is_none());

        let err = tracker.mark_read(conversation, bob, -1, None).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_receipts_for_lists_every_reader() {
        let (store, tracker) = setup();
        let conversation = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let carol = Uuid::new_v4();
        send(&store, conversation, alice).await;
        send(&store, conversation, alice).await;

        tracker.mark_read(conversation, bob, 2, None).await.unwrap();
        tracker.mark_read(conversation, carol, 1, None).await.unwrap();

        let receipts = tracker.receipts_for(conversation).await.unwrap();
        let readers: Vec<(Uuid, i64)> = receipts
            .iter()
            .map(|r| (r.user_id, r.last_read_seq))
            .collect();
        assert_eq!(readers, vec![(bob, 2), (carol, 1)]);
    }
}
