//! Message persistence backends.

use crate::error::{AppError, AppResult};
use crate::models::{ContentType, ConversationType, Message, MessageStatus, SearchQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Inclusive sequence range; `end: None` is open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqRange {
    pub start: i64,
    pub end: Option<i64>,
}

impl SeqRange {
    pub fn from(start: i64) -> Self {
        Self { start, end: None }
    }

    pub fn between(start: i64, end: i64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    fn contains(&self, seq: i64) -> bool {
        seq >= self.start && self.end.map_or(true, |end| seq <= end)
    }
}

/// Storage operations behind `MessageStore`.
///
/// Range, count and search reads only ever see `normal` messages.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: &Message) -> AppResult<()>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Message>>;

    /// Move a message from `from` to `to`; `None` when its status is no longer `from`.
    async fn transition_status(
        &self,
        id: Uuid,
        from: MessageStatus,
        to: MessageStatus,
    ) -> AppResult<Option<Message>>;

    async fn fetch_range(
        &self,
        conversation_id: Uuid,
        range: SeqRange,
        limit: i64,
        reverse: bool,
    ) -> AppResult<Vec<Message>>;

    async fn count_range(&self, conversation_id: Uuid, range: SeqRange) -> AppResult<i64>;

    /// Messages from users other than `user_id` with sequence above `after_seq`.
    async fn count_unread(&self, conversation_id: Uuid, user_id: Uuid, after_seq: i64)
        -> AppResult<i64>;

    async fn search(&self, query: &SearchQuery) -> AppResult<Vec<Message>>;
}

// ==================== PostgreSQL ====================

const MESSAGE_COLUMNS: &str = "id, conversation_id, conversation_type, sender_id, content_type, \
     content, sequence_number, status, reply_to, mentioned_users, local_id, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    conversation_type: String,
    sender_id: Uuid,
    content_type: String,
    content: String,
    sequence_number: i64,
    status: String,
    reply_to: Option<Uuid>,
    mentioned_users: Vec<Uuid>,
    local_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = AppError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let invalid = |column: &str, value: &str| {
            AppError::Database(format!("invalid {column} in messages row {}: {value}", row.id))
        };

        Ok(Message {
            id: row.id,
            conversation_id: row.conversation_id,
            conversation_type: ConversationType::from_db(&row.conversation_type)
                .ok_or_else(|| invalid("conversation_type", &row.conversation_type))?,
            sender_id: row.sender_id,
            content_type: ContentType::from_db(&row.content_type)
                .ok_or_else(|| invalid("content_type", &row.content_type))?,
            content: row.content.clone(),
            sequence: row.sequence_number,
            status: MessageStatus::from_db(&row.status)
                .ok_or_else(|| invalid("status", &row.status))?,
            reply_to: row.reply_to,
            mentioned_users: row.mentioned_users.clone(),
            local_id: row.local_id.clone(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn rows_to_messages(rows: Vec<MessageRow>) -> AppResult<Vec<Message>> {
    rows.into_iter().map(Message::try_from).collect()
}

/// Escape LIKE metacharacters so keywords match literally.
fn escape_like(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn insert(&self, message: &Message) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (
                id, conversation_id, conversation_type, sender_id, content_type, content,
                sequence_number, status, reply_to, mentioned_users, local_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.conversation_type.as_str())
        .bind(message.sender_id)
        .bind(message.content_type.as_str())
        .bind(&message.content)
        .bind(message.sequence)
        .bind(message.status.as_str())
        .bind(message.reply_to)
        .bind(&message.mentioned_users)
        .bind(&message.local_id)
        .bind(message.created_at)
        .bind(message.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Message::try_from).transpose()
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: MessageStatus,
        to: MessageStatus,
    ) -> AppResult<Option<Message>> {
        let sql = format!(
            "UPDATE messages SET status = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $2 RETURNING {MESSAGE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Message::try_from).transpose()
    }

    async fn fetch_range(
        &self,
        conversation_id: Uuid,
        range: SeqRange,
        limit: i64,
        reverse: bool,
    ) -> AppResult<Vec<Message>> {
        let order = if reverse { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 AND status = 'normal' \
               AND sequence_number >= $2 \
               AND ($3::BIGINT IS NULL OR sequence_number <= $3) \
             ORDER BY sequence_number {order} \
             LIMIT $4"
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(conversation_id)
            .bind(range.start)
            .bind(range.end)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows_to_messages(rows)
    }

    async fn count_range(&self, conversation_id: Uuid, range: SeqRange) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE conversation_id = $1 AND status = 'normal'
              AND sequence_number >= $2
              AND ($3::BIGINT IS NULL OR sequence_number <= $3)
            "#,
        )
        .bind(conversation_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn count_unread(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        after_seq: i64,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE conversation_id = $1 AND status = 'normal'
              AND sender_id <> $2
              AND sequence_number > $3
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(after_seq)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn search(&self, query: &SearchQuery) -> AppResult<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE status = 'normal' \
               AND content ILIKE '%' || $1 || '%' \
               AND ($2::UUID IS NULL OR conversation_id = $2) \
               AND ($3::TEXT IS NULL OR content_type = $3) \
             ORDER BY created_at DESC \
             LIMIT $4 OFFSET $5"
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(escape_like(&query.keyword))
            .bind(query.conversation_id)
            .bind(query.content_type.map(|c| c.as_str()))
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?;

        rows_to_messages(rows)
    }
}

// ==================== In-memory ====================

#[derive(Default)]
struct MemoryTables {
    by_id: HashMap<Uuid, Message>,
    by_conversation: HashMap<Uuid, BTreeMap<i64, Uuid>>,
}

impl MemoryTables {
    fn visible_in(&self, conversation_id: Uuid, range: SeqRange) -> Vec<&Message> {
        self.by_conversation
            .get(&conversation_id)
            .map(|index| {
                index
                    .iter()
                    .filter(|(seq, _)| range.contains(**seq))
                    .filter_map(|(_, id)| self.by_id.get(id))
                    .filter(|m| m.is_visible())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    tables: RwLock<MemoryTables>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, message: &Message) -> AppResult<()> {
        let mut tables = self.tables.write().await;

        let index = tables.by_conversation.entry(message.conversation_id).or_default();
        if index.contains_key(&message.sequence) {
            return Err(AppError::Database(format!(
                "duplicate sequence {} in conversation {}",
                message.sequence, message.conversation_id
            )));
        }
        index.insert(message.sequence, message.id);
        tables.by_id.insert(message.id, message.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Message>> {
        Ok(self.tables.read().await.by_id.get(&id).cloned())
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: MessageStatus,
        to: MessageStatus,
    ) -> AppResult<Option<Message>> {
        let mut tables = self.tables.write().await;
        match tables.by_id.get_mut(&id) {
            Some(message) if message.status == from => {
                message.status = to;
                message.updated_at = Utc::now();
                Ok(Some(message.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn fetch_range(
        &self,
        conversation_id: Uuid,
        range: SeqRange,
        limit: i64,
        reverse: bool,
    ) -> AppResult<Vec<Message>> {
        let tables = self.tables.read().await;
        let mut visible = tables.visible_in(conversation_id, range);
        if reverse {
            visible.reverse();
        }

        Ok(visible
            .into_iter()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_range(&self, conversation_id: Uuid, range: SeqRange) -> AppResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables.visible_in(conversation_id, range).len() as i64)
    }

    async fn count_unread(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        after_seq: i64,
    ) -> AppResult<i64> {
        let tables = self.tables.read().await;
        let count = tables
            .visible_in(conversation_id, SeqRange::from(after_seq.saturating_add(1)))
            .into_iter()
            .filter(|m| m.sender_id != user_id)
            .count();
        Ok(count as i64)
    }

    async fn search(&self, query: &SearchQuery) -> AppResult<Vec<Message>> {
        let needle = query.keyword.to_lowercase();
        let tables = self.tables.read().await;

        let mut hits: Vec<&Message> = tables
            .by_id
            .values()
            .filter(|m| m.is_visible())
            .filter(|m| query.conversation_id.map_or(true, |c| m.conversation_id == c))
            .filter(|m| query.content_type.map_or(true, |t| m.content_type == t))
            .filter(|m| m.content.to_lowercase().contains(&needle))
            .collect();
        hits.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.sequence.cmp(&a.sequence))
        });

        Ok(hits
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
