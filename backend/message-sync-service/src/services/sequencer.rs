//! Per-conversation sequence counters.
//!
//! The sequencer is the only source of message ordering. `next` is a single
//! indivisible increment-and-return; a sequence handed out for a message whose
//! write later fails stays consumed, leaving a gap rather than a duplicate.

use crate::error::AppResult;
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[async_trait]
pub trait Sequencer: Send + Sync {
    /// Reserve the next sequence for a conversation (first call returns 1).
    async fn next(&self, conversation_id: Uuid) -> AppResult<i64>;

    /// Highest sequence handed out so far, 0 when none.
    async fn current(&self, conversation_id: Uuid) -> AppResult<i64>;
}

pub struct PgSequencer {
    pool: PgPool,
}

impl PgSequencer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Sequencer for PgSequencer {
    async fn next(&self, conversation_id: Uuid) -> AppResult<i64> {
        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO conversation_sequences (conversation_id, current_seq)
            VALUES ($1, 1)
            ON CONFLICT (conversation_id)
            DO UPDATE SET current_seq = conversation_sequences.current_seq + 1,
                          updated_at = NOW()
            RETURNING current_seq
            "#,
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(seq)
    }

    async fn current(&self, conversation_id: Uuid) -> AppResult<i64> {
        let seq: Option<i64> = sqlx::query_scalar(
            "SELECT current_seq FROM conversation_sequences WHERE conversation_id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(seq.unwrap_or(0))
    }
}

#[derive(Default)]
pub struct InMemorySequencer {
    counters: Mutex<HashMap<Uuid, i64>>,
}

impl InMemorySequencer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Sequencer for InMemorySequencer {
    async fn next(&self, conversation_id: Uuid) -> AppResult<i64> {
        let mut counters = self.counters.lock().await;
        let seq = counters.entry(conversation_id).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    async fn current(&self, conversation_id: Uuid) -> AppResult<i64> {
        Ok(self
            .counters
            .lock()
            .await
            .get(&conversation_id)
            .copied()
            .unwrap_or(0))
    }
}
