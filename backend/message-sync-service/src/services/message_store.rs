use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{Message, MessageStatus, NewMessage, SearchQuery};
use crate::services::message_repository::{MessageRepository, SeqRange};
use crate::services::sequencer::Sequencer;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_RECALL_WINDOW_SECS: i64 = 120;

/// Owns message rows and their lifecycle transitions.
///
/// `send` is the only writer of new rows; it takes the sequence from the
/// sequencer before persisting.
pub struct MessageStore {
    sequencer: Arc<dyn Sequencer>,
    repo: Arc<dyn MessageRepository>,
    recall_window: Duration,
}

impl MessageStore {
    pub fn new(
        sequencer: Arc<dyn Sequencer>,
        repo: Arc<dyn MessageRepository>,
        recall_window_secs: i64,
    ) -> Self {
        Self {
            sequencer,
            repo,
            recall_window: Duration::seconds(
                recall_window_secs.clamp(0, crate::config::MAX_RECALL_WINDOW_SECS),
            ),
        }
    }

    pub async fn send(&self, new: NewMessage) -> AppResult<Message> {
        let sequence = self.sequencer.next(new.conversation_id).await?;
        let now = Utc::now();

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: new.conversation_id,
            conversation_type: new.conversation_type,
            sender_id: new.sender_id,
            content_type: new.content_type,
            content: new.content,
            sequence,
            status: MessageStatus::Normal,
            reply_to: new.reply_to,
            mentioned_users: new.mentioned_users,
            local_id: new.local_id,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.repo.insert(&message).await {
            warn!(
                conversation_id = %message.conversation_id,
                sequence,
                error = %e,
                "message write failed after sequencing, sequence left unused"
            );
            return Err(e);
        }

        metrics::MESSAGES_SENT_TOTAL
            .with_label_values(&[message.conversation_type.as_str()])
            .inc();

        Ok(message)
    }

    /// Any status; callers decide whether recalled or deleted rows are visible.
    pub async fn get_by_id(&self, message_id: Uuid) -> AppResult<Message> {
        self.repo
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("message {message_id}")))
    }

    /// Normal messages with `start_seq <= sequence <= end_seq`, ordered by sequence.
    pub async fn get_range(
        &self,
        conversation_id: Uuid,
        start_seq: i64,
        end_seq: Option<i64>,
        limit: i64,
        reverse: bool,
    ) -> AppResult<Vec<Message>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }
        let range = SeqRange {
            start: start_seq.max(1),
            end: end_seq,
        };
        self.repo
            .fetch_range(conversation_id, range, limit, reverse)
            .await
    }

    /// Newest normal messages first.
    pub async fn get_latest(&self, conversation_id: Uuid, limit: i64) -> AppResult<Vec<Message>> {
        self.get_range(conversation_id, 1, None, limit, true).await
    }

    pub async fn count_range(
        &self,
        conversation_id: Uuid,
        start_seq: i64,
        end_seq: Option<i64>,
    ) -> AppResult<i64> {
        let range = SeqRange {
            start: start_seq.max(1),
            end: end_seq,
        };
        self.repo.count_range(conversation_id, range).await
    }

    pub async fn count_unread(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        after_seq: i64,
    ) -> AppResult<i64> {
        self.repo
            .count_unread(conversation_id, user_id, after_seq.max(0))
            .await
    }

    pub async fn current_seq(&self, conversation_id: Uuid) -> AppResult<i64> {
        self.sequencer.current(conversation_id).await
    }

    /// Sender-only, within the recall window.
    pub async fn recall(&self, message_id: Uuid, user_id: Uuid) -> AppResult<Message> {
        let message = self.get_by_id(message_id).await?;

        // Status is only revealed to the sender
        if message.sender_id != user_id {
            return Err(AppError::Forbidden(
                "only the sender can recall a message".into(),
            ));
        }

        match message.status {
            MessageStatus::Deleted => {
                return Err(AppError::NotFound(format!("message {message_id}")))
            }
            MessageStatus::Recalled => return Err(AppError::AlreadyRecalled),
            MessageStatus::Normal => {}
        }

        if Utc::now() - message.created_at >= self.recall_window {
            return Err(AppError::RecallWindowExpired {
                created_at: message.created_at,
                window_secs: self.recall_window.num_seconds(),
            });
        }

        let recalled = self
            .repo
            .transition_status(message_id, MessageStatus::Normal, MessageStatus::Recalled)
            .await?
            .ok_or(AppError::StatusConflict)?;

        metrics::MESSAGE_TRANSITIONS_TOTAL
            .with_label_values(&[MessageStatus::Recalled.as_str()])
            .inc();
        info!(%message_id, conversation_id = %recalled.conversation_id, "message recalled");

        Ok(recalled)
    }

    /// Sender-only soft delete. Deleting an already deleted message is a no-op.
    pub async fn delete(&self, message_id: Uuid, user_id: Uuid) -> AppResult<Message> {
        let message = self.get_by_id(message_id).await?;

        if message.sender_id != user_id {
            return Err(AppError::Forbidden(
                "only the sender can delete a message".into(),
            ));
        }

        if message.status == MessageStatus::Deleted {
            return Ok(message);
        }

        let deleted = match self
            .repo
            .transition_status(message_id, message.status, MessageStatus::Deleted)
            .await?
        {
            Some(m) => m,
            None => {
                // Status moved underneath us; retry once from the new status
                let current = self.get_by_id(message_id).await?;
                if current.status == MessageStatus::Deleted {
                    return Ok(current);
                }
                self.repo
                    .transition_status(message_id, current.status, MessageStatus::Deleted)
                    .await?
                    .ok_or(AppError::StatusConflict)?
            }
        };

        metrics::MESSAGE_TRANSITIONS_TOTAL
            .with_label_values(&[MessageStatus::Deleted.as_str()])
            .inc();

        Ok(deleted)
    }

    /// Case-insensitive substring scan over normal messages.
    pub async fn search(&self, query: SearchQuery) -> AppResult<Vec<Message>> {
        if query.keyword.trim().is_empty() {
            return Err(AppError::BadRequest("search keyword is empty".into()));
        }
        self.repo.search(&query).await
    }
}
