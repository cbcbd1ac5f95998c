//! RPC-facing message operations shared by the HTTP routes and the socket gateway.

use crate::error::{AppError, AppResult};
use crate::models::{
    ConversationType, GetMessagesQuery, GetMessagesResponse, MarkAsReadRequest, Message,
    NewMessage, ReadReceipt, SearchMessagesQuery, SearchQuery, SendMessageRequest,
    SendMessageResponse, UnreadCountResponse,
};
use crate::services::membership::MembershipDirectory;
use crate::services::message_store::MessageStore;
use crate::services::notifier::Notifier;
use crate::services::read_receipts::ReadReceiptTracker;
use notification_bus::{NotificationEnvelope, NotificationType, Priority};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const MAX_LOCAL_ID_LEN: usize = 64;
pub const MAX_MENTIONS: usize = 100;
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;
pub const DEFAULT_SEARCH_LIMIT: i64 = 20;
pub const MAX_SEARCH_LIMIT: i64 = 100;

pub struct MessageService {
    store: Arc<MessageStore>,
    receipts: Arc<ReadReceiptTracker>,
    membership: Arc<dyn MembershipDirectory>,
    notifier: Notifier,
    max_content_length: usize,
}

impl MessageService {
    pub fn new(
        store: Arc<MessageStore>,
        receipts: Arc<ReadReceiptTracker>,
        membership: Arc<dyn MembershipDirectory>,
        notifier: Notifier,
        max_content_length: usize,
    ) -> Self {
        Self {
            store,
            receipts,
            membership,
            notifier,
            max_content_length,
        }
    }

    async fn require_member(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<()> {
        if self.membership.is_member(conversation_id, user_id).await? {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "not a member of conversation {conversation_id}"
            )))
        }
    }

    fn validate_send(&self, req: &SendMessageRequest) -> AppResult<()> {
        if req.content.trim().is_empty() {
            return Err(AppError::BadRequest("content is empty".into()));
        }
        if req.content.len() > self.max_content_length {
            return Err(AppError::BadRequest(format!(
                "content exceeds {} bytes",
                self.max_content_length
            )));
        }
        if req
            .local_id
            .as_ref()
            .is_some_and(|id| id.len() > MAX_LOCAL_ID_LEN)
        {
            return Err(AppError::BadRequest(format!(
                "localId exceeds {MAX_LOCAL_ID_LEN} characters"
            )));
        }
        if req.at_users.len() > MAX_MENTIONS {
            return Err(AppError::BadRequest(format!(
                "at most {MAX_MENTIONS} users can be mentioned"
            )));
        }
        Ok(())
    }

    /// Deliver one envelope to everyone in the conversation except `exclude`.
    async fn fan_out(
        &self,
        conversation_type: ConversationType,
        conversation_id: Uuid,
        members: &[Uuid],
        exclude: Uuid,
        envelope: &NotificationEnvelope,
    ) {
        match conversation_type {
            ConversationType::Single => {
                let recipients: Vec<Uuid> =
                    members.iter().copied().filter(|m| *m != exclude).collect();
                self.notifier.notify_users(&recipients, envelope).await;
            }
            ConversationType::Group => self.notifier.notify_group(conversation_id, envelope).await,
        }
    }

    pub async fn send_message(
        &self,
        sender_id: Uuid,
        req: SendMessageRequest,
    ) -> AppResult<SendMessageResponse> {
        self.validate_send(&req)?;

        let members = self.membership.members(req.conversation_id).await?;
        if !members.contains(&sender_id) {
            return Err(AppError::Forbidden(format!(
                "not a member of conversation {}",
                req.conversation_id
            )));
        }

        let mut mentioned_users = req.at_users.clone();
        mentioned_users.sort_unstable();
        mentioned_users.dedup();
        if let Some(outsider) = mentioned_users.iter().find(|u| !members.contains(*u)) {
            return Err(AppError::BadRequest(format!(
                "mentioned user {outsider} is not a member of the conversation"
            )));
        }

        if let Some(reply_to) = req.reply_to {
            let parent = match self.store.get_by_id(reply_to).await {
                Ok(parent) => parent,
                Err(AppError::NotFound(_)) => {
                    return Err(AppError::BadRequest(format!(
                        "replyTo message {reply_to} does not exist"
                    )))
                }
                Err(e) => return Err(e),
            };
            if parent.conversation_id != req.conversation_id {
                return Err(AppError::BadRequest(
                    "replyTo message belongs to another conversation".into(),
                ));
            }
        }

        let message = self
            .store
            .send(NewMessage {
                conversation_id: req.conversation_id,
                conversation_type: req.conversation_type,
                sender_id,
                content_type: req.content_type,
                content: req.content,
                reply_to: req.reply_to,
                mentioned_users,
                local_id: req.local_id,
            })
            .await?;

        info!(
            message_id = %message.id,
            conversation_id = %message.conversation_id,
            sequence = message.sequence,
            "message stored"
        );

        let priority = if message.mentioned_users.is_empty() {
            Priority::Normal
        } else {
            Priority::High
        };
        let envelope = NotificationEnvelope::new(NotificationType::MessageNew, json!(message))
            .from_user(sender_id)
            .with_priority(priority);
        self.fan_out(
            message.conversation_type,
            message.conversation_id,
            &members,
            sender_id,
            &envelope,
        )
        .await;

        Ok(SendMessageResponse {
            message_id: message.id,
            sequence: message.sequence,
            timestamp: message.created_at.timestamp_millis(),
            local_id: message.local_id,
        })
    }

    pub async fn get_messages(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        query: GetMessagesQuery,
    ) -> AppResult<GetMessagesResponse> {
        self.require_member(conversation_id, user_id).await?;

        let start_seq = query.start_seq.unwrap_or(1);
        if start_seq < 0 {
            return Err(AppError::BadRequest("startSeq must not be negative".into()));
        }
        if let Some(end_seq) = query.end_seq {
            if end_seq < start_seq {
                return Err(AppError::BadRequest(
                    "endSeq must not be smaller than startSeq".into(),
                ));
            }
        }
        let limit = query
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let mut messages = self
            .store
            .get_range(conversation_id, start_seq, query.end_seq, limit + 1, query.reverse)
            .await?;
        let has_more = messages.len() as i64 > limit;
        messages.truncate(limit as usize);

        let total = self
            .store
            .count_range(conversation_id, start_seq, query.end_seq)
            .await?;

        Ok(GetMessagesResponse {
            messages,
            total,
            has_more,
        })
    }

    /// Members to address individually for a notification. A failed lookup
    /// only costs the notification; the caller's write has already committed.
    async fn fan_out_members(
        &self,
        conversation_type: ConversationType,
        conversation_id: Uuid,
    ) -> Vec<Uuid> {
        if conversation_type == ConversationType::Group {
            return Vec::new();
        }
        match self.membership.members(conversation_id).await {
            Ok(members) => members,
            Err(e) => {
                warn!(
                    %conversation_id,
                    error = %e,
                    "membership lookup failed, notification skipped"
                );
                Vec::new()
            }
        }
    }

    async fn announce_transition(
        &self,
        message: &Message,
        user_id: Uuid,
        notification_type: NotificationType,
    ) {
        let members = self
            .fan_out_members(message.conversation_type, message.conversation_id)
            .await;
        let envelope = NotificationEnvelope::new(
            notification_type,
            json!({
                "messageId": message.id,
                "conversationId": message.conversation_id,
                "sequence": message.sequence,
            }),
        )
        .from_user(user_id);

        self.fan_out(
            message.conversation_type,
            message.conversation_id,
            &members,
            user_id,
            &envelope,
        )
        .await;
    }

    pub async fn recall_message(&self, user_id: Uuid, message_id: Uuid) -> AppResult<()> {
        let message = self.store.recall(message_id, user_id).await?;
        self.announce_transition(&message, user_id, NotificationType::MessageRecalled)
            .await;
        Ok(())
    }

    pub async fn delete_message(&self, user_id: Uuid, message_id: Uuid) -> AppResult<()> {
        let message = self.store.delete(message_id, user_id).await?;
        self.announce_transition(&message, user_id, NotificationType::MessageDeleted)
            .await;
        Ok(())
    }

    pub async fn mark_as_read(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        req: MarkAsReadRequest,
    ) -> AppResult<ReadReceipt> {
        self.require_member(conversation_id, user_id).await?;

        let receipt = self
            .receipts
            .mark_read(
                conversation_id,
                user_id,
                req.last_read_seq,
                req.last_read_message_id,
            )
            .await?;

        let envelope = NotificationEnvelope::new(
            NotificationType::ConversationRead,
            json!({
                "conversationId": conversation_id,
                "userId": user_id,
                "lastReadSeq": receipt.last_read_seq,
            }),
        )
        .from_user(user_id)
        .with_priority(Priority::Low);

        let members = self
            .fan_out_members(req.conversation_type, conversation_id)
            .await;
        self.fan_out(
            req.conversation_type,
            conversation_id,
            &members,
            user_id,
            &envelope,
        )
        .await;
        // The reader's other devices clear their badges too
        self.notifier.notify_user(user_id, &envelope).await;

        Ok(receipt)
    }

    pub async fn get_unread_count(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        last_read_seq: Option<i64>,
    ) -> AppResult<UnreadCountResponse> {
        self.require_member(conversation_id, user_id).await?;

        let unread_count = match last_read_seq {
            Some(seq) if seq < 0 => {
                return Err(AppError::BadRequest("lastReadSeq must not be negative".into()))
            }
            Some(seq) => {
                self.receipts
                    .unread_count_since(conversation_id, user_id, seq)
                    .await?
            }
            None => self.receipts.unread_count(conversation_id, user_id).await?,
        };

        let last_message_seq = self.store.current_seq(conversation_id).await?;
        let last_message = self
            .store
            .get_latest(conversation_id, 1)
            .await?
            .into_iter()
            .next();

        Ok(UnreadCountResponse {
            unread_count,
            last_message_seq,
            last_message,
        })
    }

    pub async fn receipts(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<Vec<ReadReceipt>> {
        self.require_member(conversation_id, user_id).await?;
        self.receipts.receipts_for(conversation_id).await
    }

    pub async fn search(
        &self,
        user_id: Uuid,
        query: SearchMessagesQuery,
    ) -> AppResult<Vec<Message>> {
        self.require_member(query.conversation_id, user_id).await?;

        let offset = query.offset.unwrap_or(0);
        if offset < 0 {
            return Err(AppError::BadRequest("offset must not be negative".into()));
        }

        self.store
            .search(SearchQuery {
                keyword: query.keyword,
                conversation_id: Some(query.conversation_id),
                content_type: query.content_type,
                limit: query
                    .limit
                    .unwrap_or(DEFAULT_SEARCH_LIMIT)
                    .clamp(1, MAX_SEARCH_LIMIT),
                offset,
            })
            .await
    }
}
