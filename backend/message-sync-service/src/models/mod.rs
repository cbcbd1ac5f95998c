pub mod message;
pub mod receipt;
pub mod sync;

pub use message::{
    ContentType, ConversationType, GetMessagesQuery, GetMessagesResponse, Message, MessageStatus,
    NewMessage, SearchMessagesQuery, SearchQuery, SendMessageRequest, SendMessageResponse,
};
pub use receipt::{MarkAsReadRequest, ReadReceipt, UnreadCountQuery, UnreadCountResponse};
pub use sync::{
    ConversationCursor, ConversationDelta, FriendSummary, GroupSummary, SessionSummary,
    SyncMessagesRequest, SyncMessagesResponse, SyncRequest, SyncResponse,
};
