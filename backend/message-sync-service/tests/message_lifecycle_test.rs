mod common;

use common::{test_config, text, BrokenPublisher, FlakyMembership, TestApp};
use message_sync_service::error::AppError;
use message_sync_service::models::{
    ConversationType, GetMessagesQuery, MarkAsReadRequest, MessageStatus,
};
use message_sync_service::services::{InMemoryMembershipDirectory, SyncDomains};
use message_sync_service::state::{AppState, Backends};
use notification_bus::{NotificationSubscriber, NotificationType, Target};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_concurrent_sends_get_contiguous_sequences() {
    let app = TestApp::new();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let conversation = app.conversation(&[alice, bob]).await;

    let sends = (0..40).map(|i| {
        let state = app.state.clone();
        let sender = if i % 2 == 0 { alice } else { bob };
        tokio::spawn(async move {
            state
                .messages
                .send_message(sender, text(conversation, ConversationType::Single, &format!("m{i}")))
                .await
                .unwrap()
                .sequence
        })
    });

    let mut sequences = Vec::new();
    for handle in sends {
        sequences.push(handle.await.unwrap());
    }
    sequences.sort_unstable();

    assert_eq!(sequences, (1..=40).collect::<Vec<i64>>());
}

#[tokio::test]
async fn test_send_rejects_non_member_and_bad_mentions() {
    let app = TestApp::new();
    let (alice, bob, mallory) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let conversation = app.conversation(&[alice, bob]).await;

    let err = app
        .state
        .messages
        .send_message(mallory, text(conversation, ConversationType::Single, "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let mut req = text(conversation, ConversationType::Single, "hi @mallory");
    req.at_users = vec![mallory];
    let err = app.state.messages.send_message(alice, req).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = app
        .state
        .messages
        .send_message(alice, text(conversation, ConversationType::Single, "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_reply_must_stay_in_conversation() {
    let app = TestApp::new();
    let alice = Uuid::new_v4();
    let first = app.conversation(&[alice]).await;
    let second = app.conversation(&[alice]).await;

    let parent = app
        .state
        .messages
        .send_message(alice, text(first, ConversationType::Group, "parent"))
        .await
        .unwrap();

    let mut reply = text(second, ConversationType::Group, "reply");
    reply.reply_to = Some(parent.message_id);
    let err = app.state.messages.send_message(alice, reply).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let mut reply = text(first, ConversationType::Group, "reply");
    reply.reply_to = Some(parent.message_id);
    let sent = app.state.messages.send_message(alice, reply).await.unwrap();
    assert_eq!(sent.sequence, 2);
}

#[tokio::test]
async fn test_get_messages_pages_in_both_directions() {
    let app = TestApp::new();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let conversation = app.conversation(&[alice, bob]).await;

    for i in 1..=5 {
        app.state
            .messages
            .send_message(alice, text(conversation, ConversationType::Single, &format!("m{i}")))
            .await
            .unwrap();
    }

    let page = app
        .state
        .messages
        .get_messages(
            bob,
            conversation,
            GetMessagesQuery {
                start_seq: Some(1),
                end_seq: Some(2),
                limit: None,
                reverse: false,
            },
        )
        .await
        .unwrap();
    let contents: Vec<&str> = page.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["m1", "m2"]);
    assert_eq!(page.total, 2);
    assert!(!page.has_more);

    let page = app
        .state
        .messages
        .get_messages(
            bob,
            conversation,
            GetMessagesQuery {
                start_seq: Some(1),
                end_seq: Some(2),
                limit: None,
                reverse: true,
            },
        )
        .await
        .unwrap();
    let contents: Vec<&str> = page.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["m2", "m1"]);

    let page = app
        .state
        .messages
        .get_messages(
            bob,
            conversation,
            GetMessagesQuery {
                limit: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 3);
    assert_eq!(page.total, 5);
    assert!(page.has_more);

    let err = app
        .state
        .messages
        .get_messages(Uuid::new_v4(), conversation, GetMessagesQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_recall_hides_message_from_history() {
    let app = TestApp::new();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let conversation = app.conversation(&[alice, bob]).await;

    let first = app
        .state
        .messages
        .send_message(alice, text(conversation, ConversationType::Single, "oops"))
        .await
        .unwrap();
    app.state
        .messages
        .send_message(alice, text(conversation, ConversationType::Single, "fine"))
        .await
        .unwrap();

    let err = app
        .state
        .messages
        .recall_message(bob, first.message_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    app.state
        .messages
        .recall_message(alice, first.message_id)
        .await
        .unwrap();

    let page = app
        .state
        .messages
        .get_messages(bob, conversation, GetMessagesQuery::default())
        .await
        .unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].content, "fine");

    let recalled = app.state.store.get_by_id(first.message_id).await.unwrap();
    assert_eq!(recalled.status, MessageStatus::Recalled);

    let err = app
        .state
        .messages
        .recall_message(alice, first.message_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyRecalled));
}

#[tokio::test]
async fn test_recall_after_window_is_rejected() {
    let app = TestApp::with(
        test_config(&[("RECALL_WINDOW_SECS", "0")]),
        SyncDomains::default(),
    );
    let alice = Uuid::new_v4();
    let conversation = app.conversation(&[alice]).await;

    let sent = app
        .state
        .messages
        .send_message(alice, text(conversation, ConversationType::Group, "too late"))
        .await
        .unwrap();

    let err = app
        .state
        .messages
        .recall_message(alice, sent.message_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::RecallWindowExpired { .. }));
    assert_eq!(err.kind(), error_types::ErrorKind::TimeLimitExceeded);
}

#[tokio::test]
async fn test_delete_is_sender_only_and_idempotent() {
    let app = TestApp::new();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let conversation = app.conversation(&[alice, bob]).await;

    let sent = app
        .state
        .messages
        .send_message(alice, text(conversation, ConversationType::Single, "bye"))
        .await
        .unwrap();

    assert!(app
        .state
        .messages
        .delete_message(bob, sent.message_id)
        .await
        .is_err());
    app.state
        .messages
        .delete_message(alice, sent.message_id)
        .await
        .unwrap();
    app.state
        .messages
        .delete_message(alice, sent.message_id)
        .await
        .unwrap();

    let err = app
        .state
        .messages
        .recall_message(alice, sent.message_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_unread_accounting() {
    let app = TestApp::new();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let conversation = app.conversation(&[alice, bob]).await;
    let send = |content: &'static str| {
        let state = app.state.clone();
        async move {
            state
                .messages
                .send_message(alice, text(conversation, ConversationType::Single, content))
                .await
                .unwrap()
        }
    };
    let read = |seq: i64| MarkAsReadRequest {
        conversation_type: ConversationType::Single,
        last_read_seq: seq,
        last_read_message_id: None,
    };

    send("m1").await;
    send("m2").await;
    app.state.messages.mark_as_read(bob, conversation, read(1)).await.unwrap();
    let unread = app
        .state
        .messages
        .get_unread_count(bob, conversation, None)
        .await
        .unwrap();
    assert_eq!(unread.unread_count, 1);
    assert_eq!(unread.last_message_seq, 2);

    send("m3").await;
    let unread = app
        .state
        .messages
        .get_unread_count(bob, conversation, None)
        .await
        .unwrap();
    assert_eq!(unread.unread_count, 2);
    assert_eq!(unread.last_message.unwrap().content, "m3");

    // Explicit position overrides the stored receipt
    let unread = app
        .state
        .messages
        .get_unread_count(bob, conversation, Some(0))
        .await
        .unwrap();
    assert_eq!(unread.unread_count, 3);

    app.state.messages.mark_as_read(bob, conversation, read(3)).await.unwrap();
    // Going backwards never regresses the receipt
    let receipt = app.state.messages.mark_as_read(bob, conversation, read(1)).await.unwrap();
    assert_eq!(receipt.last_read_seq, 3);

    let unread = app
        .state
        .messages
        .get_unread_count(bob, conversation, None)
        .await
        .unwrap();
    assert_eq!(unread.unread_count, 0);
}

#[tokio::test]
async fn test_single_conversation_notifies_other_member() {
    let app = TestApp::new();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let conversation = app.conversation(&[alice, bob]).await;
    let mut subscription = app.state.subscriber.subscribe(16).await.unwrap();

    app.state
        .messages
        .send_message(alice, text(conversation, ConversationType::Single, "ping"))
        .await
        .unwrap();

    let delivery = tokio::time::timeout(Duration::from_secs(1), subscription.deliveries.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.target, Target::User(bob));
    assert_eq!(delivery.envelope.notification_type, NotificationType::MessageNew);
    assert_eq!(delivery.envelope.from_user_id, Some(alice));
    assert_eq!(delivery.envelope.payload["content"], "ping");

    // Nothing is addressed to the sender
    assert!(subscription.deliveries.try_recv().is_err());
}

#[tokio::test]
async fn test_group_mark_read_reaches_group_and_reader() {
    let app = TestApp::new();
    let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let group = app.conversation(&[alice, bob, carol]).await;
    app.state
        .messages
        .send_message(alice, text(group, ConversationType::Group, "hello all"))
        .await
        .unwrap();

    let mut subscription = app.state.subscriber.subscribe(16).await.unwrap();
    app.state
        .messages
        .mark_as_read(
            bob,
            group,
            MarkAsReadRequest {
                conversation_type: ConversationType::Group,
                last_read_seq: 1,
                last_read_message_id: None,
            },
        )
        .await
        .unwrap();

    let mut targets = HashSet::new();
    for _ in 0..2 {
        let delivery = tokio::time::timeout(Duration::from_secs(1), subscription.deliveries.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            delivery.envelope.notification_type,
            NotificationType::ConversationRead
        );
        targets.insert(delivery.target);
    }
    assert_eq!(
        targets,
        HashSet::from([Target::Group(group), Target::User(bob)])
    );
}

#[tokio::test]
async fn test_rpcs_succeed_when_publishing_fails() {
    let app = TestApp::with_backends(test_config(&[]), |backends| {
        backends.publisher = Arc::new(BrokenPublisher);
    });
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let conversation = app.conversation(&[alice, bob]).await;

    let recalled = app
        .state
        .messages
        .send_message(alice, text(conversation, ConversationType::Single, "first"))
        .await
        .unwrap();
    let deleted = app
        .state
        .messages
        .send_message(alice, text(conversation, ConversationType::Single, "second"))
        .await
        .unwrap();

    app.state
        .messages
        .recall_message(alice, recalled.message_id)
        .await
        .unwrap();
    app.state
        .messages
        .delete_message(alice, deleted.message_id)
        .await
        .unwrap();
    let receipt = app
        .state
        .messages
        .mark_as_read(
            bob,
            conversation,
            MarkAsReadRequest {
                conversation_type: ConversationType::Single,
                last_read_seq: 2,
                last_read_message_id: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(receipt.last_read_seq, 2);
    assert_eq!(
        app.state.store.get_by_id(recalled.message_id).await.unwrap().status,
        MessageStatus::Recalled
    );
    assert_eq!(
        app.state.store.get_by_id(deleted.message_id).await.unwrap().status,
        MessageStatus::Deleted
    );
    assert_eq!(app.state.receipts.last_read_seq(conversation, bob).await.unwrap(), 2);
}

#[tokio::test]
async fn test_committed_writes_survive_membership_lookup_failure() {
    let membership = Arc::new(FlakyMembership::new(Arc::new(
        InMemoryMembershipDirectory::new(),
    )));
    let directory = membership.clone();
    let app = TestApp::with_backends(test_config(&[]), move |backends| {
        backends.membership = directory;
    });
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let conversation = Uuid::new_v4();
    membership.inner.set_members(conversation, [alice, bob]).await;

    let first = app
        .state
        .messages
        .send_message(alice, text(conversation, ConversationType::Single, "first"))
        .await
        .unwrap();
    let second = app
        .state
        .messages
        .send_message(alice, text(conversation, ConversationType::Single, "second"))
        .await
        .unwrap();

    membership.break_lookups();

    app.state
        .messages
        .recall_message(alice, first.message_id)
        .await
        .unwrap();
    app.state
        .messages
        .delete_message(alice, second.message_id)
        .await
        .unwrap();
    app.state
        .messages
        .mark_as_read(
            bob,
            conversation,
            MarkAsReadRequest {
                conversation_type: ConversationType::Single,
                last_read_seq: 2,
                last_read_message_id: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(
        app.state.store.get_by_id(first.message_id).await.unwrap().status,
        MessageStatus::Recalled
    );
    assert_eq!(
        app.state.store.get_by_id(second.message_id).await.unwrap().status,
        MessageStatus::Deleted
    );
    assert_eq!(app.state.receipts.last_read_seq(conversation, bob).await.unwrap(), 2);
}

#[tokio::test]
async fn test_memory_storage_is_seeded_from_config() {
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let conversation = Uuid::new_v4();
    let seed = format!("{conversation}={alice},{bob}");
    let config = test_config(&[("MEMORY_CONVERSATIONS", seed.as_str())]);

    let backends = Backends::from_config(&config).await.unwrap();
    let state = AppState::new(config, backends);

    let sent = state
        .messages
        .send_message(alice, text(conversation, ConversationType::Single, "seeded"))
        .await
        .unwrap();
    assert_eq!(sent.sequence, 1);

    let err = state
        .messages
        .send_message(
            Uuid::new_v4(),
            text(conversation, ConversationType::Single, "outsider"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}
