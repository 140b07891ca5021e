use chat_sync::api::HttpChatApi;
use chat_sync::error::ChatError;
use chat_sync::models::chat::Participant;
use chat_sync::realtime::backoff::BackoffConfig;
use chat_sync::session::{ ChatSession, SessionConfig };
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{ body_json, header, method, path };
use wiremock::{ Mock, MockServer, ResponseTemplate };

const TOKEN: &str = "test-token";
const USER: &str = "user-1";

fn session_for(server: &MockServer) -> ChatSession {
    let api = HttpChatApi::new(&server.uri(), TOKEN, Duration::from_secs(5)).unwrap();
    ChatSession::new(Arc::new(api), SessionConfig {
        user_id: USER.to_string(),
        token: TOKEN.to_string(),
        realtime_url: "ws://127.0.0.1:9".to_string(),
        list_refresh_delay: Duration::from_millis(10),
        backoff: BackoffConfig::default(),
    })
}

fn wire_message(id: &str, sender: &str, content: &str) -> serde_json::Value {
    json!({ "_id": id, "senderId": sender, "content": content, "timestamp": "2024-06-20T14:00:00.000Z" })
}

fn chat_list() -> serde_json::Value {
    json!({
        "success": true,
        "data": {
            "chats": [
                {
                    "_id": "chat-a",
                    "otherParticipant": { "_id": "mech-1", "fullName": "Ahmet Yilmaz" },
                    "lastMessage": "see you at 3",
                    "unreadCount": 2,
                    "messages": [
                        wire_message("m1", "mech-1", "hello"),
                        wire_message("m2", USER, "hi"),
                        wire_message("m3", "mech-1", "see you at 3")
                    ]
                },
                {
                    "_id": "chat-b",
                    "otherParticipant": { "_id": "mech-2", "fullName": "Mehmet Kaya" },
                    "unreadCount": 0,
                    "messages": []
                }
            ]
        }
    })
}

async fn mount_list(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/chat"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_list()))
        .mount(server).await;
}

#[tokio::test]
async fn list_load_keeps_only_conversations_with_messages() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    let session = session_for(&server);

    let kept = session.load_conversation_list().await.unwrap();

    assert_eq!(kept, 1);
    let conversations = session.store().conversations();
    assert_eq!(conversations.len(), 1);
    let a = &conversations[0];
    assert_eq!(a.id, "chat-a");
    assert_eq!(a.participant_name, "Ahmet Yilmaz");
    assert_eq!(a.unread_count, 2);
    assert_eq!(a.messages.len(), 3);
    assert_eq!(a.last_message.as_deref(), Some("see you at 3"));
    assert!(!session.store().is_loading());
    assert!(session.store().error().is_none());
}

#[tokio::test]
async fn failed_list_load_keeps_previous_conversations() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_list()))
        .up_to_n_times(1)
        .mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server).await;
    let session = session_for(&server);

    session.load_conversation_list().await.unwrap();
    let err = session.load_conversation_list().await.unwrap_err();

    assert!(matches!(err, ChatError::Status { status: 500, .. }));
    assert_eq!(session.store().conversations().len(), 1);
    assert!(session.store().error().unwrap().starts_with("Failed to load conversations"));
    assert!(!session.store().is_loading());
}

#[tokio::test]
async fn unsuccessful_list_payload_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": false })))
        .mount(&server).await;
    let session = session_for(&server);

    let err = session.load_conversation_list().await.unwrap_err();
    assert!(matches!(err, ChatError::Rejected(_)));
}

#[tokio::test]
async fn missing_conversation_sets_not_found_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chat/ghost/messages"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server).await;
    let session = session_for(&server);

    let err = session.load_conversation("ghost").await.unwrap_err();

    assert!(matches!(err, ChatError::ConversationNotFound(ref id) if id == "ghost"));
    assert_eq!(session.store().error().as_deref(), Some("Conversation not found: ghost"));
    assert!(session.store().active_id().is_none());
}

#[tokio::test]
async fn fetched_conversation_becomes_active_with_zero_unread() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chat/chat-c/messages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "_id": "chat-c",
                    "participants": [{ "_id": USER, "fullName": "Me" }, { "_id": "mech-3", "fullName": "Ali Demir" }],
                    "unreadCount": 4,
                    "messages": [wire_message("c1", "mech-3", "ready")]
                }
            }))
        )
        .mount(&server).await;
    let session = session_for(&server);

    let conversation = session.load_conversation("chat-c").await.unwrap();

    assert_eq!(conversation.participant_id, "mech-3");
    assert_eq!(conversation.unread_count, 0);
    assert_eq!(session.store().active_id().as_deref(), Some("chat-c"));
}

#[tokio::test]
async fn mark_read_applies_server_count() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/chat/chat-a/read"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unreadCount": 1 })))
        .expect(1)
        .mount(&server).await;
    let session = session_for(&server);
    session.load_conversation_list().await.unwrap();

    assert_eq!(session.mark_read("chat-a").await, Some(1));
    assert_eq!(session.store().conversation("chat-a").unwrap().unread_count, 1);
}

#[tokio::test]
async fn mark_read_without_count_means_zero() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/chat/chat-a/read"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server).await;
    let session = session_for(&server);
    session.load_conversation_list().await.unwrap();

    assert_eq!(session.mark_read("chat-a").await, Some(0));
    assert_eq!(session.store().conversation("chat-a").unwrap().unread_count, 0);
}

#[tokio::test]
async fn mark_read_failure_leaves_count_untouched() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/chat/chat-a/read"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server).await;
    let session = session_for(&server);
    session.load_conversation_list().await.unwrap();

    assert_eq!(session.mark_read("chat-a").await, None);
    assert_eq!(session.store().conversation("chat-a").unwrap().unread_count, 2);
}

#[tokio::test]
async fn failed_send_stores_nothing() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/chat/messages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "success": false, "message": "Chat is closed" }))
        )
        .mount(&server).await;
    let session = session_for(&server);
    session.load_conversation_list().await.unwrap();

    let err = session.send_message("chat-a", "anyone there?").await.unwrap_err();

    assert!(matches!(err, ChatError::Rejected(ref reason) if reason == "Chat is closed"));
    assert_eq!(session.store().conversation("chat-a").unwrap().messages.len(), 3);
}

#[tokio::test]
async fn confirmed_send_uses_server_id_and_trimmed_content() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/chat/messages"))
        .and(body_json(json!({ "chatId": "chat-a", "content": "on my way" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": wire_message("srv-9", USER, "on my way")
            }))
        )
        .mount(&server).await;
    let session = session_for(&server);
    session.load_conversation_list().await.unwrap();

    let sent = session.send_message("chat-a", "  on my way  ").await.unwrap();

    assert_eq!(sent.id, "srv-9");
    assert_eq!(sent.receiver_id, "mech-1");
    let a = session.store().conversation("chat-a").unwrap();
    assert_eq!(a.messages.len(), 4);
    assert_eq!(a.last_message.as_deref(), Some("on my way"));
}

#[tokio::test]
async fn blank_send_never_reaches_the_backend() {
    let server = MockServer::start().await;
    mount_list(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/chat/messages"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server).await;
    let session = session_for(&server);
    session.load_conversation_list().await.unwrap();

    assert!(matches!(session.send_message("chat-a", "   ").await, Err(ChatError::EmptyMessage)));
}

#[tokio::test]
async fn contacting_a_new_participant_rekeys_the_placeholder() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_json(json!({ "mechanicId": "mech-7" })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({
                "data": { "_id": "chat-7", "participants": [USER, "mech-7"], "messages": [] }
            }))
        )
        .mount(&server).await;
    let session = session_for(&server);
    let mechanic = Participant {
        id: "mech-7".to_string(),
        name: "Can Ozturk".to_string(),
        image: None,
    };

    let conversation = session.contact(&mechanic).await.unwrap();

    assert_eq!(conversation.id, "chat-7");
    assert_eq!(conversation.participant_name, "Can Ozturk");
    assert_eq!(session.store().active_id().as_deref(), Some("chat-7"));
    assert_eq!(session.store().conversations().len(), 1);
}

#[tokio::test]
async fn completion_after_logout_is_discarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_list()).set_delay(Duration::from_millis(200)))
        .mount(&server).await;
    let session = session_for(&server);

    let loading = tokio::spawn({
        let session = session.clone();
        async move { session.load_conversation_list().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    session.logout();

    assert!(matches!(loading.await.unwrap(), Err(ChatError::Cancelled)));
    assert!(session.store().conversations().is_empty());
}
