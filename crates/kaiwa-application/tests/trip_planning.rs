//! End-to-end chat turns through `AppContext` against a mock generation
//! service and a history file on disk.

use httpmock::prelude::*;
use kaiwa_application::AppContext;
use kaiwa_application::controllers::{ChatEvent, HistoryEffect, HistoryEvent};
use kaiwa_core::config::{KaiwaConfig, StorageBackend};
use kaiwa_core::engine::Controller;
use kaiwa_core::session::ChatStore;
use kaiwa_infrastructure::{JsonChatStore, KaiwaPaths, SqliteChatStore};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

const GENERATE_PATH: &str = "/models/gemini-2.5-flash:generateContent";

fn context(dir: &TempDir, server: &MockServer, backend: StorageBackend) -> AppContext {
    let mut config = KaiwaConfig::default();
    config.generation.api_root = server.base_url();
    config.storage.backend = backend;
    AppContext::build(
        KaiwaPaths::new(Some(dir.path())),
        config,
        vec!["bad-key".to_string(), "good-key".to_string()],
    )
    .unwrap()
}

async fn mock_service(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH).query_param("key", "bad-key");
            then.status(401).json_body(
                json!({"error": {"code": 401, "message": "API key not valid", "status": "UNAUTHENTICATED"}}),
            );
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path(GENERATE_PATH)
                .query_param("key", "good-key")
                .body_contains("Where should I go in Italy?");
            then.status(200).json_body(json!({
                "candidates": [{"content": {"parts": [{"text": "Start with Florence."}]}}]
            }));
        })
        .await;
}

#[tokio::test]
async fn trip_planning_turn_is_persisted() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start_async().await;
    mock_service(&server).await;
    let app = context(&dir, &server, StorageBackend::Json);

    let id = app.coordinator.create_session("Trip planning").await.unwrap();
    let reply = app
        .coordinator
        .send_message(&id, "Where should I go in Italy?", None)
        .await
        .unwrap();
    assert_eq!(reply.content, "Start with Florence.");

    // Reopen the file to check what actually reached the disk.
    let store = JsonChatStore::open(dir.path().join("history.json")).unwrap();
    let messages = store.list_messages(&id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].is_user);
    assert!(!messages[1].is_user);

    let session = store.find_session(&id).await.unwrap().unwrap();
    assert_eq!(session.title, "Trip planning");
    assert_eq!(session.last_message, "Where should I go in Italy?");
    assert!(!session.has_image);
}

#[tokio::test]
async fn trip_planning_through_controllers_on_sqlite() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start_async().await;
    mock_service(&server).await;
    let app = context(&dir, &server, StorageBackend::Sqlite);

    let history = app.history_controller();
    let mut navigation = history.effect_stream();
    history.handle_event(HistoryEvent::CreateSession("Trip planning".into()));
    let session_id = match navigation.recv().await.unwrap() {
        HistoryEffect::NavigateToChat(id) => id,
        other => panic!("unexpected effect: {other:?}"),
    };

    let chat = app.chat_controller();
    chat.handle_event(ChatEvent::OpenSession(session_id.clone()));
    chat.handle_event(ChatEvent::InputChanged("Where should I go in Italy?".into()));
    chat.handle_event(ChatEvent::SendMessage);

    let mut states = chat.state_stream();
    let state = tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|s| !s.is_loading && s.messages.len() == 2),
    )
    .await
    .expect("chat turn did not finish")
    .unwrap()
    .clone();
    assert_eq!(state.messages[1].content, "Start with Florence.");

    let mut sessions = history.state_stream();
    let listed = tokio::time::timeout(
        Duration::from_secs(5),
        sessions.wait_for(|s| {
            s.sessions
                .first()
                .is_some_and(|session| session.last_message == "Where should I go in Italy?")
        }),
    )
    .await
    .expect("history did not update")
    .unwrap()
    .clone();
    assert_eq!(listed.sessions.len(), 1);
    assert!(!listed.sessions[0].has_image);

    drop(chat);
    drop(history);
    let store = SqliteChatStore::open(&dir.path().join("history.db")).unwrap();
    assert_eq!(store.list_messages(&session_id).await.unwrap().len(), 2);
}
