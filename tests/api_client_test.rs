//! `ApiClient` and the view models it feeds, driven against a `wiremock`
//! backend. Paths carry the `/api` prefix the client appends to the server
//! address.

use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use virtualg::api::models::{MessageKind, Role};
use virtualg::state::auth::AuthMode;
use virtualg::state::chat::{self, ChatState, SendOutcome};
use virtualg::state::sessions::{self, Selection, SessionListState};
use virtualg::state::voice::{RoomOutcome, VoiceOverlay, VoicePhase};
use virtualg::{ApiClient, ApiError};

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(&server.uri(), Some("tok".into())).expect("client")
}

fn anonymous(server: &MockServer) -> ApiClient {
    ApiClient::new(&server.uri(), None).expect("client")
}

fn session_json(id: &str, last: &str) -> serde_json::Value {
    json!({
        "id": id,
        "title": format!("Chat {id}"),
        "lastMessage": last,
        "timestamp": "2024-05-01T10:00:00",
        "messageCount": 2
    })
}

fn ai_reply(text: &str) -> serde_json::Value {
    json!({
        "reply": { "role": "ai", "content": text, "timestamp": "2024-05-01T10:00:05", "type": "text" },
        "session_id": "s1"
    })
}

#[tokio::test]
async fn login_posts_form_and_returns_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("username=a%40b.test"))
        .and(body_string_contains("password=secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok", "token_type": "bearer"})))
        .expect(1)
        .mount(&server)
        .await;

    let token = anonymous(&server).login("a@b.test", "secret").await.expect("login");
    assert_eq!(token, "tok");
}

#[tokio::test]
async fn register_posts_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/register"))
        .and(body_json(json!({"email": "a@b.test", "password": "secret1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "new"})))
        .mount(&server)
        .await;

    let res = AuthMode::Register.submit(&anonymous(&server), " a@b.test ", "secret1").await;
    assert_eq!(res, Ok("new".to_string()));
}

#[tokio::test]
async fn rejected_login_shows_backend_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Incorrect email or password"})))
        .mount(&server)
        .await;

    let res = AuthMode::Login.submit(&anonymous(&server), "a@b.test", "wrong").await;
    assert_eq!(res, Err("Incorrect email or password".to_string()));
}

#[tokio::test]
async fn invalid_register_form_sends_nothing() {
    let server = MockServer::start().await;
    let res = AuthMode::Register.submit(&anonymous(&server), "a@b.test", "123").await;
    assert!(res.is_err());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn protected_calls_carry_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/usage"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "credits_used": 40,
            "credits_available": 60,
            "total_credits_purchased": 100
        })))
        .mount(&server)
        .await;

    let usage = client(&server).usage().await.expect("usage");
    assert_eq!(usage.credits_available, 60);
    assert!(usage.is_low());
}

#[tokio::test]
async fn missing_token_fails_without_a_request() {
    let server = MockServer::start().await;
    let err = anonymous(&server).usage().await.unwrap_err();
    assert!(matches!(err, ApiError::NotAuthenticated));
    assert!(err.is_auth_failure());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn expired_token_is_an_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sessions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Could not validate credentials"})))
        .mount(&server)
        .await;

    let err = client(&server).sessions().await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(err.is_auth_failure());
}

#[tokio::test]
async fn history_uses_default_or_session_route() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chat/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "session_id": "default",
            "messages": [{ "role": "user", "content": "hi", "timestamp": "2024-05-01T10:00:00", "type": "text" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/s1/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"session_id": "s1", "messages": []})))
        .mount(&server)
        .await;

    let api = client(&server);
    let default = chat::fetch_history(&api, None).await.expect("default history");
    assert_eq!(default.messages.len(), 1);
    let s1 = chat::fetch_history(&api, Some("s1")).await.expect("session history");
    assert!(s1.messages.is_empty());
}

#[tokio::test]
async fn sending_appends_user_then_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(query_param("session_id", "s1"))
        .and(body_json(json!({"text": "hello"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(ai_reply("**hey** you")))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let mut state = ChatState::new(Some("s1".into()));
    let call = state.begin_send(Some("hello".into()), None).expect("call");
    assert_eq!(state.messages().len(), 1);
    assert!(state.is_awaiting_reply());

    let res = call.run(&api).await;
    let outcome = state.finish_send(call.ticket(), res);
    assert_eq!(outcome, SendOutcome::Replied { session_id: Some("s1".into()) });
    assert_eq!(state.messages().len(), 2);
    assert_eq!(state.messages()[1].role, Role::Ai);
    assert!(!state.is_awaiting_reply());
}

#[tokio::test]
async fn payment_required_is_typed_and_appends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "detail": {
                "error": "insufficient_credits",
                "message": "You need 40 more credits",
                "current_balance": 10,
                "required": 50,
                "suggested_purchase": 1000
            }
        })))
        .mount(&server)
        .await;

    let api = client(&server);
    let mut state = ChatState::new(None);
    let call = state.begin_send(Some("hi".into()), None).expect("call");
    let res = call.run(&api).await;
    match state.finish_send(call.ticket(), res) {
        SendOutcome::PurchaseRequired(shortfall) => {
            assert_eq!(shortfall.suggested_purchase, 1000);
            assert_eq!(shortfall.current_balance, 10);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    // only the optimistic user message
    assert_eq!(state.messages().len(), 1);
}

#[tokio::test]
async fn server_error_appends_apology() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let api = client(&server);
    let mut state = ChatState::new(None);
    let call = state.begin_send(Some("hi".into()), None).expect("call");
    let res = call.run(&api).await;
    assert!(matches!(state.finish_send(call.ticket(), res), SendOutcome::Failed(_)));
    assert_eq!(state.messages().len(), 2);
    assert_eq!(state.messages()[1].content, chat::APOLOGY);
}

#[tokio::test]
async fn image_upload_is_multipart_and_resolves_against_origin() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .and(body_string_contains("name=\"file\""))
        .and(body_string_contains("filename=\"cat.png\""))
        .and(body_string_contains("image/png"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"url": "/uploads/cat.png"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_json(json!({"image_url": "/uploads/cat.png"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(ai_reply("cute")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/uploads/cat.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1u8, 2, 3], "image/png"))
        .mount(&server)
        .await;

    let api = client(&server);
    let mut state = ChatState::new(None);
    let ticket = state.ticket();
    let url = api.upload("cat.png", vec![0x89, b'P', b'N', b'G']).await.expect("upload");
    assert_eq!(url, "/uploads/cat.png");
    assert_eq!(api.absolute_url(&url).unwrap(), format!("{}/uploads/cat.png", server.uri()));
    assert_eq!(api.fetch_bytes(&url).await.expect("bytes"), vec![1u8, 2, 3]);

    let call = state.send_uploaded(ticket, None, url).expect("call");
    assert_eq!(state.messages()[0].kind, MessageKind::Image);
    let res = call.run(&api).await;
    assert!(matches!(state.finish_send(call.ticket(), res), SendOutcome::Replied { .. }));
}

#[tokio::test]
async fn created_session_is_listed_and_selected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"session_id": "new"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessions": [session_json("new", ""), session_json("old", "bye")]
        })))
        .mount(&server)
        .await;

    let api = client(&server);
    let (id, list) = sessions::create_and_refresh(&api).await.expect("create");
    assert!(list.iter().any(|s| s.id == id));

    let mut state = SessionListState::new(vec![]);
    assert_eq!(state.apply_created(id, list), Selection::Selected("new".into()));
    assert_eq!(state.sessions()[0].preview(), "No messages yet");
    assert_eq!(state.footer_label(), "2 chat sessions");
}

#[tokio::test]
async fn deleting_selected_session_clears_chat() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/sessions/a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Session deleted"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sessions": [session_json("b", "")]})))
        .mount(&server)
        .await;

    let api = client(&server);
    let mut list = SessionListState::new(vec![]);
    list.apply_refresh(Ok(vec![])).expect("refresh");
    list.select("a");
    let mut chat = ChatState::new(Some("a".into()));

    let remaining = sessions::delete_and_refresh(&api, "a").await.expect("delete").expect("list");
    if list.apply_deleted("a", Some(remaining)) == Selection::Cleared {
        chat.switch_to(None);
    }
    assert_eq!(list.selected(), None);
    assert_eq!(chat.session_id(), None);
    assert!(chat.messages().is_empty());
    assert_eq!(list.sessions().len(), 1);
}

#[tokio::test]
async fn deleted_session_is_cleared_even_if_refetch_fails() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/sessions/a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Session deleted"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sessions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let api = client(&server);
    let mut list = SessionListState::new(vec![]);
    list.apply_refresh(Ok(vec![])).expect("refresh");
    list.select("a");

    let refreshed = sessions::delete_and_refresh(&api, "a").await.expect("delete went through");
    assert!(matches!(refreshed, Err(ApiError::Http { status: 500, .. })));
    assert_eq!(list.apply_deleted("a", refreshed.ok()), Selection::Cleared);
    assert_eq!(list.selected(), None);
}

#[tokio::test]
async fn failed_delete_keeps_selection() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/sessions/a"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Session not found"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sessions": []})))
        .expect(0)
        .mount(&server)
        .await;

    let api = client(&server);
    let err = sessions::delete_and_refresh(&api, "a").await.unwrap_err();
    assert_eq!(err.user_message(), "Session not found");
}

#[tokio::test]
async fn voice_room_lifecycle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/voice/create-room"))
        .and(body_string_contains("pernilla-"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "room_name": "pernilla-1",
            "room_sid": "RM_1",
            "token": "jwt",
            "ws_url": "wss://voice.test"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/voice/end-session"))
        .and(body_json(json!({"room_name": "pernilla-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let mut overlay = VoiceOverlay::new();
    let name = overlay.start().expect("room name");
    overlay.room_created(&name, api.create_voice_room(&name).await).expect("room");
    assert!(matches!(overlay.phase(), VoicePhase::Connected(_)));

    let room = overlay.end().expect("room to end");
    api.end_voice_session(&room).await.expect("end");
    assert_eq!(overlay.phase(), &VoicePhase::Idle);
}

#[tokio::test]
async fn room_created_after_close_is_ended() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/voice/create-room"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "room_name": "pernilla-2",
            "room_sid": "RM_2",
            "token": "jwt",
            "ws_url": "wss://voice.test"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/voice/end-session"))
        .and(body_json(json!({"room_name": "pernilla-2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let mut overlay = VoiceOverlay::new();
    let name = overlay.start().expect("room name");
    assert_eq!(overlay.end(), None);

    match overlay.room_created(&name, api.create_voice_room(&name).await).expect("room") {
        RoomOutcome::Abandon(room) => api.end_voice_session(&room).await.expect("end"),
        RoomOutcome::Join => panic!("closed overlay joined a room"),
    }
    assert_eq!(overlay.phase(), &VoicePhase::Idle);
}

#[tokio::test]
async fn voice_shortfall_is_shown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/voice/create-room"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "detail": {
                "error": "insufficient_credits",
                "message": "Voice chat requires at least 100 credits",
                "current_balance": 5,
                "required": 100,
                "suggested_purchase": 1000
            }
        })))
        .mount(&server)
        .await;

    let api = client(&server);
    let mut overlay = VoiceOverlay::new();
    let name = overlay.start().expect("room name");
    assert!(overlay.room_created(&name, api.create_voice_room(&name).await).is_err());
    assert_eq!(
        overlay.phase(),
        &VoicePhase::Error("Voice chat requires at least 100 credits".into())
    );
}
