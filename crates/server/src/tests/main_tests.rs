use super::*;
use axum::{body, body::Body, http::Request};
use futures::StreamExt;
use shared::domain::{Origin, RowId};
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tower::ServiceExt;

fn quick_settings() -> Settings {
    Settings {
        reply_delay_ms: 0,
        ..Settings::default()
    }
}

async fn state_with(settings: &Settings) -> Arc<AppState> {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let (events, _) = broadcast::channel(settings.event_buffer);
    Arc::new(AppState {
        api: ApiContext { storage },
        events,
        pages: Pages::new().expect("templates"),
        chat: ChatSurface::from_settings(settings).expect("chat surface"),
    })
}

async fn test_state() -> Arc<AppState> {
    state_with(&quick_settings()).await
}

async fn test_app() -> (Router, Arc<AppState>) {
    let state = test_state().await;
    let app = build_router(Arc::clone(&state), &Settings::default());
    (app, state)
}

async fn html_body(response: axum::response::Response) -> String {
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(body.to_vec()).expect("utf8")
}

fn chat_form(message: &str) -> Request<Body> {
    let form = format!("message={}", message.replace(' ', "+"));
    Request::post("/chat")
        .header("content-type", "application/x-www-form-urlencoded")
        .header("content-length", form.len())
        .body(Body::from(form))
        .expect("request")
}

fn insert_request(chat_id: &str, message: &str) -> Request<Body> {
    let payload = serde_json::json!({ "message": message, "source": "agent" }).to_string();
    Request::post(format!("/api/chats/{chat_id}/rows"))
        .header("content-type", "application/json")
        .header("content-length", payload.len())
        .body(Body::from(payload))
        .expect("request")
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let (app, _state) = test_app().await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn landing_and_chat_pages_link_to_each_other() {
    let (app, _state) = test_app().await;

    let landing = app
        .clone()
        .oneshot(Request::get("/").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(landing.status(), StatusCode::OK);
    let landing_body = body::to_bytes(landing.into_body(), usize::MAX)
        .await
        .expect("body");
    let landing_html = String::from_utf8(landing_body.to_vec()).expect("utf8");
    assert!(landing_html.contains(r#"href="/chat""#));
    assert!(landing_html.contains("Carthage Ruins"));

    let chat = app
        .oneshot(Request::get("/chat").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(chat.status(), StatusCode::OK);
    let chat_body = body::to_bytes(chat.into_body(), usize::MAX)
        .await
        .expect("body");
    let chat_html = String::from_utf8(chat_body.to_vec()).expect("utf8");
    assert!(chat_html.contains(r#"href="/""#));
}

#[tokio::test]
async fn destinations_route_serves_catalog() {
    let (app, _state) = test_app().await;
    let response = app
        .oneshot(
            Request::get("/api/destinations")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(json.as_array().map(Vec::len), Some(6));
    assert_eq!(json[1]["name"], "Sahara Desert");
}

#[tokio::test]
async fn inserted_rows_are_listed_and_broadcast() {
    let (app, state) = test_app().await;
    let mut events = state.events.subscribe();

    let response = app
        .clone()
        .oneshot(insert_request("chat-1", "We found you a guide in Sousse"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);

    let event = events.recv().await.expect("event");
    assert_eq!(event.chat_id(), Some(&ChatId::from("chat-1")));

    let list = app
        .oneshot(
            Request::get("/api/chats/chat-1/rows?limit=5")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(list.status(), StatusCode::OK);
    let body = body::to_bytes(list.into_body(), usize::MAX)
        .await
        .expect("body");
    let rows: Vec<StoreRow> = serde_json::from_slice(&body).expect("json");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].message, "We found you a guide in Sousse");
    assert_eq!(rows[0].source, Origin::Agent);
}

#[tokio::test]
async fn invalid_chat_id_is_a_bad_request() {
    let (app, _state) = test_app().await;
    let response = app
        .oneshot(insert_request("bad%20id", "hello"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let state = test_state().await;
    let settings = Settings {
        max_body_bytes: 32,
        ..Settings::default()
    };
    let app = build_router(state, &settings);
    let response = app
        .oneshot(insert_request("chat-1", &"x".repeat(256)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn websocket_subscriber_only_sees_its_own_chat() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = test_state().await;
    let app = build_router(Arc::clone(&state), &Settings::default());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws?chat_id=chat-1"))
        .await
        .expect("connect");

    // Wait until the server side has subscribed to the broadcast channel.
    while state.events.receiver_count() == 0 {
        tokio::task::yield_now().await;
    }

    let other = StoreEvent::RowInserted {
        row: StoreRow {
            id: RowId(1),
            chat_id: ChatId::from("chat-2"),
            message: "not yours".into(),
            created_at: chrono::Utc::now(),
            source: Origin::Agent,
        },
    };
    let mine = StoreEvent::RowInserted {
        row: StoreRow {
            id: RowId(2),
            chat_id: ChatId::from("chat-1"),
            message: "yours".into(),
            created_at: chrono::Utc::now(),
            source: Origin::Agent,
        },
    };
    state.events.send(other).expect("send");
    state.events.send(mine).expect("send");

    let frame = ws.next().await.expect("frame").expect("ws message");
    let WsMessage::Text(text) = frame else {
        panic!("expected text frame");
    };
    let event: StoreEvent = serde_json::from_str(&text).expect("event");
    match event {
        StoreEvent::RowInserted { row } => assert_eq!(row.message, "yours"),
        StoreEvent::Error(e) => panic!("unexpected error event: {e:?}"),
    }
}

#[tokio::test]
async fn landing_query_moves_the_destination_strip() {
    let (app, _state) = test_app().await;
    let response = app
        .oneshot(
            Request::get("/?at=5&view=medium")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let html = html_body(response).await;
    assert!(html.contains("<h3>Atlas Mountains</h3>"));
    assert!(html.contains("<h3>Sidi Bou Said</h3>"));
    assert!(!html.contains("<h3>Sahara Desert</h3>"));
}

#[tokio::test]
async fn unknown_viewport_is_rejected() {
    let (app, _state) = test_app().await;
    let response = app
        .oneshot(
            Request::get("/?view=huge")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_route_returns_not_found_error() {
    let (app, _state) = test_app().await;
    let response = app
        .oneshot(
            Request::get("/api/nowhere")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(json["code"], "not_found");
}

#[tokio::test]
async fn rows_after_cursor_are_listed() {
    let (app, _state) = test_app().await;
    for message in ["one", "two", "three"] {
        let response = app
            .clone()
            .oneshot(insert_request("chat-1", message))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .oneshot(
            Request::get("/api/chats/chat-1/rows?after=1&limit=10")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let rows: Vec<StoreRow> = serde_json::from_slice(&body).expect("json");
    let messages: Vec<_> = rows.iter().map(|r| r.message.as_str()).collect();
    assert_eq!(messages, ["two", "three"]);
}

#[tokio::test]
async fn chat_form_without_webhook_shows_the_configuration_prompt() {
    let (app, _state) = test_app().await;
    let response = app
        .oneshot(chat_form("Sahara tour for 4 people"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let html = html_body(response).await;
    assert!(html.contains("Sahara tour for 4 people"));
    assert!(html.contains("configure the n8n webhook URL"));
    assert!(html.contains("No n8n webhook configured"));
}

#[tokio::test]
async fn blank_chat_form_only_shows_the_welcome() {
    let (app, _state) = test_app().await;
    let response = app.oneshot(chat_form("   ")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let html = html_body(response).await;
    assert_eq!(html.matches("<li class=").count(), 1);
    assert!(!html.contains("configure the n8n webhook URL"));
}

#[tokio::test]
async fn chat_form_forwards_to_the_webhook() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");

    let received = Arc::new(tokio::sync::Mutex::new(Vec::<serde_json::Value>::new()));
    let hook_state = Arc::clone(&received);
    let hook = Router::new().route(
        "/webhook/travel",
        axum::routing::post(
            move |Json(body): Json<serde_json::Value>| {
                let hook_state = Arc::clone(&hook_state);
                async move {
                    hook_state.lock().await.push(body);
                    StatusCode::OK
                }
            },
        ),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, hook).await;
    });

    let settings = Settings {
        webhook_url: Some(format!("http://{addr}/webhook/travel")),
        ..quick_settings()
    };
    let state = state_with(&settings).await;
    let app = build_router(state, &settings);

    let response = app
        .oneshot(chat_form("Djerba in May"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let html = html_body(response).await;
    assert!(html.contains("Message sent successfully!"));
    assert!(html.contains("toast-success"));
    assert!(html.contains("forwarded it to our team"));

    let received = received.lock().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["message"], "Djerba in May");
    assert_eq!(received[0]["source"], shared::protocol::WEBHOOK_SOURCE);
}

#[tokio::test]
async fn lagging_subscriber_gets_an_error_frame() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let settings = Settings {
        event_buffer: 1,
        ..quick_settings()
    };
    let state = state_with(&settings).await;
    let app = build_router(Arc::clone(&state), &settings);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws?chat_id=chat-1"))
        .await
        .expect("connect");
    while state.events.receiver_count() == 0 {
        tokio::task::yield_now().await;
    }

    for id in 1..=3 {
        let event = StoreEvent::RowInserted {
            row: StoreRow {
                id: RowId(id),
                chat_id: ChatId::from("chat-1"),
                message: format!("row {id}"),
                created_at: chrono::Utc::now(),
                source: Origin::Agent,
            },
        };
        state.events.send(event).expect("send");
    }

    let frame = ws.next().await.expect("frame").expect("ws message");
    let WsMessage::Text(text) = frame else {
        panic!("expected text frame");
    };
    let event: StoreEvent = serde_json::from_str(&text).expect("event");
    match event {
        StoreEvent::Error(e) => {
            assert_eq!(e.code, ErrorCode::Internal);
            assert!(e.message.contains("missed 2"));
        }
        StoreEvent::RowInserted { row } => panic!("expected lag error, got {row:?}"),
    }
}
