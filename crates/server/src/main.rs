use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{DefaultBodyLimit, Form, Path, Query, State, WebSocketUpgrade},
    http::{StatusCode, Uri},
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use server_api::{insert_row, list_destinations, list_rows, validate_chat_id, ApiContext};
use shared::{
    catalog::{Destination, Showcase, Viewport},
    domain::ChatId,
    error::{ApiError, ErrorCode},
    protocol::{InsertRowRequest, ListRowsQuery, StoreEvent, StoreRow, SubscribeQuery},
};
use storage::Storage;
use tokio::sync::broadcast;
use tower_http::{limit::RequestBodyLimitLayer, services::ServeDir};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod chat;
mod config;
mod pages;

use chat::ChatSurface;
use config::{load_settings, prepare_database_url, Settings};
use pages::Pages;

struct AppState {
    api: ApiContext,
    events: broadcast::Sender<StoreEvent>,
    pages: Pages,
    chat: ChatSurface,
}

#[derive(Debug, Deserialize)]
struct LandingQuery {
    #[serde(default)]
    at: usize,
    #[serde(default)]
    view: Viewport,
}

#[derive(Debug, Deserialize)]
struct ChatForm {
    #[serde(default)]
    message: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let (events, _) = broadcast::channel(settings.event_buffer);

    let state = AppState {
        api: ApiContext { storage },
        events,
        pages: Pages::new()?,
        chat: ChatSurface::from_settings(&settings)?,
    };
    let app = build_router(Arc::new(state), &settings);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(
        %addr,
        assets_dir = %settings.assets_dir.display(),
        webhook = webhook_status(&settings),
        "server listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, settings: &Settings) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/chat", get(chat_page).post(chat_submit))
        .route("/healthz", get(healthz))
        .route("/api/destinations", get(http_list_destinations))
        .route(
            "/api/chats/:chat_id/rows",
            get(http_list_rows).post(http_insert_row),
        )
        .route("/ws", get(ws_handler))
        .nest_service("/assets", ServeDir::new(&settings.assets_dir))
        .fallback(not_found)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(settings.max_body_bytes))
        .with_state(state)
}

fn webhook_status(settings: &Settings) -> &'static str {
    if settings.webhook_url.is_some() {
        "configured"
    } else {
        "none"
    }
}

async fn landing(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LandingQuery>,
) -> Result<Html<String>, (StatusCode, Json<ApiError>)> {
    let mut showcase = Showcase::destinations();
    showcase.seek(q.at);
    let html = state
        .pages
        .landing(&showcase, q.view)
        .map_err(render_failed)?;
    Ok(Html(html))
}

async fn chat_page(
    State(state): State<Arc<AppState>>,
) -> Result<Html<String>, (StatusCode, Json<ApiError>)> {
    render_chat_turn(&state, None).await
}

async fn chat_submit(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ChatForm>,
) -> Result<Html<String>, (StatusCode, Json<ApiError>)> {
    render_chat_turn(&state, Some(&form.message)).await
}

async fn render_chat_turn(
    state: &AppState,
    message: Option<&str>,
) -> Result<Html<String>, (StatusCode, Json<ApiError>)> {
    let turn = state.chat.run_turn(message).await.map_err(|e| {
        error!(error = %e, "chat form session failed");
        error_response(ApiError::new(ErrorCode::Internal, e.to_string()))
    })?;
    let html = state
        .pages
        .chat(
            &turn.transcript,
            turn.notification.as_ref(),
            state.chat.webhook_configured(),
        )
        .map_err(render_failed)?;
    Ok(Html(html))
}

async fn not_found(uri: Uri) -> (StatusCode, Json<ApiError>) {
    error_response(ApiError::new(
        ErrorCode::NotFound,
        format!("no route for {uri}"),
    ))
}

fn render_failed(error: handlebars::RenderError) -> (StatusCode, Json<ApiError>) {
    error!(%error, "page render failed");
    error_response(ApiError::new(ErrorCode::Internal, error.to_string()))
}

async fn healthz(
    State(state): State<Arc<AppState>>,
) -> Result<&'static str, (StatusCode, Json<ApiError>)> {
    state.api.storage.health_check().await.map_err(|e| {
        warn!(error = %e, "health check failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    Ok("ok")
}

async fn http_list_destinations() -> Json<Vec<Destination>> {
    Json(list_destinations())
}

async fn http_list_rows(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
    Query(q): Query<ListRowsQuery>,
) -> Result<Json<Vec<StoreRow>>, (StatusCode, Json<ApiError>)> {
    let rows = list_rows(&state.api, &chat_id, &q)
        .await
        .map_err(error_response)?;
    Ok(Json(rows))
}

async fn http_insert_row(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
    Json(req): Json<InsertRowRequest>,
) -> Result<(StatusCode, Json<StoreRow>), (StatusCode, Json<ApiError>)> {
    let event = insert_row(&state.api, &chat_id, req)
        .await
        .map_err(error_response)?;
    let _ = state.events.send(event.clone());
    match event {
        StoreEvent::RowInserted { row } => Ok((StatusCode::CREATED, Json(row))),
        StoreEvent::Error(e) => Err(error_response(e)),
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<SubscribeQuery>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    let chat_id = validate_chat_id(q.chat_id.as_str()).map_err(error_response)?;
    Ok(ws.on_upgrade(move |socket| ws_connection(state, socket, chat_id)))
}

async fn ws_connection(
    state: Arc<AppState>,
    socket: axum::extract::ws::WebSocket,
    chat_id: ChatId,
) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.events.subscribe();
    info!(%chat_id, "store subscriber connected");

    let task_chat_id = chat_id.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(chat_id = %task_chat_id, skipped, "store subscriber lagged behind");
                    StoreEvent::Error(ApiError::new(
                        ErrorCode::Internal,
                        format!("missed {skipped} store events"),
                    ))
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if event
                .chat_id()
                .is_some_and(|chat_id| chat_id != &task_chat_id)
            {
                continue;
            }
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
    debug!(%chat_id, "store subscriber disconnected");
}

fn error_response(error: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match error.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(error))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
