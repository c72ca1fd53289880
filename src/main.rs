//! StudyRoom 실시간 협업 서버
//!
//! 방마다 공유 뽀모도로 타이머, 공유 작업 체크리스트, 채팅을 서버 권한으로 관리한다.

mod config;
mod error;
mod handlers;
mod protocol;
mod registry;
mod room;
mod services;
mod state;

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::HeaderValue,
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use config::Config;
use error::RoomError;
use futures::{SinkExt, StreamExt};
use protocol::{ClientMessage, ServerMessage};
use services::Services;
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // 로깅 초기화 (RUST_LOG가 있으면 우선)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = Arc::new(AppState::new(config.clone(), Services::in_memory()));

    // 종료된 방 핸들 정리 스케줄러
    let cleanup_state = state.clone();
    let sweep_every = Duration::from_secs(config.room.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            handlers::cleanup_closed_rooms(cleanup_state.clone()).await;
        }
    });

    let cors = cors_layer(&config)?;

    // 라우터 설정
    let app = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("🍅 StudyRoom server started");
    tracing::info!("Address: {}", addr);
    tracing::info!("WebSocket: ws://{}/ws", addr);
    tracing::info!(
        grace_secs = config.room.grace_period_secs,
        tick_ms = config.room.tick_interval_ms,
        auto_start_breaks = config.room.auto_start_breaks,
        "Room settings"
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.allows_any_origin() {
        return Ok(cors.allow_origin(Any));
    }

    let origins = config
        .cors_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("invalid CORS origin: {origin}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(cors.allow_origin(origins))
}

async fn index_handler() -> Html<&'static str> {
    Html("<h1>StudyRoom Server</h1><p>WebSocket endpoint: /ws</p>")
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": "studyroom-server",
        "rooms": state.registry.len(),
        "connections": state.peers.len(),
        "timestamp": room::now_millis() / 1000
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // 연결 처리
    let session_id = handlers::handle_connection(state.clone(), tx.clone()).await;

    // 송신 태스크
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to serialize server message"),
            }
        }
    });

    // 수신 처리
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => handle_client_message(&state, &session_id, &tx, msg).await,
                Err(e) => {
                    tracing::debug!(session_id = %session_id, error = %e, "Malformed frame");
                    let _ = tx.send(RoomError::BadRequest(e.to_string()).to_message());
                }
            },
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    // 연결 해제
    handlers::handle_disconnect(state, &session_id).await;
    send_task.abort();
}

async fn handle_client_message(
    state: &Arc<AppState>,
    session_id: &str,
    sender: &mpsc::UnboundedSender<ServerMessage>,
    msg: ClientMessage,
) {
    let result = match msg {
        ClientMessage::Heartbeat => {
            handlers::handle_heartbeat(sender);
            Ok(())
        }
        ClientMessage::CreateRoom {
            room_id,
            user,
            name,
            secret,
        } => handlers::handle_create_room(state.clone(), session_id, &room_id, user, name, secret).await,
        ClientMessage::JoinRoom {
            room_id,
            user,
            secret,
        } => handlers::handle_join_room(state.clone(), session_id, &room_id, user, secret).await,
        ClientMessage::LeaveRoom { room_id } => {
            handlers::handle_leave_room(state.clone(), session_id, &room_id).await
        }
        ClientMessage::HostKickUser {
            room_id,
            target_sid,
        } => handlers::handle_kick_user(state.clone(), session_id, &room_id, &target_sid).await,
        ClientMessage::HostTransferHost {
            room_id,
            new_host_user_id,
        } => {
            handlers::handle_transfer_host(state.clone(), session_id, &room_id, new_host_user_id)
                .await
        }
        ClientMessage::RecentRooms => {
            handlers::handle_recent_rooms(state.clone(), session_id, sender).await
        }
        ClientMessage::StartTimer { room_id } => {
            handlers::handle_start_timer(state.clone(), session_id, &room_id).await
        }
        ClientMessage::PauseTimer { room_id } => {
            handlers::handle_pause_timer(state.clone(), session_id, &room_id).await
        }
        ClientMessage::ResetTimer { room_id } => {
            handlers::handle_reset_timer(state.clone(), session_id, &room_id).await
        }
        ClientMessage::MemberReady { room_id } => {
            handlers::handle_member_ready(state.clone(), session_id, &room_id).await
        }
        ClientMessage::HostUpdateSettings { room_id, settings } => {
            handlers::handle_update_settings(state.clone(), session_id, &room_id, settings).await
        }
        ClientMessage::HostSetTask { room_id, task_id } => {
            handlers::handle_set_task(state.clone(), session_id, &room_id, &task_id).await
        }
        ClientMessage::MemberCheckSubtask {
            room_id,
            subtask_id,
            is_checked,
        } => {
            handlers::handle_check_subtask(state.clone(), session_id, &room_id, subtask_id, is_checked)
                .await
        }
        ClientMessage::SendMessage { room_id, message } => {
            handlers::handle_send_message(state.clone(), session_id, &room_id, &message).await
        }
    };

    // 에러는 요청한 연결에만 전달
    if let Err(e) = result {
        tracing::warn!(session_id = %session_id, code = e.code(), error = %e, "Command rejected");
        let _ = sender.send(e.to_message());
    }
}
