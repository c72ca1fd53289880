//! 연결 핸들러
//!
//! 세션 ID는 연결마다 새로 발급되고, 사용자 ID는 방 생성/입장이 성공한 뒤에만
//! 세션에 묶인다. 세션 단위 조회(최근 방문 등)는 이 묶인 ID만 사용한다.

use crate::error::{Denial, RoomError, RoomResult};
use crate::protocol::ServerMessage;
use crate::room::UserId;
use crate::state::{AppState, PeerSession};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc::UnboundedSender, RwLock};
use uuid::Uuid;

/// 새 연결 처리
pub async fn handle_connection(
    state: Arc<AppState>,
    sender: UnboundedSender<ServerMessage>,
) -> String {
    let session_id = Uuid::new_v4().to_string();

    state.peers.insert(
        session_id.clone(),
        PeerSession {
            id: session_id.clone(),
            room_id: RwLock::new(None),
            user_id: RwLock::new(None),
            sender: sender.clone(),
            connected_at: Instant::now(),
        },
    );

    let _ = sender.send(ServerMessage::Connected {
        socket_id: session_id.clone(),
    });

    tracing::info!(session_id = %session_id, connections = state.peers.len(), "Session opened");
    session_id
}

/// 방 입장이 확정된 사용자 ID를 세션에 기록
pub async fn bind_session_user(state: &AppState, session_id: &str, user_id: UserId) {
    let Some(session) = state.peers.get(session_id) else {
        return;
    };
    let previous = session.user_id.write().await.replace(user_id);
    if previous.is_some_and(|p| p != user_id) {
        tracing::warn!(session_id = %session_id, previous = ?previous, user_id = user_id, "Session user changed");
    }
}

/// 세션에 묶인 사용자 ID. 아직 어느 방에도 들어간 적이 없으면 거부.
pub async fn session_user(state: &AppState, session_id: &str) -> RoomResult<UserId> {
    let session = state
        .peers
        .get(session_id)
        .ok_or(RoomError::Unauthorized(Denial::NotAMember))?;
    let user_id = *session.user_id.read().await;
    user_id.ok_or(RoomError::Unauthorized(Denial::NotAMember))
}

/// 연결 해제 처리. 참여 중이던 방에서는 퇴장 처리된다.
pub async fn handle_disconnect(state: Arc<AppState>, session_id: &str) {
    let Some((_, session)) = state.peers.remove(session_id) else {
        return;
    };

    let room_id = session.room_id.read().await.clone();
    if let Some(room_id) = &room_id {
        crate::handlers::room::leave_room_internal(&state, session_id, room_id).await;
    }

    let user_id = *session.user_id.read().await;
    tracing::info!(
        session_id = %session.id,
        user_id = ?user_id,
        room_id = ?room_id,
        connected_secs = session.connected_at.elapsed().as_secs(),
        "Session closed"
    );
}

/// Heartbeat 처리
pub fn handle_heartbeat(sender: &UnboundedSender<ServerMessage>) {
    let _ = sender.send(ServerMessage::HeartbeatAck);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::Services;
    use tokio::sync::mpsc;

    fn app() -> Arc<AppState> {
        Arc::new(AppState::new(Config::from_env(), Services::in_memory()))
    }

    #[tokio::test]
    async fn connect_issues_unique_sessions() {
        let state = app();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let first = handle_connection(state.clone(), tx.clone()).await;
        let second = handle_connection(state.clone(), tx).await;

        assert_ne!(first, second);
        assert_eq!(state.peers.len(), 2);
        assert_eq!(rx.recv().await, Some(ServerMessage::Connected { socket_id: first }));
    }

    #[tokio::test]
    async fn session_user_is_unknown_until_bound() {
        let state = app();
        let (tx, _rx) = mpsc::unbounded_channel();
        let session_id = handle_connection(state.clone(), tx).await;

        assert_eq!(
            session_user(&state, &session_id).await,
            Err(RoomError::Unauthorized(Denial::NotAMember))
        );
        bind_session_user(&state, &session_id, 7).await;
        assert_eq!(session_user(&state, &session_id).await, Ok(7));
    }

    #[tokio::test]
    async fn disconnect_forgets_session() {
        let state = app();
        let (tx, _rx) = mpsc::unbounded_channel();
        let session_id = handle_connection(state.clone(), tx).await;
        bind_session_user(&state, &session_id, 7).await;

        handle_disconnect(state.clone(), &session_id).await;
        assert!(state.peers.is_empty());
        assert!(session_user(&state, &session_id).await.is_err());
        // 두 번째 해제는 아무 일도 하지 않는다
        handle_disconnect(state, &session_id).await;
    }
}
