//! 방 관리 핸들러

use super::connection::{bind_session_user, session_user};
use crate::error::{RoomError, RoomResult};
use crate::protocol::{ServerMessage, UserIdentity};
use crate::registry::CreateRoom;
use crate::room::membership::MemberProfile;
use crate::room::{NewMember, RoomHandle, UserId};
use crate::services::call_with_timeout;
use crate::state::AppState;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// 최근 방문 방 목록 최대 개수
const RECENT_ROOMS_LIMIT: usize = 10;

pub(crate) fn room(state: &AppState, room_id: &str) -> RoomResult<RoomHandle> {
    state.registry.get(room_id)
}

fn new_member(state: &AppState, session_id: &str, user: UserIdentity) -> RoomResult<NewMember> {
    let sender = state
        .peers
        .get(session_id)
        .map(|session| session.sender.clone())
        .ok_or_else(|| RoomError::NotFound(format!("session {session_id}")))?;

    Ok(NewMember {
        profile: MemberProfile {
            session_id: session_id.to_string(),
            user_id: user.user_id,
            username: user.username,
            avatar_url: user.avatar_url,
        },
        sender,
    })
}

/// 세션의 현재 방을 바꾸고, 이전 방이 있었다면 퇴장
async fn switch_room(state: &AppState, session_id: &str, room_id: &str) {
    let previous = state.current_room(session_id).await;
    state
        .set_current_room(session_id, Some(room_id.to_string()))
        .await;

    if let Some(previous) = previous.filter(|p| p != room_id) {
        tracing::debug!(session_id = %session_id, from = %previous, to = %room_id, "Switching rooms");
        leave_room_internal(state, session_id, &previous).await;
    }
}

/// 방 생성 처리
pub async fn handle_create_room(
    state: Arc<AppState>,
    session_id: &str,
    room_id: &str,
    user: UserIdentity,
    name: Option<String>,
    secret: Option<String>,
) -> RoomResult<()> {
    let user_id = user.user_id;
    let creator = new_member(&state, session_id, user)?;
    let (handle, _) = state.registry.create_room(CreateRoom {
        room_id: room_id.to_string(),
        name,
        secret,
        creator,
    })?;

    bind_session_user(&state, session_id, user_id).await;
    switch_room(&state, session_id, handle.room_id()).await;
    Ok(())
}

/// 방 참여 처리
pub async fn handle_join_room(
    state: Arc<AppState>,
    session_id: &str,
    room_id: &str,
    user: UserIdentity,
    secret: Option<String>,
) -> RoomResult<()> {
    let handle = room(&state, room_id)?;
    let user_id = user.user_id;
    let member = new_member(&state, session_id, user)?;

    tracing::info!(session_id = %session_id, room_id = %handle.room_id(), "handle_join_room started");
    handle.join(member, secret).await?;

    bind_session_user(&state, session_id, user_id).await;
    switch_room(&state, session_id, handle.room_id()).await;
    Ok(())
}

/// 방 나가기 내부 로직. 방이 이미 없거나 멤버가 아니어도 조용히 끝난다.
pub async fn leave_room_internal(state: &AppState, session_id: &str, room_id: &str) {
    match room(state, room_id) {
        Ok(handle) => {
            if let Err(e) = handle.leave(session_id).await {
                tracing::debug!(session_id = %session_id, room_id = %room_id, error = %e, "Leave skipped");
            }
        }
        Err(_) => {
            tracing::debug!(session_id = %session_id, room_id = %room_id, "Leave for unknown room ignored");
        }
    }
}

/// 방 나가기 처리
pub async fn handle_leave_room(state: Arc<AppState>, session_id: &str, room_id: &str) -> RoomResult<()> {
    let room_id = room_id.trim();
    if state.current_room(session_id).await.as_deref() == Some(room_id) {
        state.set_current_room(session_id, None).await;
    }
    leave_room_internal(&state, session_id, room_id).await;
    Ok(())
}

/// 호스트의 강퇴 처리
pub async fn handle_kick_user(
    state: Arc<AppState>,
    session_id: &str,
    room_id: &str,
    target_sid: &str,
) -> RoomResult<()> {
    let handle = room(&state, room_id)?;
    handle.kick(session_id, target_sid).await?;

    if state.current_room(target_sid).await.as_deref() == Some(handle.room_id()) {
        state.set_current_room(target_sid, None).await;
    }
    Ok(())
}

pub async fn handle_transfer_host(
    state: Arc<AppState>,
    session_id: &str,
    room_id: &str,
    new_host_user_id: UserId,
) -> RoomResult<()> {
    room(&state, room_id)?
        .transfer_host(session_id, new_host_user_id)
        .await
}

/// 세션 사용자의 최근 방문 방 목록 조회
pub async fn handle_recent_rooms(
    state: Arc<AppState>,
    session_id: &str,
    sender: &UnboundedSender<ServerMessage>,
) -> RoomResult<()> {
    let user_id = session_user(&state, session_id).await?;
    let history = state.services.history.clone();
    let rooms = call_with_timeout(
        state.config.room.external_timeout(),
        "session history",
        history.recent(user_id, RECENT_ROOMS_LIMIT),
    )
    .await?;

    let _ = sender.send(ServerMessage::RecentRooms { rooms });
    Ok(())
}

/// 종료된 방 핸들 정리
pub async fn cleanup_closed_rooms(state: Arc<AppState>) {
    let deleted = state.registry.sweep_closed();
    if deleted > 0 {
        tracing::info!(deleted_rooms = deleted, "Cleanup completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::handlers::connection::handle_connection;
    use crate::services::Services;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn identity(user_id: UserId, username: &str) -> UserIdentity {
        UserIdentity {
            user_id,
            username: username.into(),
            avatar_url: None,
        }
    }

    async fn connect(state: &Arc<AppState>) -> (String, UnboundedReceiver<ServerMessage>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session_id = handle_connection(state.clone(), tx).await;
        assert!(matches!(rx.recv().await, Some(ServerMessage::Connected { .. })));
        (session_id, rx)
    }

    #[tokio::test]
    async fn joining_another_room_leaves_the_previous_one() {
        let state = Arc::new(AppState::new(Config::from_env(), Services::in_memory()));
        let (alice, _alice_rx) = connect(&state).await;
        let (bob, _bob_rx) = connect(&state).await;

        handle_create_room(state.clone(), &alice, "one", identity(1, "alice"), None, None)
            .await
            .unwrap();
        handle_create_room(state.clone(), &bob, "two", identity(2, "bob"), None, None)
            .await
            .unwrap();
        handle_join_room(state.clone(), &alice, "two", identity(1, "alice"), None)
            .await
            .unwrap();

        assert_eq!(state.current_room(&alice).await.as_deref(), Some("two"));
        let one = state.registry.get("one").unwrap().snapshot().await.unwrap();
        assert!(one.members.is_empty());
        let two = state.registry.get("two").unwrap().snapshot().await.unwrap();
        assert_eq!(two.members.len(), 2);
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let state = Arc::new(AppState::new(Config::from_env(), Services::in_memory()));
        let (alice, _rx) = connect(&state).await;

        handle_create_room(state.clone(), &alice, "one", identity(1, "alice"), None, None)
            .await
            .unwrap();
        handle_leave_room(state.clone(), &alice, "one").await.unwrap();
        handle_leave_room(state.clone(), &alice, "one").await.unwrap();
        handle_leave_room(state.clone(), &alice, "nowhere").await.unwrap();
        assert_eq!(state.current_room(&alice).await, None);
    }

    #[tokio::test]
    async fn recent_rooms_lists_left_rooms() {
        let state = Arc::new(AppState::new(Config::from_env(), Services::in_memory()));
        let (alice, mut rx) = connect(&state).await;

        handle_create_room(state.clone(), &alice, "one", identity(1, "alice"), Some("Library".into()), None)
            .await
            .unwrap();
        handle_leave_room(state.clone(), &alice, "one").await.unwrap();
        while rx.try_recv().is_ok() {}

        let sender = state.peers.get(&alice).unwrap().sender.clone();
        handle_recent_rooms(state.clone(), &alice, &sender).await.unwrap();
        match rx.recv().await {
            Some(ServerMessage::RecentRooms { rooms }) => {
                assert_eq!(rooms.len(), 1);
                assert_eq!(rooms[0].room_name, "Library");
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn recent_rooms_requires_a_bound_user() {
        let state = Arc::new(AppState::new(Config::from_env(), Services::in_memory()));
        let (stranger, mut rx) = connect(&state).await;

        let sender = state.peers.get(&stranger).unwrap().sender.clone();
        assert_eq!(
            handle_recent_rooms(state.clone(), &stranger, &sender).await,
            Err(RoomError::Unauthorized(crate::error::Denial::NotAMember))
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn recent_rooms_only_shows_own_visits() {
        let state = Arc::new(AppState::new(Config::from_env(), Services::in_memory()));
        let (alice, _alice_rx) = connect(&state).await;
        let (bob, mut bob_rx) = connect(&state).await;

        handle_create_room(state.clone(), &alice, "one", identity(1, "alice"), Some("Library".into()), None)
            .await
            .unwrap();
        handle_leave_room(state.clone(), &alice, "one").await.unwrap();
        handle_create_room(state.clone(), &bob, "two", identity(2, "bob"), Some("Cafe".into()), None)
            .await
            .unwrap();
        handle_leave_room(state.clone(), &bob, "two").await.unwrap();
        while bob_rx.try_recv().is_ok() {}

        let sender = state.peers.get(&bob).unwrap().sender.clone();
        handle_recent_rooms(state.clone(), &bob, &sender).await.unwrap();
        match bob_rx.recv().await {
            Some(ServerMessage::RecentRooms { rooms }) => {
                assert_eq!(rooms.len(), 1);
                assert_eq!(rooms[0].room_name, "Cafe");
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}
