//! 타이머 핸들러 (호스트 전용 조작 + 준비 확인)

use super::room::room;
use crate::error::RoomResult;
use crate::room::SettingsUpdate;
use crate::state::AppState;
use std::sync::Arc;

pub async fn handle_start_timer(state: Arc<AppState>, session_id: &str, room_id: &str) -> RoomResult<()> {
    room(&state, room_id)?.start_timer(session_id).await
}

pub async fn handle_pause_timer(state: Arc<AppState>, session_id: &str, room_id: &str) -> RoomResult<()> {
    room(&state, room_id)?.pause_timer(session_id).await
}

pub async fn handle_reset_timer(state: Arc<AppState>, session_id: &str, room_id: &str) -> RoomResult<()> {
    room(&state, room_id)?.reset_timer(session_id).await
}

/// 휴식 종료 후 준비 완료 표시
pub async fn handle_member_ready(state: Arc<AppState>, session_id: &str, room_id: &str) -> RoomResult<()> {
    let summary = room(&state, room_id)?.member_ready(session_id).await?;
    tracing::debug!(
        session_id = %session_id,
        room_id = %room_id,
        ready = summary.ready_count,
        total = summary.total_members,
        "Member ready"
    );
    Ok(())
}

/// 설정은 다음 전이(또는 리셋)부터 적용된다
pub async fn handle_update_settings(
    state: Arc<AppState>,
    session_id: &str,
    room_id: &str,
    settings: SettingsUpdate,
) -> RoomResult<()> {
    room(&state, room_id)?
        .update_settings(session_id, settings)
        .await
        .map(|_| ())
}
