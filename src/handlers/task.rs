//! 공유 작업 핸들러

use super::room::room;
use crate::error::RoomResult;
use crate::state::AppState;
use std::sync::Arc;

/// 호스트가 방 공유 작업 지정
pub async fn handle_set_task(
    state: Arc<AppState>,
    session_id: &str,
    room_id: &str,
    task_id: &str,
) -> RoomResult<()> {
    room(&state, room_id)?
        .set_task(session_id, task_id)
        .await
        .map(|_| ())
}

/// 체크리스트 항목 체크. 저장 실패 시 방 전체가 마지막 확정 상태를 다시 받는다.
pub async fn handle_check_subtask(
    state: Arc<AppState>,
    session_id: &str,
    room_id: &str,
    subtask_id: i64,
    is_checked: bool,
) -> RoomResult<()> {
    room(&state, room_id)?
        .check_subtask(session_id, subtask_id, is_checked)
        .await
        .map(|_| ())
}
