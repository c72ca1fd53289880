//! 채팅 핸들러

use super::room::room;
use crate::error::RoomResult;
use crate::state::AppState;
use std::sync::Arc;

pub async fn handle_send_message(
    state: Arc<AppState>,
    session_id: &str,
    room_id: &str,
    message: &str,
) -> RoomResult<()> {
    room(&state, room_id)?
        .send_message(session_id, message)
        .await
        .map(|_| ())
}
