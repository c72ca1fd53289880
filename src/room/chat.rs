//! 방 채팅 중계

use super::{now_millis, MemberInfo, Room, SessionId, UserId};
use crate::error::{RoomError, RoomResult};
use crate::services::Cosmetics;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    User,
    System,
}

/// `new_message` 페이로드. 보낸 사람의 표시 정보는 전송 시점 기준.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// 방 단위로 단조 증가
    pub seq: u64,
    pub kind: ChatKind,
    pub sid: Option<SessionId>,
    pub user_id: Option<UserId>,
    pub username: String,
    pub avatar_url: Option<String>,
    pub cosmetics: Option<Cosmetics>,
    pub text: String,
    pub sent_at: u64,
}

const SYSTEM_USERNAME: &str = "System";

/// 앞뒤 공백 제거 후 길이 검증
pub fn validate_text(text: &str, max_len: usize) -> RoomResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(RoomError::Validation("message is empty".into()));
    }
    let len = text.chars().count();
    if len > max_len {
        return Err(RoomError::Validation(format!(
            "message is too long ({len} > {max_len} characters)"
        )));
    }
    Ok(text.to_string())
}

impl Room {
    pub fn chat_event(
        &mut self,
        sender: &MemberInfo,
        text: String,
        cosmetics: Option<Cosmetics>,
    ) -> ChatEvent {
        ChatEvent {
            seq: self.take_chat_seq(),
            kind: ChatKind::User,
            sid: Some(sender.session_id.clone()),
            user_id: Some(sender.user_id),
            username: sender.username.clone(),
            avatar_url: sender.avatar_url.clone(),
            cosmetics,
            text,
            sent_at: now_millis(),
        }
    }

    pub fn system_event(&mut self, text: String) -> ChatEvent {
        ChatEvent {
            seq: self.take_chat_seq(),
            kind: ChatKind::System,
            sid: None,
            user_id: None,
            username: SYSTEM_USERNAME.to_string(),
            avatar_url: None,
            cosmetics: None,
            text,
            sent_at: now_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn sequence_is_monotonic_across_kinds() {
        let mut room = room_with_host();
        let sender = room.require_member("s1").unwrap().clone();
        let a = room.chat_event(&sender, "hi".into(), None);
        let b = room.system_event("cycle done".into());
        let c = room.chat_event(&sender, "again".into(), None);
        assert!(a.seq < b.seq && b.seq < c.seq);
        assert_eq!(b.kind, ChatKind::System);
        assert_eq!(c.username, "alice");
    }

    #[test]
    fn text_validation() {
        assert_eq!(validate_text("  hello ", 10).unwrap(), "hello");
        assert!(matches!(validate_text("   ", 10), Err(RoomError::Validation(_))));
        assert!(matches!(validate_text("abcdefghijk", 10), Err(RoomError::Validation(_))));
        assert!(validate_text("ăâêôơư", 6).is_ok());
    }
}
