//! 스터디룸 상태 모델
//!
//! `Room`은 방 액터(`actor::RoomActor`)가 단독으로 소유하며,
//! 외부에는 스냅샷 복사본만 전달된다.

pub mod actor;
pub mod chat;
pub mod membership;
pub mod ready;
pub mod secret;
pub mod settings;
pub mod task;
pub mod timer;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

pub use actor::{NewMember, RoomHandle};
pub use chat::{ChatEvent, ChatKind};
pub use settings::{RoomSettings, SettingsUpdate};
pub use timer::{TimerMode, TimerState};

/// 연결 단위 세션 ID (재접속 시 바뀜)
pub type SessionId = String;
/// 재접속과 무관한 사용자 ID
pub type UserId = i64;

/// 방 멤버 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
    /// 입장 시각 (unix millis)
    pub joined_at: u64,
    /// 같은 밀리초 입장 시 순서 결정용
    #[serde(skip)]
    pub join_seq: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomStats {
    pub total_completed_cycles: u64,
}

/// 방 공유 체크리스트 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: i64,
    pub title: String,
    pub is_checked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checklist_title: Option<String>,
}

/// 호스트가 선택한 공유 작업
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTask {
    pub task_id: Option<String>,
    pub task_title: Option<String>,
    pub subtasks: Vec<Subtask>,
}

/// 휴식 종료 후 준비 확인 상태
#[derive(Debug, Clone, Default)]
pub struct ReadyCheckState {
    pub awaiting: bool,
    pub ready_sids: HashSet<SessionId>,
}

/// 준비 확인 요약 (`ready_status_update` 페이로드)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadySummary {
    pub awaiting: bool,
    pub ready_count: usize,
    pub total_members: usize,
}

/// `room_joined` 전체 스냅샷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub name: String,
    pub is_private: bool,
    pub host_user_id: UserId,
    /// 입장 순서대로 정렬
    pub members: Vec<MemberInfo>,
    pub timer: TimerState,
    pub settings: RoomSettings,
    pub stats: RoomStats,
    pub task: RoomTask,
    pub ready: ReadySummary,
    /// 스냅샷을 받는 세션 자신의 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub your_sid: Option<SessionId>,
}

/// 방 정보
#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub secret_hash: Option<String>,
    pub host_user_id: UserId,
    pub members: HashMap<SessionId, MemberInfo>,
    pub timer: TimerState,
    pub settings: RoomSettings,
    pub stats: RoomStats,
    pub task: RoomTask,
    pub ready: ReadyCheckState,
    pub created_at: u64,
    next_join_seq: u64,
    chat_seq: u64,
}

impl Room {
    /// 빈 방 생성. 첫 멤버는 `add_member`로 추가되며 자동으로 호스트가 된다.
    pub fn new(id: String, name: String, secret_hash: Option<String>, host_user_id: UserId) -> Self {
        let settings = RoomSettings::default();
        Self {
            id,
            name,
            secret_hash,
            host_user_id,
            members: HashMap::new(),
            timer: TimerState::fresh(&settings),
            settings,
            stats: RoomStats::default(),
            task: RoomTask::default(),
            ready: ReadyCheckState::default(),
            created_at: now_millis(),
            next_join_seq: 0,
            chat_seq: 0,
        }
    }

    pub fn is_private(&self) -> bool {
        self.secret_hash.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// 입장 순서대로 정렬된 멤버 목록
    pub fn members_in_join_order(&self) -> Vec<&MemberInfo> {
        let mut members: Vec<&MemberInfo> = self.members.values().collect();
        members.sort_by_key(|m| (m.joined_at, m.join_seq));
        members
    }

    /// 현재 멤버들의 중복 없는 사용자 ID 목록 (입장 순서)
    pub fn distinct_user_ids(&self) -> Vec<UserId> {
        let mut seen = HashSet::new();
        self.members_in_join_order()
            .into_iter()
            .filter(|m| seen.insert(m.user_id))
            .map(|m| m.user_id)
            .collect()
    }

    pub fn snapshot(&self, your_sid: Option<&str>) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.clone(),
            name: self.name.clone(),
            is_private: self.is_private(),
            host_user_id: self.host_user_id,
            members: self.members_in_join_order().into_iter().cloned().collect(),
            timer: self.timer.clone(),
            settings: self.settings,
            stats: self.stats.clone(),
            task: self.task.clone(),
            ready: self.ready_summary(),
            your_sid: your_sid.map(str::to_string),
        }
    }

    fn take_join_seq(&mut self) -> u64 {
        let seq = self.next_join_seq;
        self.next_join_seq += 1;
        seq
    }

    fn take_chat_seq(&mut self) -> u64 {
        self.chat_seq += 1;
        self.chat_seq
    }
}

/// 현재 시각 (unix millis)
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// 호스트(U1) 한 명이 있는 방
    pub fn room_with_host() -> Room {
        let mut room = Room::new("abc".into(), "abc".into(), None, 1);
        room.add_member(member("s1", 1, "alice"));
        room
    }

    pub fn member(sid: &str, user_id: UserId, username: &str) -> membership::MemberProfile {
        membership::MemberProfile {
            session_id: sid.to_string(),
            user_id,
            username: username.to_string(),
            avatar_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn snapshot_lists_members_in_join_order() {
        let mut room = room_with_host();
        room.add_member(member("s2", 2, "bob"));
        room.add_member(member("s3", 3, "carol"));

        let snapshot = room.snapshot(Some("s2"));
        let sids: Vec<&str> = snapshot.members.iter().map(|m| m.session_id.as_str()).collect();
        assert_eq!(sids, vec!["s1", "s2", "s3"]);
        assert_eq!(snapshot.your_sid.as_deref(), Some("s2"));
        assert_eq!(snapshot.host_user_id, 1);
        assert!(!snapshot.is_private);
    }

    #[test]
    fn distinct_user_ids_collapses_duplicate_sessions() {
        let mut room = room_with_host();
        room.add_member(member("s1b", 1, "alice"));
        room.add_member(member("s2", 2, "bob"));
        assert_eq!(room.distinct_user_ids(), vec![1, 2]);
    }

    #[test]
    fn snapshot_serializes_without_join_seq() {
        let room = room_with_host();
        let json = serde_json::to_value(room.snapshot(None)).unwrap();
        assert!(json["members"][0].get("join_seq").is_none());
        assert!(json.get("your_sid").is_none());
        assert_eq!(json["timer"]["mode"], "focus");
    }
}
