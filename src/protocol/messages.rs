//! 클라이언트-서버 메시지 프로토콜 정의

use crate::room::{
    ChatEvent, MemberInfo, ReadySummary, RoomSettings, RoomSnapshot, RoomStats, RoomTask, SessionId,
    SettingsUpdate, TimerState, UserId,
};
use crate::services::RoomVisit;
use serde::{Deserialize, Serialize};

/// 입장 시 클라이언트가 보내는 사용자 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: UserId,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// 클라이언트 → 서버 메시지
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    // Connection
    Heartbeat,

    // Room Management
    CreateRoom {
        room_id: String,
        user: UserIdentity,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        secret: Option<String>,
    },
    JoinRoom {
        room_id: String,
        user: UserIdentity,
        #[serde(default)]
        secret: Option<String>,
    },
    LeaveRoom {
        room_id: String,
    },
    HostKickUser {
        room_id: String,
        target_sid: SessionId,
    },
    HostTransferHost {
        room_id: String,
        new_host_user_id: UserId,
    },
    /// 세션에 묶인 사용자의 최근 방문 목록
    RecentRooms,

    // Timer
    StartTimer {
        room_id: String,
    },
    PauseTimer {
        room_id: String,
    },
    ResetTimer {
        room_id: String,
    },
    MemberReady {
        room_id: String,
    },
    HostUpdateSettings {
        room_id: String,
        settings: SettingsUpdate,
    },

    // Task
    HostSetTask {
        room_id: String,
        task_id: String,
    },
    MemberCheckSubtask {
        room_id: String,
        subtask_id: i64,
        is_checked: bool,
    },

    // Chat
    SendMessage {
        room_id: String,
        message: String,
    },
}

/// 서버 → 클라이언트 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    // Connection
    Connected { socket_id: String },
    HeartbeatAck,
    Error { code: String, message: String },

    // Room Events
    RoomJoined(RoomSnapshot),
    UserJoined {
        member: MemberInfo,
    },
    UserLeft {
        sid: SessionId,
        user_id: UserId,
        username: String,
    },
    UserKicked {
        sid: SessionId,
        user_id: UserId,
        username: String,
    },
    NewHostAssigned {
        new_host_user_id: UserId,
    },
    RecentRooms {
        rooms: Vec<RoomVisit>,
    },

    // Timer
    TimerUpdate(TimerState),
    ShowReadyCheck {
        total_members: usize,
    },
    ReadyStatusUpdate(ReadySummary),
    RoomSettingsUpdated(RoomSettings),
    RoomStatsUpdated(RoomStats),
    TomatoRewarded {
        user_id: UserId,
        amount: u64,
        cycle: u32,
        balance: u64,
    },

    // Task
    RoomTaskUpdated(RoomTask),

    // Chat
    NewMessage(ChatEvent),
}
