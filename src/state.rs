//! 애플리케이션 상태 관리

use crate::config::Config;
use crate::protocol::ServerMessage;
use crate::registry::RoomRegistry;
use crate::room::UserId;
use crate::services::Services;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc::UnboundedSender, RwLock};

/// 전역 애플리케이션 상태
pub struct AppState {
    /// 방 액터 핸들 (room_id -> RoomHandle)
    pub registry: RoomRegistry,
    /// 연결 세션 (session_id -> PeerSession)
    pub peers: DashMap<String, PeerSession>,
    pub services: Services,
    /// 설정
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, services: Services) -> Self {
        let config = Arc::new(config);
        Self {
            registry: RoomRegistry::new(services.clone(), config.clone()),
            peers: DashMap::new(),
            services,
            config,
        }
    }

    /// 세션이 현재 참여 중인 방
    pub async fn current_room(&self, session_id: &str) -> Option<String> {
        let session = self.peers.get(session_id)?;
        let room_id = session.room_id.read().await.clone();
        room_id
    }

    pub async fn set_current_room(&self, session_id: &str, room_id: Option<String>) {
        if let Some(session) = self.peers.get(session_id) {
            *session.room_id.write().await = room_id;
        }
    }
}

/// 연결 세션 정보
pub struct PeerSession {
    pub id: String,
    pub room_id: RwLock<Option<String>>,
    /// 방 생성/입장에 성공했을 때 확정된 사용자 ID
    pub user_id: RwLock<Option<UserId>>,
    pub sender: UnboundedSender<ServerMessage>,
    pub connected_at: Instant,
}
