//! 방 레지스트리: room_id → 방 액터 핸들

use crate::config::Config;
use crate::error::{RoomError, RoomResult};
use crate::room::actor::{RoomActor, RoomCommand};
use crate::room::secret::hash_secret;
use crate::room::{NewMember, Room, RoomHandle, RoomSnapshot};
use crate::services::Services;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// 방 생성 요청
pub struct CreateRoom {
    pub room_id: String,
    pub name: Option<String>,
    pub secret: Option<String>,
    pub creator: NewMember,
}

#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<String, RoomHandle>>,
    services: Services,
    config: Arc<Config>,
}

impl RoomRegistry {
    pub fn new(services: Services, config: Arc<Config>) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            services,
            config,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// 방 생성. 같은 ID의 방이 있으면 `Conflict`.
    ///
    /// 생성자는 첫 멤버이자 호스트가 되며 `room_joined`를 즉시 받는다.
    pub fn create_room(&self, request: CreateRoom) -> RoomResult<(RoomHandle, RoomSnapshot)> {
        let room_id = request.room_id.trim().to_string();
        if room_id.is_empty() {
            return Err(RoomError::Validation("room_id is required".into()));
        }
        request.creator.profile.validate()?;

        let name = request
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| room_id.clone());
        let secret_hash = hash_secret(&self.config.room.secret_pepper, &room_id, request.secret.as_deref());

        match self.rooms.entry(room_id.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!(room_id = %room_id, "Room already exists");
                Err(RoomError::Conflict(room_id))
            }
            Entry::Vacant(slot) => {
                let room = Room::new(room_id.clone(), name, secret_hash, request.creator.profile.user_id);
                let (handle, snapshot) = RoomActor::spawn(room, request.creator, self.clone());
                slot.insert(handle.clone());
                tracing::info!(room_id = %room_id, rooms = self.rooms.len(), "Room created");
                Ok((handle, snapshot))
            }
        }
    }

    pub fn get(&self, room_id: &str) -> RoomResult<RoomHandle> {
        let room_id = room_id.trim();
        self.rooms
            .get(room_id)
            .map(|handle| handle.clone())
            .ok_or_else(|| RoomError::NotFound(room_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// 같은 ID로 새로 만든 방을 지우지 않도록 채널이 같을 때만 제거
    pub(crate) fn remove_if_same(&self, room_id: &str, sender: &mpsc::Sender<RoomCommand>) -> bool {
        self.rooms
            .remove_if(room_id, |_, handle| handle.same_channel(sender))
            .is_some()
    }

    /// 종료된 액터의 핸들 정리
    pub fn sweep_closed(&self) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|room_id, handle| {
            if handle.is_closed() {
                tracing::info!(room_id = %room_id, "Removed closed room handle");
                false
            } else {
                true
            }
        });
        before.saturating_sub(self.rooms.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RewardConfig, RoomConfig};
    use crate::room::membership::MemberProfile;
    use crate::protocol::ServerMessage;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            port: 0,
            host: "127.0.0.1".into(),
            cors_origins: vec![],
            room: RoomConfig::default(),
            reward: RewardConfig::default(),
            log_level: "debug".into(),
        })
    }

    fn creator(sid: &str, user_id: i64) -> (NewMember, UnboundedReceiver<ServerMessage>) {
        let (sender, rx) = mpsc::unbounded_channel();
        let profile = MemberProfile {
            session_id: sid.into(),
            user_id,
            username: format!("user{user_id}"),
            avatar_url: None,
        };
        (NewMember { profile, sender }, rx)
    }

    fn request(room_id: &str, secret: Option<&str>, member: NewMember) -> CreateRoom {
        CreateRoom {
            room_id: room_id.into(),
            name: None,
            secret: secret.map(str::to_string),
            creator: member,
        }
    }

    #[tokio::test]
    async fn create_sends_snapshot_to_creator() {
        let registry = RoomRegistry::new(Services::in_memory(), test_config());
        let (member, mut rx) = creator("s1", 1);

        let (handle, snapshot) = registry.create_room(request(" abc ", None, member)).unwrap();
        assert_eq!(handle.room_id(), "abc");
        assert_eq!(snapshot.host_user_id, 1);
        assert_eq!(snapshot.name, "abc");
        assert_eq!(rx.recv().await, Some(ServerMessage::RoomJoined(snapshot)));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("abc").is_ok());
    }

    #[tokio::test]
    async fn duplicate_room_id_conflicts() {
        let registry = RoomRegistry::new(Services::in_memory(), test_config());
        let (first, _rx1) = creator("s1", 1);
        let (second, _rx2) = creator("s2", 2);

        registry.create_room(request("abc", None, first)).unwrap();
        let err = registry.create_room(request("abc", None, second)).unwrap_err();
        assert_eq!(err, RoomError::Conflict("abc".into()));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn blank_room_id_is_rejected() {
        let registry = RoomRegistry::new(Services::in_memory(), test_config());
        let (member, _rx) = creator("s1", 1);
        assert!(matches!(
            registry.create_room(request("  ", None, member)),
            Err(RoomError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let registry = RoomRegistry::new(Services::in_memory(), test_config());
        assert_eq!(
            registry.get("nope").err(),
            Some(RoomError::NotFound("nope".into()))
        );
    }

    #[tokio::test]
    async fn private_room_is_marked_in_snapshot() {
        let registry = RoomRegistry::new(Services::in_memory(), test_config());
        let (member, _rx) = creator("s1", 1);
        let (_, snapshot) = registry.create_room(request("abc", Some("pw"), member)).unwrap();
        assert!(snapshot.is_private);
    }
}
