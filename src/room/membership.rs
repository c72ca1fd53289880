//! 멤버십 관리: 입장/퇴장, 호스트 승계, 강퇴, 호스트 위임

use super::{now_millis, MemberInfo, Room, SessionId, UserId};
use crate::error::{Denial, RoomError, RoomResult};

/// 입장하려는 세션의 신원 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberProfile {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
}

impl MemberProfile {
    pub fn validate(&self) -> RoomResult<()> {
        if self.username.trim().is_empty() {
            return Err(RoomError::Validation("username is required".into()));
        }
        Ok(())
    }
}

/// 멤버 퇴장 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub member: MemberInfo,
    /// 호스트가 승계된 경우 새 호스트
    pub new_host: Option<UserId>,
    pub now_empty: bool,
}

impl Room {
    /// 멤버 추가. 빈 방에 들어온 첫 멤버가 호스트가 된다.
    pub fn add_member(&mut self, profile: MemberProfile) -> MemberInfo {
        if self.members.is_empty() {
            self.host_user_id = profile.user_id;
        }
        let info = MemberInfo {
            session_id: profile.session_id,
            user_id: profile.user_id,
            username: profile.username.trim().to_string(),
            avatar_url: profile.avatar_url,
            joined_at: now_millis(),
            join_seq: self.take_join_seq(),
        };
        self.members.insert(info.session_id.clone(), info.clone());
        info
    }

    pub fn require_member(&self, session_id: &str) -> RoomResult<&MemberInfo> {
        self.members
            .get(session_id)
            .ok_or(RoomError::Unauthorized(Denial::NotAMember))
    }

    /// 세션의 사용자가 현재 호스트인지 매 호출마다 서버에서 확인
    pub fn require_host(&self, session_id: &str) -> RoomResult<&MemberInfo> {
        let member = self.require_member(session_id)?;
        if member.user_id != self.host_user_id {
            return Err(RoomError::Unauthorized(Denial::NotHost));
        }
        Ok(member)
    }

    /// 멤버 제거. 모르는 세션이면 `None`.
    pub fn remove_member(&mut self, session_id: &str) -> Option<Departure> {
        let member = self.members.remove(session_id)?;
        self.ready.ready_sids.remove(session_id);

        if self.members.is_empty() {
            return Some(Departure {
                member,
                new_host: None,
                now_empty: true,
            });
        }

        // 같은 사용자의 다른 세션이 남아 있으면 호스트 유지
        let host_still_present = self.members.values().any(|m| m.user_id == self.host_user_id);
        let new_host = if host_still_present {
            None
        } else {
            let successor = self.pick_successor();
            if let Some(user_id) = successor {
                self.host_user_id = user_id;
            }
            successor
        };

        Some(Departure {
            member,
            new_host,
            now_empty: false,
        })
    }

    /// 가장 먼저 입장한 남은 멤버
    fn pick_successor(&self) -> Option<UserId> {
        self.members
            .values()
            .min_by_key(|m| (m.joined_at, m.join_seq))
            .map(|m| m.user_id)
    }

    pub fn kick(&mut self, caller_sid: &str, target_sid: &str) -> RoomResult<Departure> {
        self.require_host(caller_sid)?;
        if caller_sid == target_sid {
            return Err(RoomError::InvalidState("the host cannot kick themselves".into()));
        }
        let target = self
            .members
            .get(target_sid)
            .ok_or_else(|| RoomError::NotAMember(target_sid.to_string()))?;
        if target.user_id == self.host_user_id {
            return Err(RoomError::InvalidState("cannot kick a host session".into()));
        }
        self.remove_member(target_sid)
            .ok_or_else(|| RoomError::NotAMember(target_sid.to_string()))
    }

    pub fn transfer_host(&mut self, caller_sid: &str, new_host_user_id: UserId) -> RoomResult<()> {
        self.require_host(caller_sid)?;
        if !self.members.values().any(|m| m.user_id == new_host_user_id) {
            return Err(RoomError::NotAMember(new_host_user_id.to_string()));
        }
        self.host_user_id = new_host_user_id;
        Ok(())
    }
}
