//! 휴식 후 준비 확인 (ready check)
//!
//! 준비 인원은 참고용이며, 대기는 호스트의 `start`로만 해제된다.

use super::{ReadySummary, Room};
use crate::error::{RoomError, RoomResult};

impl Room {
    pub(super) fn open_barrier(&mut self) {
        self.ready.awaiting = true;
        self.ready.ready_sids.clear();
        self.timer.awaiting_ready = true;
    }

    pub(super) fn release_barrier(&mut self) {
        self.ready.awaiting = false;
        self.ready.ready_sids.clear();
        self.timer.awaiting_ready = false;
    }

    /// 준비 완료 표시 (같은 세션의 반복 호출은 한 번으로 계산)
    pub fn mark_ready(&mut self, session_id: &str) -> RoomResult<ReadySummary> {
        self.require_member(session_id)?;
        if !self.ready.awaiting {
            return Err(RoomError::InvalidState("no ready check in progress".into()));
        }
        self.ready.ready_sids.insert(session_id.to_string());
        Ok(self.ready_summary())
    }

    pub fn ready_summary(&self) -> ReadySummary {
        ReadySummary {
            awaiting: self.ready.awaiting,
            ready_count: self
                .ready
                .ready_sids
                .iter()
                .filter(|sid| self.members.contains_key(*sid))
                .count(),
            total_members: self.members.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::error::Denial;

    fn awaiting_room() -> Room {
        let mut room = room_with_host();
        room.add_member(member("s2", 2, "bob"));
        room.open_barrier();
        room
    }

    #[test]
    fn repeated_ready_counts_once() {
        let mut room = awaiting_room();
        for _ in 0..5 {
            let summary = room.mark_ready("s2").unwrap();
            assert_eq!(summary.ready_count, 1);
            assert_eq!(summary.total_members, 2);
        }
    }

    #[test]
    fn ready_requires_membership_and_open_check() {
        let mut room = awaiting_room();
        assert_eq!(
            room.mark_ready("ghost").unwrap_err(),
            RoomError::Unauthorized(Denial::NotAMember)
        );

        room.release_barrier();
        assert!(matches!(room.mark_ready("s2"), Err(RoomError::InvalidState(_))));
    }

    #[test]
    fn barrier_is_advisory() {
        let mut room = awaiting_room();
        assert_eq!(room.ready_summary().ready_count, 0);
        assert_eq!(room.start_timer(), Ok(true));
        assert!(!room.ready.awaiting);
    }
}
