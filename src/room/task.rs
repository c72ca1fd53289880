//! 공유 작업/체크리스트 동기화 (상태 반영 부분)
//!
//! Task Store 호출은 액터가 하고, 여기서는 확정된 결과만 방 상태에 반영한다.

use super::{Room, RoomTask, Subtask};
use crate::error::{RoomError, RoomResult};
use crate::services::TaskRecord;

impl Room {
    /// Task Store에서 불러온 작업으로 교체
    pub fn apply_task(&mut self, record: TaskRecord) -> &RoomTask {
        self.task = RoomTask {
            task_id: Some(record.task_id),
            task_title: Some(record.title),
            subtasks: record.subtasks,
        };
        &self.task
    }

    pub fn require_subtask(&self, subtask_id: i64) -> RoomResult<&Subtask> {
        self.task
            .subtasks
            .iter()
            .find(|s| s.id == subtask_id)
            .ok_or_else(|| RoomError::NotFound(format!("subtask {subtask_id}")))
    }

    /// 서버가 확인한 항목 상태로 덮어쓰기
    pub fn apply_subtask(&mut self, confirmed: Subtask) -> bool {
        match self.task.subtasks.iter_mut().find(|s| s.id == confirmed.id) {
            Some(slot) => {
                *slot = confirmed;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn record() -> TaskRecord {
        TaskRecord {
            task_id: "card-7".into(),
            title: "Write report".into(),
            subtasks: vec![
                Subtask {
                    id: 1,
                    title: "Outline".into(),
                    is_checked: false,
                    checklist_title: Some("Draft".into()),
                },
                Subtask {
                    id: 2,
                    title: "Proofread".into(),
                    is_checked: false,
                    checklist_title: None,
                },
            ],
        }
    }

    #[test]
    fn applying_task_replaces_checklist() {
        let mut room = room_with_host();
        let task = room.apply_task(record()).clone();
        assert_eq!(task.task_id.as_deref(), Some("card-7"));
        assert_eq!(task.subtasks.len(), 2);
    }

    #[test]
    fn confirmed_subtask_overwrites_local_state() {
        let mut room = room_with_host();
        room.apply_task(record());

        let mut confirmed = room.require_subtask(2).unwrap().clone();
        confirmed.is_checked = true;
        assert!(room.apply_subtask(confirmed));
        assert!(room.task.subtasks[1].is_checked);

        assert!(matches!(room.require_subtask(99), Err(RoomError::NotFound(_))));
    }
}
