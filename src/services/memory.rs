//! 메모리 기반 협력자 구현 (단독 실행 및 테스트용)

use super::{
    Cosmetics, FocusSession, IdentityStore, RewardLedger, RoomVisit, ServiceError, SessionHistory,
    TaskRecord, TaskStore,
};
use crate::room::{Subtask, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, TaskRecord>>,
}

impl InMemoryTaskStore {
    #[cfg(test)]
    pub async fn insert(&self, record: TaskRecord) {
        self.tasks.write().await.insert(record.task_id.clone(), record);
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn load_task(&self, task_ref: &str) -> Result<TaskRecord, ServiceError> {
        self.tasks
            .read()
            .await
            .get(task_ref)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("task {task_ref}")))
    }

    async fn set_subtask_checked(&self, subtask_id: i64, checked: bool) -> Result<Subtask, ServiceError> {
        let mut tasks = self.tasks.write().await;
        tasks
            .values_mut()
            .flat_map(|task| task.subtasks.iter_mut())
            .find(|s| s.id == subtask_id)
            .map(|s| {
                s.is_checked = checked;
                s.clone()
            })
            .ok_or_else(|| ServiceError::NotFound(format!("subtask {subtask_id}")))
    }
}

#[derive(Default)]
pub struct InMemoryIdentityStore {
    cosmetics: RwLock<HashMap<UserId, Cosmetics>>,
}

impl InMemoryIdentityStore {
    #[cfg(test)]
    pub async fn equip(&self, user_id: UserId, cosmetics: Cosmetics) {
        self.cosmetics.write().await.insert(user_id, cosmetics);
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn cosmetics(&self, user_id: UserId) -> Result<Option<Cosmetics>, ServiceError> {
        Ok(self.cosmetics.read().await.get(&user_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryRewardLedger {
    balances: RwLock<HashMap<UserId, u64>>,
    sessions: RwLock<Vec<(UserId, FocusSession, bool)>>,
}

impl InMemoryRewardLedger {
    #[cfg(test)]
    pub async fn balance(&self, user_id: UserId) -> u64 {
        self.balances.read().await.get(&user_id).copied().unwrap_or(0)
    }

    /// (사용자, 세션, 완료 여부)
    #[cfg(test)]
    pub async fn sessions(&self) -> Vec<(UserId, FocusSession, bool)> {
        self.sessions.read().await.clone()
    }
}

#[async_trait]
impl RewardLedger for InMemoryRewardLedger {
    async fn credit_focus(
        &self,
        user_id: UserId,
        amount: u64,
        session: &FocusSession,
    ) -> Result<u64, ServiceError> {
        let balance = {
            let mut balances = self.balances.write().await;
            let balance = balances.entry(user_id).or_insert(0);
            *balance += amount;
            *balance
        };
        self.sessions.write().await.push((user_id, session.clone(), true));
        Ok(balance)
    }

    async fn record_partial(&self, user_id: UserId, session: &FocusSession) -> Result<(), ServiceError> {
        self.sessions.write().await.push((user_id, session.clone(), false));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySessionHistory {
    visits: RwLock<HashMap<UserId, Vec<RoomVisit>>>,
}

#[async_trait]
impl SessionHistory for InMemorySessionHistory {
    /// 사용자별로 방마다 한 줄만 유지 (최근 방문으로 갱신)
    async fn record_visit(&self, user_id: UserId, visit: RoomVisit) -> Result<(), ServiceError> {
        let mut visits = self.visits.write().await;
        let entries = visits.entry(user_id).or_default();
        entries.retain(|v| v.room_id != visit.room_id);
        entries.push(visit);
        Ok(())
    }

    async fn recent(&self, user_id: UserId, limit: usize) -> Result<Vec<RoomVisit>, ServiceError> {
        let mut entries = self
            .visits
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default();
        entries.sort_by(|a, b| b.left_at.cmp(&a.left_at));
        entries.truncate(limit);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit(room_id: &str, left_at: u64) -> RoomVisit {
        RoomVisit {
            room_id: room_id.into(),
            room_name: room_id.into(),
            joined_at: 0,
            left_at,
        }
    }

    #[tokio::test]
    async fn history_keeps_latest_visit_per_room() {
        let history = InMemorySessionHistory::default();
        history.record_visit(1, visit("a", 10)).await.unwrap();
        history.record_visit(1, visit("b", 20)).await.unwrap();
        history.record_visit(1, visit("a", 30)).await.unwrap();

        let recent = history.recent(1, 10).await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|v| v.room_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(history.recent(1, 1).await.unwrap().len(), 1);
        assert!(history.recent(2, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn subtask_write_returns_confirmed_state() {
        let store = InMemoryTaskStore::default();
        store
            .insert(TaskRecord {
                task_id: "card-1".into(),
                title: "Card".into(),
                subtasks: vec![Subtask {
                    id: 5,
                    title: "step".into(),
                    is_checked: false,
                    checklist_title: None,
                }],
            })
            .await;

        let confirmed = store.set_subtask_checked(5, true).await.unwrap();
        assert!(confirmed.is_checked);
        assert!(store.load_task("card-1").await.unwrap().subtasks[0].is_checked);
        assert!(matches!(
            store.set_subtask_checked(6, true).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn ledger_accumulates_balance() {
        let ledger = InMemoryRewardLedger::default();
        let session = FocusSession {
            room_id: "abc".into(),
            task_id: None,
            started_at: 0,
            ended_at: 1,
            planned_minutes: 25,
            elapsed_seconds: 1500,
        };
        assert_eq!(ledger.credit_focus(1, 1, &session).await.unwrap(), 1);
        assert_eq!(ledger.credit_focus(1, 1, &session).await.unwrap(), 2);
        ledger.record_partial(1, &session).await.unwrap();
        assert_eq!(ledger.balance(1).await, 2);
        assert_eq!(ledger.sessions().await.len(), 3);
    }
}
