//! 외부 협력자 인터페이스
//!
//! 작업 저장소, 사용자 정보, 보상 장부, 방문 기록은 이 서버 밖에 있다.
//! 방 액터는 아래 트레이트로만 접근하며 모든 호출은 `call_with_timeout`으로 제한된다.

pub mod memory;

use crate::error::{RoomError, RoomResult};
use crate::room::{Subtask, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use memory::{InMemoryIdentityStore, InMemoryRewardLedger, InMemorySessionHistory, InMemoryTaskStore};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Task Store에 저장된 작업과 체크리스트
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub title: String,
    pub subtasks: Vec<Subtask>,
}

/// 채팅 표시용 꾸미기 아이템
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cosmetics {
    pub name_color: Option<String>,
    pub title: Option<String>,
    pub frame: Option<String>,
}

/// 완료(또는 중단)된 Focus 구간 기록
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusSession {
    pub room_id: String,
    pub task_id: Option<String>,
    pub started_at: u64,
    pub ended_at: u64,
    pub planned_minutes: u32,
    pub elapsed_seconds: u32,
}

/// 최근 방문한 방
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomVisit {
    pub room_id: String,
    pub room_name: String,
    pub joined_at: u64,
    pub left_at: u64,
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn load_task(&self, task_ref: &str) -> Result<TaskRecord, ServiceError>;

    /// 저장 후 확정된 항목 상태를 돌려준다
    async fn set_subtask_checked(&self, subtask_id: i64, checked: bool) -> Result<Subtask, ServiceError>;
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn cosmetics(&self, user_id: UserId) -> Result<Option<Cosmetics>, ServiceError>;
}

#[async_trait]
pub trait RewardLedger: Send + Sync {
    /// 보상 지급 후 새 잔액 반환
    async fn credit_focus(
        &self,
        user_id: UserId,
        amount: u64,
        session: &FocusSession,
    ) -> Result<u64, ServiceError>;

    /// 보상 없이 중단된 Focus 구간만 기록
    async fn record_partial(&self, user_id: UserId, session: &FocusSession) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait SessionHistory: Send + Sync {
    async fn record_visit(&self, user_id: UserId, visit: RoomVisit) -> Result<(), ServiceError>;

    async fn recent(&self, user_id: UserId, limit: usize) -> Result<Vec<RoomVisit>, ServiceError>;
}

/// 방 액터들이 공유하는 협력자 묶음
#[derive(Clone)]
pub struct Services {
    pub tasks: Arc<dyn TaskStore>,
    pub identity: Arc<dyn IdentityStore>,
    pub rewards: Arc<dyn RewardLedger>,
    pub history: Arc<dyn SessionHistory>,
}

impl Services {
    pub fn in_memory() -> Self {
        Self {
            tasks: Arc::new(InMemoryTaskStore::default()),
            identity: Arc::new(InMemoryIdentityStore::default()),
            rewards: Arc::new(InMemoryRewardLedger::default()),
            history: Arc::new(InMemorySessionHistory::default()),
        }
    }
}

/// 외부 호출에 제한 시간 적용. 실패와 타임아웃은 방을 멈추지 않는 에러로 변환한다.
pub async fn call_with_timeout<T, F>(limit: Duration, what: &str, call: F) -> RoomResult<T>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(ServiceError::NotFound(item))) => Err(RoomError::NotFound(item)),
        Ok(Err(e)) => Err(RoomError::Dependency(format!("{what}: {e}"))),
        Err(_) => Err(RoomError::Dependency(format!(
            "{what}: timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_call_becomes_dependency_error() {
        let result: RoomResult<()> = call_with_timeout(Duration::from_millis(50), "task store", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        match result {
            Err(RoomError::Dependency(msg)) => assert!(msg.contains("timed out")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn service_errors_are_mapped() {
        let not_found: RoomResult<()> = call_with_timeout(Duration::from_secs(1), "task store", async {
            Err(ServiceError::NotFound("task-1".into()))
        })
        .await;
        assert_eq!(not_found, Err(RoomError::NotFound("task-1".into())));

        let down: RoomResult<()> = call_with_timeout(Duration::from_secs(1), "reward ledger", async {
            Err(ServiceError::Unavailable("db down".into()))
        })
        .await;
        assert!(matches!(down, Err(RoomError::Dependency(_))));
    }
}
