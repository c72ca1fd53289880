//! 스터디룸 에러 타입

use crate::protocol::ServerMessage;
use thiserror::Error;

/// 권한 거부 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// 호스트 전용 명령을 호스트가 아닌 세션이 보냄
    NotHost,
    /// 방 멤버가 아닌 세션이 방에 대해 행동함
    NotAMember,
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Denial::NotHost => write!(f, "only the host can do this"),
            Denial::NotAMember => write!(f, "you are not a member of this room"),
        }
    }
}

/// 방 명령 처리 중 발생하는 에러
///
/// 모든 에러는 명령을 보낸 연결에만 전달되며 방 상태를 바꾸지 않는다.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("unauthorized: {0}")]
    Unauthorized(Denial),

    /// 명령 대상(킥/호스트 위임)이 방에 없음
    #[error("target is not a member of this room: {0}")]
    NotAMember(String),

    #[error("room not found: {0}")]
    NotFound(String),

    #[error("room already exists: {0}")]
    Conflict(String),

    #[error("room secret does not match")]
    SecretMismatch,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    /// 외부 협력자(Task Store, Reward Ledger 등) 호출 실패 또는 타임아웃
    #[error("dependency failed: {0}")]
    Dependency(String),

    /// 해석할 수 없는 프레임
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl RoomError {
    /// 와이어 프로토콜용 에러 코드
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::Unauthorized(_) => "UNAUTHORIZED",
            RoomError::NotAMember(_) => "NOT_A_MEMBER",
            RoomError::NotFound(_) => "NOT_FOUND",
            RoomError::Conflict(_) => "CONFLICT",
            RoomError::SecretMismatch => "SECRET_MISMATCH",
            RoomError::Validation(_) => "VALIDATION_ERROR",
            RoomError::InvalidState(_) => "INVALID_STATE",
            RoomError::Dependency(_) => "DEPENDENCY_ERROR",
            RoomError::BadRequest(_) => "BAD_REQUEST",
        }
    }

    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::Error {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

pub type RoomResult<T> = Result<T, RoomError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            RoomError::Unauthorized(Denial::NotHost).code(),
            "UNAUTHORIZED"
        );
        assert_eq!(
            RoomError::Unauthorized(Denial::NotAMember).code(),
            "UNAUTHORIZED"
        );
        assert_eq!(RoomError::SecretMismatch.code(), "SECRET_MISMATCH");
        assert_eq!(
            RoomError::Dependency("timeout".into()).code(),
            "DEPENDENCY_ERROR"
        );
    }

    #[test]
    fn error_message_carries_code_and_text() {
        match RoomError::Conflict("abc".into()).to_message() {
            ServerMessage::Error { code, message } => {
                assert_eq!(code, "CONFLICT");
                assert!(message.contains("abc"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
