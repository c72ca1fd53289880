//! 환경 변수 기반 설정 관리

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// 서버 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
    pub room: RoomConfig,
    pub reward: RewardConfig,
    pub log_level: String,
}

/// 방 설정
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// 방이 비었을 때 삭제까지 대기 시간
    pub grace_period_secs: u64,
    /// 타이머 틱 간격 (기본 1초)
    pub tick_interval_ms: u64,
    /// 외부 협력자 호출 제한 시간
    pub external_timeout_ms: u64,
    pub max_chat_length: usize,
    /// Focus 종료 후 휴식 타이머 자동 시작 여부
    pub auto_start_breaks: bool,
    /// 중단된 방 핸들 정리 주기
    pub sweep_interval_secs: u64,
    /// 방 비밀번호 해시용 서버 키
    pub secret_pepper: String,
}

/// 보상(토마토) 설정
#[derive(Debug, Clone)]
pub struct RewardConfig {
    pub tomatoes_per_cycle: u64,
    /// 리셋 시 부분 Focus 세션을 기록할 최소 경과 시간
    pub min_partial_secs: u64,
}

impl RoomConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn external_timeout(&self) -> Duration {
        Duration::from_millis(self.external_timeout_ms)
    }
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 60,
            tick_interval_ms: 1000,
            external_timeout_ms: 3000,
            max_chat_length: 1000,
            auto_start_breaks: true,
            sweep_interval_secs: 300,
            secret_pepper: generate_pepper(),
        }
    }
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            tomatoes_per_cycle: 1,
            min_partial_secs: 60,
        }
    }
}

impl Config {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let room_defaults = RoomConfig::default();
        let reward_defaults = RewardConfig::default();

        Self {
            port: env_or("PORT", 5050),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            room: RoomConfig {
                grace_period_secs: env_or("ROOM_GRACE_PERIOD_SECS", room_defaults.grace_period_secs),
                tick_interval_ms: env_or("ROOM_TICK_INTERVAL_MS", room_defaults.tick_interval_ms),
                external_timeout_ms: env_or(
                    "ROOM_EXTERNAL_TIMEOUT_MS",
                    room_defaults.external_timeout_ms,
                ),
                max_chat_length: env_or("ROOM_MAX_CHAT_LENGTH", room_defaults.max_chat_length),
                auto_start_breaks: env::var("ROOM_AUTO_START_BREAKS")
                    .map(|v| v != "false")
                    .unwrap_or(room_defaults.auto_start_breaks),
                sweep_interval_secs: env_or(
                    "ROOM_SWEEP_INTERVAL_SECS",
                    room_defaults.sweep_interval_secs,
                ),
                secret_pepper: env::var("ROOM_SECRET_PEPPER")
                    .ok()
                    .filter(|s| !s.is_empty())
                    .unwrap_or(room_defaults.secret_pepper),
            },
            reward: RewardConfig {
                tomatoes_per_cycle: env_or(
                    "REWARD_TOMATOES_PER_CYCLE",
                    reward_defaults.tomatoes_per_cycle,
                ),
                min_partial_secs: env_or("REWARD_MIN_PARTIAL_SECS", reward_defaults.min_partial_secs),
            },
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }
}

/// 값이 없거나 파싱에 실패하면 기본값 사용
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// 설정되지 않은 경우 서버 시작 시 임의의 키 생성
fn generate_pepper() -> String {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    let bytes: [u8; 32] = rand::random();
    BASE64.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_on_garbage() {
        env::set_var("STUDYROOM_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_or("STUDYROOM_TEST_GARBAGE", 42u64), 42);
        env::set_var("STUDYROOM_TEST_NUMBER", " 7 ");
        assert_eq!(env_or("STUDYROOM_TEST_NUMBER", 42u64), 7);
        assert_eq!(env_or("STUDYROOM_TEST_MISSING_KEY", 3usize), 3);
    }

    #[test]
    fn generated_peppers_differ() {
        assert_ne!(RoomConfig::default().secret_pepper, RoomConfig::default().secret_pepper);
    }

    #[test]
    fn tick_interval_is_never_zero() {
        let config = RoomConfig {
            tick_interval_ms: 0,
            ..RoomConfig::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
    }
}
