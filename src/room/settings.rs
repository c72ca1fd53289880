//! 방 타이머 설정

use super::{Room, TimerMode};
use crate::error::{RoomError, RoomResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FOCUS_MINUTES: u32 = 25;
pub const DEFAULT_SHORT_BREAK_MINUTES: u32 = 5;
pub const DEFAULT_LONG_BREAK_MINUTES: u32 = 15;
pub const DEFAULT_CYCLES_BEFORE_LONG_BREAK: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSettings {
    pub focus_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub cycles_before_long_break: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            focus_minutes: DEFAULT_FOCUS_MINUTES,
            short_break_minutes: DEFAULT_SHORT_BREAK_MINUTES,
            long_break_minutes: DEFAULT_LONG_BREAK_MINUTES,
            cycles_before_long_break: DEFAULT_CYCLES_BEFORE_LONG_BREAK,
        }
    }
}

impl RoomSettings {
    /// 모드별 길이 (초)
    pub fn duration_seconds(&self, mode: TimerMode) -> u32 {
        let minutes = match mode {
            TimerMode::Focus => self.focus_minutes,
            TimerMode::ShortBreak => self.short_break_minutes,
            TimerMode::LongBreak => self.long_break_minutes,
        };
        minutes.saturating_mul(60)
    }
}

/// 클라이언트가 보낸 설정 변경 요청.
/// 음수도 검증 에러로 돌려주기 위해 부호 있는 정수로 받는다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub focus_minutes: i64,
    pub short_break_minutes: i64,
    pub long_break_minutes: i64,
    pub cycles_before_long_break: i64,
}

impl SettingsUpdate {
    pub fn validate(self) -> RoomResult<RoomSettings> {
        Ok(RoomSettings {
            focus_minutes: positive("focus_minutes", self.focus_minutes)?,
            short_break_minutes: positive("short_break_minutes", self.short_break_minutes)?,
            long_break_minutes: positive("long_break_minutes", self.long_break_minutes)?,
            cycles_before_long_break: positive(
                "cycles_before_long_break",
                self.cycles_before_long_break,
            )?,
        })
    }
}

fn positive(field: &str, value: i64) -> RoomResult<u32> {
    if value <= 0 {
        return Err(RoomError::Validation(format!(
            "{field} must be a positive integer, got {value}"
        )));
    }
    u32::try_from(value)
        .map_err(|_| RoomError::Validation(format!("{field} is too large: {value}")))
}

impl Room {
    /// 새 설정 저장. 진행 중인 카운트다운에는 적용하지 않고
    /// 다음 전환(리셋, 만료, 준비 확인 해제)부터 적용된다.
    ///
    /// 반환값은 사이클 번호가 새 범위로 조정되었는지 여부.
    pub fn apply_settings(&mut self, settings: RoomSettings) -> bool {
        self.settings = settings;
        if self.timer.cycle_index > settings.cycles_before_long_break {
            self.timer.cycle_index = settings.cycles_before_long_break;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn update(focus: i64, short: i64, long: i64, cycles: i64) -> SettingsUpdate {
        SettingsUpdate {
            focus_minutes: focus,
            short_break_minutes: short,
            long_break_minutes: long,
            cycles_before_long_break: cycles,
        }
    }

    #[test]
    fn rejects_non_positive_values() {
        assert!(matches!(update(0, 5, 15, 4).validate(), Err(RoomError::Validation(_))));
        assert!(matches!(update(25, -1, 15, 4).validate(), Err(RoomError::Validation(_))));
        assert!(matches!(update(25, 5, 15, 0).validate(), Err(RoomError::Validation(_))));
        assert!(matches!(
            update(i64::MAX, 5, 15, 4).validate(),
            Err(RoomError::Validation(_))
        ));
    }

    #[test]
    fn settings_do_not_touch_running_countdown() {
        let mut room = room_with_host();
        room.timer.is_running = true;
        room.timer.time_left_seconds = 100;

        let settings = update(30, 5, 15, 4).validate().unwrap();
        room.apply_settings(settings);

        assert_eq!(room.timer.time_left_seconds, 100);
        assert_eq!(room.timer.duration_seconds, 25 * 60);
        assert_eq!(room.settings.focus_minutes, 30);
    }

    #[test]
    fn shrinking_cycle_count_clamps_cycle_index() {
        let mut room = room_with_host();
        room.timer.cycle_index = 4;
        let clamped = room.apply_settings(update(25, 5, 15, 2).validate().unwrap());
        assert!(clamped);
        assert_eq!(room.timer.cycle_index, 2);
    }
}
