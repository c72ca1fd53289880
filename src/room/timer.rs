//! 뽀모도로 타이머 상태 머신
//!
//! 방 액터의 틱 드라이버가 `Room::tick`을 1초마다 호출한다.
//! 이 모듈은 순수한 상태 전이만 담당하고, 브로드캐스트와 외부 호출은 액터가 한다.

use super::{Room, RoomSettings};
use crate::error::{RoomError, RoomResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    Focus,
    ShortBreak,
    LongBreak,
}

impl TimerMode {
    pub fn is_break(self) -> bool {
        !matches!(self, TimerMode::Focus)
    }
}

/// `timer_update` 페이로드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub mode: TimerMode,
    pub duration_seconds: u32,
    pub time_left_seconds: u32,
    pub is_running: bool,
    pub cycle_index: u32,
    /// 준비 확인 대기 중 (ReadyCheckState::awaiting 미러)
    pub awaiting_ready: bool,
}

impl TimerState {
    pub fn fresh(settings: &RoomSettings) -> Self {
        let duration = settings.duration_seconds(TimerMode::Focus);
        Self {
            mode: TimerMode::Focus,
            duration_seconds: duration,
            time_left_seconds: duration,
            is_running: false,
            cycle_index: 1,
            awaiting_ready: false,
        }
    }

    /// 주어진 모드의 전체 길이로 카운트다운 장전
    fn load(&mut self, mode: TimerMode, settings: &RoomSettings) {
        let duration = settings.duration_seconds(mode);
        self.mode = mode;
        self.duration_seconds = duration;
        self.time_left_seconds = duration;
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.duration_seconds.saturating_sub(self.time_left_seconds)
    }
}

/// 틱 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// 타이머가 멈춰 있음
    Idle,
    Counting,
    /// Focus 만료. 휴식 모드가 장전된 상태 (아직 정지)
    FocusCompleted {
        completed_cycle: u32,
        next_mode: TimerMode,
    },
    /// 휴식 만료. 준비 확인 대기 시작
    BreakCompleted,
}

/// 리셋으로 중단된 Focus 구간
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptedFocus {
    pub elapsed_seconds: u32,
    pub planned_minutes: u32,
}

impl Room {
    /// 타이머 시작. 준비 확인 대기 중이었다면 대기를 해제하고 새 Focus를 시작한다.
    ///
    /// 준비 확인을 해제했으면 `true`.
    pub fn start_timer(&mut self) -> RoomResult<bool> {
        if self.timer.is_running {
            return Err(RoomError::InvalidState("timer is already running".into()));
        }
        let released = self.ready.awaiting;
        if released {
            self.release_barrier();
            self.timer.load(TimerMode::Focus, &self.settings);
        } else if self.timer.time_left_seconds == 0 {
            let mode = self.timer.mode;
            self.timer.load(mode, &self.settings);
        }
        self.timer.is_running = true;
        Ok(released)
    }

    pub fn pause_timer(&mut self) -> RoomResult<()> {
        if !self.timer.is_running {
            return Err(RoomError::InvalidState("timer is not running".into()));
        }
        self.timer.is_running = false;
        Ok(())
    }

    /// 처음 상태(Focus, 1사이클)로 리셋. 진행된 Focus 구간이 있었다면 반환한다.
    pub fn reset_timer(&mut self) -> Option<InterruptedFocus> {
        let interrupted = (self.timer.mode == TimerMode::Focus
            && !self.ready.awaiting
            && self.timer.elapsed_seconds() > 0)
            .then(|| InterruptedFocus {
                elapsed_seconds: self.timer.elapsed_seconds(),
                planned_minutes: self.timer.duration_seconds / 60,
            });

        self.timer.is_running = false;
        self.timer.load(TimerMode::Focus, &self.settings);
        self.timer.cycle_index = 1;
        self.release_barrier();
        interrupted
    }

    pub fn tick(&mut self) -> TickOutcome {
        if !self.timer.is_running {
            return TickOutcome::Idle;
        }
        self.timer.time_left_seconds = self.timer.time_left_seconds.saturating_sub(1);
        if self.timer.time_left_seconds > 0 {
            return TickOutcome::Counting;
        }
        self.expire()
    }

    fn expire(&mut self) -> TickOutcome {
        self.timer.is_running = false;

        if self.timer.mode.is_break() {
            self.timer.load(TimerMode::Focus, &self.settings);
            self.open_barrier();
            return TickOutcome::BreakCompleted;
        }

        self.stats.total_completed_cycles += 1;
        let completed_cycle = self.timer.cycle_index;
        let next_mode = if self.timer.cycle_index >= self.settings.cycles_before_long_break {
            self.timer.cycle_index = 1;
            TimerMode::LongBreak
        } else {
            self.timer.cycle_index += 1;
            TimerMode::ShortBreak
        };
        self.timer.load(next_mode, &self.settings);

        TickOutcome::FocusCompleted {
            completed_cycle,
            next_mode,
        }
    }

    /// Focus 만료 직후 장전된 휴식을 바로 시작
    pub fn begin_break(&mut self) -> bool {
        if self.timer.mode.is_break() && !self.timer.is_running && self.timer.time_left_seconds > 0 {
            self.timer.is_running = true;
            return true;
        }
        false
    }
}
