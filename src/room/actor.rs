//! 방 액터
//!
//! 방 하나당 tokio 태스크 하나가 `Room`을 단독 소유한다.
//! 클라이언트 명령과 1초 틱은 모두 이 태스크에서 도착 순서대로 처리되므로
//! 방 상태에 락이 필요 없다. 이벤트는 처리 순서 그대로 각 멤버 채널에 전달된다.

use super::chat::validate_text;
use super::membership::{Departure, MemberProfile};
use super::secret::verify_secret;
use super::timer::{InterruptedFocus, TickOutcome};
use super::{
    now_millis, ChatEvent, MemberInfo, ReadySummary, Room, RoomSettings, RoomSnapshot, RoomTask,
    SessionId, SettingsUpdate, TimerMode, UserId,
};
use crate::config::Config;
use crate::error::{RoomError, RoomResult};
use crate::protocol::ServerMessage;
use crate::registry::RoomRegistry;
use crate::services::{call_with_timeout, FocusSession, RoomVisit, Services};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// 방 메일박스 크기
const ROOM_CHANNEL_BUFFER: usize = 256;

/// 멤버 연결로 나가는 채널
pub type MemberSender = mpsc::UnboundedSender<ServerMessage>;

type Reply<T> = oneshot::Sender<RoomResult<T>>;

/// 입장 요청 (신원 + 이벤트 수신 채널)
pub struct NewMember {
    pub profile: MemberProfile,
    pub sender: MemberSender,
}

pub(crate) enum RoomCommand {
    Join {
        member: NewMember,
        secret: Option<String>,
        respond_to: Reply<RoomSnapshot>,
    },
    Leave {
        session_id: SessionId,
        respond_to: Reply<()>,
    },
    Kick {
        caller: SessionId,
        target: SessionId,
        respond_to: Reply<()>,
    },
    TransferHost {
        caller: SessionId,
        new_host_user_id: UserId,
        respond_to: Reply<()>,
    },
    StartTimer {
        caller: SessionId,
        respond_to: Reply<()>,
    },
    PauseTimer {
        caller: SessionId,
        respond_to: Reply<()>,
    },
    ResetTimer {
        caller: SessionId,
        respond_to: Reply<()>,
    },
    MemberReady {
        session_id: SessionId,
        respond_to: Reply<ReadySummary>,
    },
    UpdateSettings {
        caller: SessionId,
        settings: SettingsUpdate,
        respond_to: Reply<RoomSettings>,
    },
    SetTask {
        caller: SessionId,
        task_ref: String,
        respond_to: Reply<RoomTask>,
    },
    CheckSubtask {
        session_id: SessionId,
        subtask_id: i64,
        checked: bool,
        respond_to: Reply<RoomTask>,
    },
    SendMessage {
        session_id: SessionId,
        text: String,
        respond_to: Reply<ChatEvent>,
    },
    #[cfg(test)]
    Snapshot { respond_to: Reply<RoomSnapshot> },
}

/// 방 액터 핸들
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: String,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// 액터가 종료되었는지
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub(crate) fn same_channel(&self, other: &mpsc::Sender<RoomCommand>) -> bool {
        self.sender.same_channel(other)
    }

    /// 명령 전송 후 응답 대기. 액터가 이미 종료되었으면 `NotFound`.
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> RoomCommand) -> RoomResult<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| RoomError::NotFound(self.room_id.clone()))?;
        rx.await
            .map_err(|_| RoomError::NotFound(self.room_id.clone()))?
    }

    pub async fn join(&self, member: NewMember, secret: Option<String>) -> RoomResult<RoomSnapshot> {
        self.request(|respond_to| RoomCommand::Join {
            member,
            secret,
            respond_to,
        })
        .await
    }

    /// 모르는 세션이어도 성공
    pub async fn leave(&self, session_id: &str) -> RoomResult<()> {
        let session_id = session_id.to_string();
        self.request(|respond_to| RoomCommand::Leave {
            session_id,
            respond_to,
        })
        .await
    }

    pub async fn kick(&self, caller: &str, target: &str) -> RoomResult<()> {
        let (caller, target) = (caller.to_string(), target.to_string());
        self.request(|respond_to| RoomCommand::Kick {
            caller,
            target,
            respond_to,
        })
        .await
    }

    pub async fn transfer_host(&self, caller: &str, new_host_user_id: UserId) -> RoomResult<()> {
        let caller = caller.to_string();
        self.request(|respond_to| RoomCommand::TransferHost {
            caller,
            new_host_user_id,
            respond_to,
        })
        .await
    }

    pub async fn start_timer(&self, caller: &str) -> RoomResult<()> {
        let caller = caller.to_string();
        self.request(|respond_to| RoomCommand::StartTimer { caller, respond_to })
            .await
    }

    pub async fn pause_timer(&self, caller: &str) -> RoomResult<()> {
        let caller = caller.to_string();
        self.request(|respond_to| RoomCommand::PauseTimer { caller, respond_to })
            .await
    }

    pub async fn reset_timer(&self, caller: &str) -> RoomResult<()> {
        let caller = caller.to_string();
        self.request(|respond_to| RoomCommand::ResetTimer { caller, respond_to })
            .await
    }

    pub async fn member_ready(&self, session_id: &str) -> RoomResult<ReadySummary> {
        let session_id = session_id.to_string();
        self.request(|respond_to| RoomCommand::MemberReady {
            session_id,
            respond_to,
        })
        .await
    }

    pub async fn update_settings(
        &self,
        caller: &str,
        settings: SettingsUpdate,
    ) -> RoomResult<RoomSettings> {
        let caller = caller.to_string();
        self.request(|respond_to| RoomCommand::UpdateSettings {
            caller,
            settings,
            respond_to,
        })
        .await
    }

    pub async fn set_task(&self, caller: &str, task_ref: &str) -> RoomResult<RoomTask> {
        let (caller, task_ref) = (caller.to_string(), task_ref.to_string());
        self.request(|respond_to| RoomCommand::SetTask {
            caller,
            task_ref,
            respond_to,
        })
        .await
    }

    pub async fn check_subtask(
        &self,
        session_id: &str,
        subtask_id: i64,
        checked: bool,
    ) -> RoomResult<RoomTask> {
        let session_id = session_id.to_string();
        self.request(|respond_to| RoomCommand::CheckSubtask {
            session_id,
            subtask_id,
            checked,
            respond_to,
        })
        .await
    }

    pub async fn send_message(&self, session_id: &str, text: &str) -> RoomResult<ChatEvent> {
        let (session_id, text) = (session_id.to_string(), text.to_string());
        self.request(|respond_to| RoomCommand::SendMessage {
            session_id,
            text,
            respond_to,
        })
        .await
    }

    #[cfg(test)]
    pub async fn snapshot(&self) -> RoomResult<RoomSnapshot> {
        self.request(|respond_to| RoomCommand::Snapshot { respond_to })
            .await
    }
}

/// 진행 중인 Focus 구간
#[derive(Debug, Clone, Copy)]
struct FocusRun {
    started_at: u64,
    duration_seconds: u32,
}

pub(crate) struct RoomActor {
    room: Room,
    receiver: mpsc::Receiver<RoomCommand>,
    /// 레지스트리에서 자신을 제거할 때 비교용 (채널을 살려두지 않음)
    mailbox: mpsc::WeakSender<RoomCommand>,
    subscribers: HashMap<SessionId, MemberSender>,
    /// 타이머가 돌 때만 존재
    ticker: Option<Interval>,
    /// 방이 비었을 때만 존재
    grace_deadline: Option<Instant>,
    current_focus: Option<FocusRun>,
    services: Services,
    config: Arc<Config>,
    registry: RoomRegistry,
}

impl RoomActor {
    /// 첫 멤버(생성자)를 포함한 방 액터 생성
    pub(crate) fn spawn(
        room: Room,
        creator: NewMember,
        registry: RoomRegistry,
    ) -> (RoomHandle, RoomSnapshot) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);

        let mut actor = Self {
            room,
            receiver,
            mailbox: sender.downgrade(),
            subscribers: HashMap::new(),
            ticker: None,
            grace_deadline: None,
            current_focus: None,
            services: registry.services().clone(),
            config: registry.config().clone(),
            registry,
        };

        let snapshot = actor.admit(creator);
        let handle = RoomHandle {
            room_id: actor.room.id.clone(),
            sender,
        };
        tokio::spawn(actor.run());

        (handle, snapshot)
    }

    async fn run(mut self) {
        tracing::info!(room_id = %self.room.id, private = self.room.is_private(), "Room actor started");

        loop {
            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                () = next_tick(&mut self.ticker) => self.on_tick().await,
                () = grace_expired(self.grace_deadline) => {
                    if self.close_if_abandoned() {
                        break;
                    }
                }
            }
        }

        tracing::info!(
            room_id = %self.room.id,
            total_cycles = self.room.stats.total_completed_cycles,
            lifetime_secs = now_millis().saturating_sub(self.room.created_at) / 1000,
            "Room actor stopped"
        );
    }

    async fn handle_command(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Join {
                member,
                secret,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_join(member, secret));
            }
            RoomCommand::Leave {
                session_id,
                respond_to,
            } => {
                self.handle_leave(&session_id).await;
                let _ = respond_to.send(Ok(()));
            }
            RoomCommand::Kick {
                caller,
                target,
                respond_to,
            } => {
                let result = self.handle_kick(&caller, &target).await;
                let _ = respond_to.send(result);
            }
            RoomCommand::TransferHost {
                caller,
                new_host_user_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_transfer_host(&caller, new_host_user_id));
            }
            RoomCommand::StartTimer { caller, respond_to } => {
                let _ = respond_to.send(self.handle_start(&caller));
            }
            RoomCommand::PauseTimer { caller, respond_to } => {
                let _ = respond_to.send(self.handle_pause(&caller));
            }
            RoomCommand::ResetTimer { caller, respond_to } => {
                let result = self.handle_reset(&caller).await;
                let _ = respond_to.send(result);
            }
            RoomCommand::MemberReady {
                session_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_ready(&session_id));
            }
            RoomCommand::UpdateSettings {
                caller,
                settings,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_update_settings(&caller, settings));
            }
            RoomCommand::SetTask {
                caller,
                task_ref,
                respond_to,
            } => {
                let result = self.handle_set_task(&caller, &task_ref).await;
                let _ = respond_to.send(result);
            }
            RoomCommand::CheckSubtask {
                session_id,
                subtask_id,
                checked,
                respond_to,
            } => {
                let result = self.handle_check_subtask(&session_id, subtask_id, checked).await;
                let _ = respond_to.send(result);
            }
            RoomCommand::SendMessage {
                session_id,
                text,
                respond_to,
            } => {
                let result = self.handle_send_message(&session_id, &text).await;
                let _ = respond_to.send(result);
            }
            #[cfg(test)]
            RoomCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(Ok(self.room.snapshot(None)));
            }
        }
    }

    // ── 멤버십 ───────────────────────────────────────────────

    /// 멤버 추가 후 본인에게 스냅샷, 나머지에게 입장 알림
    fn admit(&mut self, member: NewMember) -> RoomSnapshot {
        let NewMember { profile, sender } = member;
        let session_id = profile.session_id.clone();
        let was_empty = self.room.is_empty();

        let info = self.room.add_member(profile);
        self.subscribers.insert(session_id.clone(), sender);

        if was_empty && self.grace_deadline.take().is_some() {
            tracing::info!(room_id = %self.room.id, host = info.user_id, "Empty room revived");
        }

        let snapshot = self.room.snapshot(Some(&session_id));
        self.send_to(&session_id, ServerMessage::RoomJoined(snapshot.clone()));
        self.broadcast_except(&session_id, ServerMessage::UserJoined { member: info.clone() });

        tracing::info!(
            room_id = %self.room.id,
            session_id = %session_id,
            user_id = info.user_id,
            members = self.room.members.len(),
            "User joined room"
        );
        snapshot
    }

    fn handle_join(&mut self, member: NewMember, secret: Option<String>) -> RoomResult<RoomSnapshot> {
        member.profile.validate()?;

        if let Some(hash) = &self.room.secret_hash {
            let pepper = &self.config.room.secret_pepper;
            if !verify_secret(pepper, &self.room.id, secret.as_deref(), hash) {
                tracing::warn!(room_id = %self.room.id, user_id = member.profile.user_id, "Secret mismatch");
                return Err(RoomError::SecretMismatch);
            }
        }

        // 같은 연결이 다시 입장하면 스냅샷만 재전송
        let session_id = member.profile.session_id.clone();
        if self.room.members.contains_key(&session_id) {
            self.subscribers.insert(session_id.clone(), member.sender);
            let snapshot = self.room.snapshot(Some(&session_id));
            self.send_to(&session_id, ServerMessage::RoomJoined(snapshot.clone()));
            return Ok(snapshot);
        }

        Ok(self.admit(member))
    }

    async fn handle_leave(&mut self, session_id: &str) {
        let Some(departure) = self.room.remove_member(session_id) else {
            tracing::debug!(room_id = %self.room.id, session_id = %session_id, "Leave for unknown session ignored");
            return;
        };
        self.subscribers.remove(session_id);

        let member = &departure.member;
        self.broadcast(ServerMessage::UserLeft {
            sid: member.session_id.clone(),
            user_id: member.user_id,
            username: member.username.clone(),
        });
        tracing::info!(
            room_id = %self.room.id,
            session_id = %session_id,
            remaining = self.room.members.len(),
            "User left room"
        );

        self.after_departure(departure).await;
    }

    async fn handle_kick(&mut self, caller: &str, target: &str) -> RoomResult<()> {
        let departure = self.room.kick(caller, target)?;
        let member = &departure.member;
        let notice = ServerMessage::UserKicked {
            sid: member.session_id.clone(),
            user_id: member.user_id,
            username: member.username.clone(),
        };

        // 구독을 먼저 해제해 대상은 마지막 알림을 한 번만 받는다
        let target_sender = self.subscribers.remove(target);
        self.broadcast(notice.clone());
        if let Some(sender) = target_sender {
            let _ = sender.send(notice);
        }

        tracing::info!(
            room_id = %self.room.id,
            target = %target,
            user_id = member.user_id,
            "Host kicked user"
        );
        self.after_departure(departure).await;
        Ok(())
    }

    fn handle_transfer_host(&mut self, caller: &str, new_host_user_id: UserId) -> RoomResult<()> {
        self.room.transfer_host(caller, new_host_user_id)?;
        tracing::info!(room_id = %self.room.id, new_host = new_host_user_id, "Host transferred");
        self.broadcast(ServerMessage::NewHostAssigned { new_host_user_id });
        Ok(())
    }

    async fn after_departure(&mut self, departure: Departure) {
        self.record_visit(&departure.member).await;

        if let Some(new_host_user_id) = departure.new_host {
            tracing::info!(room_id = %self.room.id, new_host = new_host_user_id, "Host migrated");
            self.broadcast(ServerMessage::NewHostAssigned { new_host_user_id });
        }

        if departure.now_empty {
            self.freeze();
        } else if self.room.ready.awaiting {
            self.broadcast(ServerMessage::ReadyStatusUpdate(self.room.ready_summary()));
        }
    }

    /// 빈 방: 타이머를 멈추고 유예 시간 후 삭제
    fn freeze(&mut self) {
        if self.room.timer.is_running {
            let _ = self.room.pause_timer();
        }
        self.ticker = None;
        let grace = self.config.room.grace_period();
        self.grace_deadline = Some(Instant::now() + grace);
        tracing::info!(room_id = %self.room.id, grace_secs = grace.as_secs(), "Room empty, timer frozen");
    }

    fn close_if_abandoned(&mut self) -> bool {
        self.grace_deadline = None;
        if !self.room.is_empty() {
            return false;
        }
        if let Some(sender) = self.mailbox.upgrade() {
            self.registry.remove_if_same(&self.room.id, &sender);
        }
        self.receiver.close();
        tracing::info!(room_id = %self.room.id, "Room deleted after grace period");
        true
    }

    async fn record_visit(&self, member: &MemberInfo) {
        let visit = RoomVisit {
            room_id: self.room.id.clone(),
            room_name: self.room.name.clone(),
            joined_at: member.joined_at,
            left_at: now_millis(),
        };
        let history = self.services.history.clone();
        let result = call_with_timeout(
            self.external_timeout(),
            "session history",
            history.record_visit(member.user_id, visit),
        )
        .await;
        if let Err(e) = result {
            tracing::warn!(room_id = %self.room.id, user_id = member.user_id, error = %e, "Failed to record room visit");
        }
    }

    // ── 타이머 ───────────────────────────────────────────────

    fn handle_start(&mut self, caller: &str) -> RoomResult<()> {
        self.room.require_host(caller)?;
        let released = self.room.start_timer()?;

        if self.room.timer.mode == TimerMode::Focus && self.current_focus.is_none() {
            let elapsed_ms = u64::from(self.room.timer.elapsed_seconds()) * 1000;
            self.current_focus = Some(FocusRun {
                started_at: now_millis().saturating_sub(elapsed_ms),
                duration_seconds: self.room.timer.duration_seconds,
            });
        }
        self.arm_ticker();

        tracing::info!(
            room_id = %self.room.id,
            mode = ?self.room.timer.mode,
            released_ready_check = released,
            "Timer started"
        );
        self.broadcast_timer();
        Ok(())
    }

    fn handle_pause(&mut self, caller: &str) -> RoomResult<()> {
        self.room.require_host(caller)?;
        self.room.pause_timer()?;
        self.ticker = None;
        tracing::info!(room_id = %self.room.id, time_left = self.room.timer.time_left_seconds, "Timer paused");
        self.broadcast_timer();
        Ok(())
    }

    async fn handle_reset(&mut self, caller: &str) -> RoomResult<()> {
        self.room.require_host(caller)?;
        let interrupted = self.room.reset_timer();
        self.ticker = None;
        let run = self.current_focus.take();

        if let Some(interrupted) = interrupted {
            if u64::from(interrupted.elapsed_seconds) >= self.config.reward.min_partial_secs {
                self.record_partial_focus(interrupted, run).await;
            }
        }

        tracing::info!(room_id = %self.room.id, "Timer reset");
        self.broadcast_timer();
        Ok(())
    }

    fn handle_ready(&mut self, session_id: &str) -> RoomResult<ReadySummary> {
        let summary = self.room.mark_ready(session_id)?;
        self.broadcast(ServerMessage::ReadyStatusUpdate(summary));
        Ok(summary)
    }

    fn handle_update_settings(&mut self, caller: &str, update: SettingsUpdate) -> RoomResult<RoomSettings> {
        self.room.require_host(caller)?;
        let settings = update.validate()?;
        let clamped = self.room.apply_settings(settings);

        tracing::info!(room_id = %self.room.id, settings = ?settings, "Room settings updated");
        self.broadcast(ServerMessage::RoomSettingsUpdated(settings));
        if clamped {
            self.broadcast_timer();
        }
        Ok(settings)
    }

    fn arm_ticker(&mut self) {
        let period = self.config.room.tick_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    async fn on_tick(&mut self) {
        match self.room.tick() {
            TickOutcome::Idle => self.ticker = None,
            TickOutcome::Counting => self.broadcast_timer(),
            TickOutcome::FocusCompleted {
                completed_cycle,
                next_mode,
            } => {
                self.ticker = None;
                tracing::info!(
                    room_id = %self.room.id,
                    cycle = completed_cycle,
                    next_mode = ?next_mode,
                    total_cycles = self.room.stats.total_completed_cycles,
                    "Focus completed"
                );

                self.broadcast(ServerMessage::RoomStatsUpdated(self.room.stats.clone()));
                self.fire_reward_hook(completed_cycle).await;
                let notice = self.room.system_event(format!(
                    "Focus session complete! Everyone earned +{} 🍅",
                    self.config.reward.tomatoes_per_cycle
                ));
                self.broadcast(ServerMessage::NewMessage(notice));
                self.broadcast_timer();

                if self.config.room.auto_start_breaks && self.room.begin_break() {
                    self.arm_ticker();
                    self.broadcast_timer();
                }
            }
            TickOutcome::BreakCompleted => {
                self.ticker = None;
                tracing::info!(room_id = %self.room.id, "Break finished, waiting for ready check");
                self.broadcast_timer();
                self.broadcast(ServerMessage::ShowReadyCheck {
                    total_members: self.room.members.len(),
                });
            }
        }
    }

    // ── 보상 ─────────────────────────────────────────────────

    fn focus_session(&self, run: Option<FocusRun>, elapsed_seconds: Option<u32>) -> FocusSession {
        let ended_at = now_millis();
        let run = run.unwrap_or(FocusRun {
            started_at: ended_at,
            duration_seconds: self.room.settings.focus_minutes * 60,
        });
        FocusSession {
            room_id: self.room.id.clone(),
            task_id: self.room.task.task_id.clone(),
            started_at: run.started_at,
            ended_at,
            planned_minutes: run.duration_seconds / 60,
            elapsed_seconds: elapsed_seconds.unwrap_or(run.duration_seconds),
        }
    }

    /// Focus 완료 시 현재 멤버 전원에게 보상
    async fn fire_reward_hook(&mut self, cycle: u32) {
        let run = self.current_focus.take();
        let session = self.focus_session(run, None);
        let amount = self.config.reward.tomatoes_per_cycle;
        let limit = self.external_timeout();
        let ledger = self.services.rewards.clone();

        let credits = self.room.distinct_user_ids().into_iter().map(|user_id| {
            let ledger = ledger.clone();
            let session = session.clone();
            async move {
                let result = call_with_timeout(
                    limit,
                    "reward ledger",
                    ledger.credit_focus(user_id, amount, &session),
                )
                .await;
                (user_id, result)
            }
        });

        for (user_id, result) in join_all(credits).await {
            match result {
                Ok(balance) => {
                    tracing::info!(room_id = %self.room.id, user_id = user_id, balance = balance, "Tomato rewarded");
                    self.send_to_user(
                        user_id,
                        ServerMessage::TomatoRewarded {
                            user_id,
                            amount,
                            cycle,
                            balance,
                        },
                    );
                }
                Err(e) => {
                    tracing::warn!(room_id = %self.room.id, user_id = user_id, error = %e, "Reward credit failed");
                }
            }
        }
    }

    async fn record_partial_focus(&self, interrupted: InterruptedFocus, run: Option<FocusRun>) {
        let mut session = self.focus_session(run, Some(interrupted.elapsed_seconds));
        session.planned_minutes = interrupted.planned_minutes;
        let limit = self.external_timeout();

        for user_id in self.room.distinct_user_ids() {
            let ledger = self.services.rewards.clone();
            let result = call_with_timeout(limit, "reward ledger", ledger.record_partial(user_id, &session)).await;
            if let Err(e) = result {
                tracing::warn!(room_id = %self.room.id, user_id = user_id, error = %e, "Failed to record partial focus session");
            }
        }
    }

    // ── 작업 ─────────────────────────────────────────────────

    async fn handle_set_task(&mut self, caller: &str, task_ref: &str) -> RoomResult<RoomTask> {
        self.room.require_host(caller)?;
        let task_ref = task_ref.trim();
        if task_ref.is_empty() {
            return Err(RoomError::Validation("task id is required".into()));
        }

        let tasks = self.services.tasks.clone();
        match call_with_timeout(self.external_timeout(), "task store", tasks.load_task(task_ref)).await {
            Ok(record) => {
                let task = self.room.apply_task(record).clone();
                tracing::info!(room_id = %self.room.id, task_id = %task_ref, subtasks = task.subtasks.len(), "Room task set");
                self.broadcast(ServerMessage::RoomTaskUpdated(task.clone()));
                Ok(task)
            }
            Err(e) => {
                tracing::warn!(room_id = %self.room.id, task_id = %task_ref, error = %e, "Failed to load task");
                self.rebroadcast_task();
                Err(e)
            }
        }
    }

    async fn handle_check_subtask(
        &mut self,
        session_id: &str,
        subtask_id: i64,
        checked: bool,
    ) -> RoomResult<RoomTask> {
        self.room.require_member(session_id)?;
        self.room.require_subtask(subtask_id)?;

        let tasks = self.services.tasks.clone();
        let write = tasks.set_subtask_checked(subtask_id, checked);
        match call_with_timeout(self.external_timeout(), "task store", write).await {
            Ok(confirmed) => {
                self.room.apply_subtask(confirmed);
                tracing::debug!(room_id = %self.room.id, subtask_id = subtask_id, checked = checked, "Subtask updated");
                let task = self.room.task.clone();
                self.broadcast(ServerMessage::RoomTaskUpdated(task.clone()));
                Ok(task)
            }
            Err(e) => {
                // 낙관적으로 바꾼 클라이언트 상태를 되돌리기 위해 마지막 확정 상태 재전송
                tracing::warn!(room_id = %self.room.id, subtask_id = subtask_id, error = %e, "Subtask write failed");
                self.rebroadcast_task();
                Err(e)
            }
        }
    }

    fn rebroadcast_task(&self) {
        self.broadcast(ServerMessage::RoomTaskUpdated(self.room.task.clone()));
    }

    // ── 채팅 ─────────────────────────────────────────────────

    async fn handle_send_message(&mut self, session_id: &str, text: &str) -> RoomResult<ChatEvent> {
        let sender = self.room.require_member(session_id)?.clone();
        let text = validate_text(text, self.config.room.max_chat_length)?;

        let identity = self.services.identity.clone();
        let cosmetics = match call_with_timeout(
            self.external_timeout(),
            "identity store",
            identity.cosmetics(sender.user_id),
        )
        .await
        {
            Ok(cosmetics) => cosmetics,
            Err(e) => {
                tracing::warn!(room_id = %self.room.id, user_id = sender.user_id, error = %e, "Cosmetics lookup failed");
                None
            }
        };

        let event = self.room.chat_event(&sender, text, cosmetics);
        tracing::debug!(room_id = %self.room.id, seq = event.seq, "Chat message relayed");
        self.broadcast(ServerMessage::NewMessage(event.clone()));
        Ok(event)
    }

    // ── 전송 ─────────────────────────────────────────────────

    fn external_timeout(&self) -> Duration {
        self.config.room.external_timeout()
    }

    fn send_to(&self, session_id: &str, message: ServerMessage) {
        if let Some(sender) = self.subscribers.get(session_id) {
            if sender.send(message).is_err() {
                tracing::debug!(room_id = %self.room.id, session_id = %session_id, "Subscriber channel closed");
            }
        }
    }

    fn send_to_user(&self, user_id: UserId, message: ServerMessage) {
        for member in self.room.members.values().filter(|m| m.user_id == user_id) {
            self.send_to(&member.session_id, message.clone());
        }
    }

    fn broadcast(&self, message: ServerMessage) {
        for session_id in self.subscribers.keys() {
            self.send_to(session_id, message.clone());
        }
    }

    fn broadcast_except(&self, except: &str, message: ServerMessage) {
        for session_id in self.subscribers.keys().filter(|sid| sid.as_str() != except) {
            self.send_to(session_id, message.clone());
        }
    }

    fn broadcast_timer(&self) {
        self.broadcast(ServerMessage::TimerUpdate(self.room.timer.clone()));
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn grace_expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
