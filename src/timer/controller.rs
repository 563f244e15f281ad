use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use chrono::Utc;
use log::{error, info};
use serde::Serialize;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time,
};
use uuid::Uuid;

use crate::{
    audio::AlarmHandle,
    db::Database,
    models::{SessionRecord, SessionSummary, SessionType},
    notify,
    sensing::DetectionStatus,
};

use super::state::{Phase, TickOutcome, TimerState};
use super::tally::ActivityTally;

#[derive(Debug, Serialize, Clone)]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub tally: ActivityTally,
    pub status: DetectionStatus,
}

struct Inner {
    state: TimerState,
    tally: ActivityTally,
}

/// Outcome of one advanced second that crossed a phase boundary.
struct PhaseBoundary {
    finished: Phase,
    summary: Option<SessionSummary>,
}

impl Inner {
    /// One elapsed second: account the sampled status against the tally
    /// (Focus only), move the clock, and on phase exhaustion build the
    /// summary and flip to the next phase.
    fn advance(&mut self, status: DetectionStatus) -> Option<PhaseBoundary> {
        if !self.state.running {
            return None;
        }
        if self.state.phase == Phase::Focus && self.state.seconds_remaining > 0 {
            self.tally.record(status);
        }

        match self.state.tick() {
            TickOutcome::PhaseComplete(Phase::Focus) => {
                let summary = SessionSummary {
                    duration_seconds: self.tally.studying_seconds,
                    completed_at: Utc::now(),
                    distraction_minutes: self.tally.distraction_minutes(),
                    was_completed: true,
                };
                self.tally.reset();
                self.state.switch_phase();
                Some(PhaseBoundary {
                    finished: Phase::Focus,
                    summary: Some(summary),
                })
            }
            TickOutcome::PhaseComplete(Phase::Break) => {
                self.state.switch_phase();
                Some(PhaseBoundary {
                    finished: Phase::Break,
                    summary: None,
                })
            }
            TickOutcome::Ticked | TickOutcome::Idle => None,
        }
    }
}

/// Orchestrates the countdown, the activity tally, and the phase-boundary
/// side effects (persistence, alarm, notification).
#[derive(Clone)]
pub struct PhaseController {
    inner: Arc<Mutex<Inner>>,
    db: Database,
    user_id: Option<String>,
    status_rx: watch::Receiver<DetectionStatus>,
    alarm: AlarmHandle,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    tick_interval: Duration,
}

impl PhaseController {
    pub fn new(
        db: Database,
        user_id: Option<String>,
        status_rx: watch::Receiver<DetectionStatus>,
        alarm: AlarmHandle,
        focus_minutes: u32,
        break_minutes: u32,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: TimerState::new(focus_minutes, break_minutes),
                tally: ActivityTally::default(),
            })),
            db,
            user_id,
            status_rx,
            alarm,
            ticker: Arc::new(Mutex::new(None)),
            tick_interval: Duration::from_secs(1),
        }
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        let guard = self.inner.lock().await;
        TimerSnapshot {
            state: guard.state.clone(),
            tally: guard.tally,
            status: *self.status_rx.borrow(),
        }
    }

    /// Start or resume the countdown. Counters zero only when the phase is
    /// fresh (full duration remaining); resuming a paused phase keeps them.
    pub async fn start(&self) -> Result<()> {
        {
            let mut guard = self.inner.lock().await;
            if guard.state.running {
                return Err(anyhow!("timer already running"));
            }
            if guard.state.start() {
                guard.tally.reset();
                info!("{} phase started", guard.state.phase.as_str());
            } else {
                info!("{} phase resumed", guard.state.phase.as_str());
            }
        }
        self.spawn_ticker().await;
        Ok(())
    }

    /// Idempotent; the countdown and counters are preserved.
    pub async fn pause(&self) {
        let mut guard = self.inner.lock().await;
        if guard.state.running {
            guard.state.pause();
            info!("Timer paused");
        }
    }

    pub async fn reset(&self) {
        let mut guard = self.inner.lock().await;
        guard.state.reset();
        guard.tally.reset();
        info!("Timer reset");
    }

    pub async fn set_focus_minutes(&self, minutes: u32) -> Result<u32> {
        let mut guard = self.inner.lock().await;
        if !guard.state.set_focus_minutes(minutes) {
            return Err(anyhow!("durations cannot be edited while the timer is running"));
        }
        Ok(guard.state.focus_minutes)
    }

    pub async fn set_break_minutes(&self, minutes: u32) -> Result<u32> {
        let mut guard = self.inner.lock().await;
        if !guard.state.set_break_minutes(minutes) {
            return Err(anyhow!("durations cannot be edited while the timer is running"));
        }
        Ok(guard.state.break_minutes)
    }

    pub async fn teardown(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }

    /// Advance one second. Returns false once the clock is no longer
    /// running, which lets the ticker task retire itself after a pause.
    async fn tick_once(&self) -> bool {
        let (boundary, state_after) = {
            let mut guard = self.inner.lock().await;
            if !guard.state.running {
                return false;
            }
            let status = *self.status_rx.borrow();
            let boundary = guard.advance(status);
            (boundary, guard.state.clone())
        };

        if let Some(boundary) = boundary {
            self.on_phase_complete(boundary, &state_after);
        }
        true
    }

    fn on_phase_complete(&self, boundary: PhaseBoundary, state_after: &TimerState) {
        match boundary.finished {
            Phase::Focus => {
                if let Some(summary) = boundary.summary {
                    self.persist_summary(summary);
                }
                notify::phase_complete(
                    "Focus session complete!",
                    &format!("Take a break for {} minutes.", state_after.break_minutes),
                );
            }
            Phase::Break => {
                notify::phase_complete(
                    "Break ended!",
                    &format!(
                        "Start your next focus session for {} minutes.",
                        state_after.focus_minutes
                    ),
                );
            }
        }
        self.alarm.play_alarm();
        info!(
            "Phase complete: {} -> {}",
            boundary.finished.as_str(),
            state_after.phase.as_str()
        );
    }

    /// Fire-and-forget hand-off to persistence. At-most-once: a failed save
    /// is logged and dropped, the next phase starts regardless.
    fn persist_summary(&self, summary: SessionSummary) {
        let Some(user_id) = self.user_id.clone() else {
            info!("No user attached; session not saved");
            return;
        };

        let record = SessionRecord {
            id: Uuid::new_v4().to_string(),
            user_id,
            duration_seconds: summary.duration_seconds,
            completed_at: summary.completed_at,
            session_type: SessionType::Focus,
            distraction_count: summary.distraction_minutes,
            was_completed: summary.was_completed,
            created_at: summary.completed_at,
        };

        let db = self.db.clone();
        tokio::spawn(async move {
            if let Err(err) = db.create_session(&record).await {
                error!("Failed to save session: {err:?}");
            }
        });
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let controller = self.clone();
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            // The first interval tick resolves immediately; consume it so
            // the countdown loses its first second a full interval after
            // start rather than instantly.
            interval.tick().await;
            loop {
                interval.tick().await;
                if !controller.tick_once().await {
                    break;
                }
            }
        });

        *ticker_guard = Some(handle);
    }
}
