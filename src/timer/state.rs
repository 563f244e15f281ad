use serde::{Deserialize, Serialize};

pub const FOCUS_DEFAULT_MINUTES: u32 = 25;
pub const BREAK_DEFAULT_MINUTES: u32 = 5;

pub const FOCUS_MINUTES_RANGE: (u32, u32) = (1, 60);
pub const BREAK_MINUTES_RANGE: (u32, u32) = (1, 30);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Focus,
    Break,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Focus => "Focus",
            Phase::Break => "Break",
        }
    }
}

/// Result of advancing the clock by one second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Clock is paused; nothing moved.
    Idle,
    /// One second elapsed, phase still has time left.
    Ticked,
    /// The countdown hit zero this tick; carries the phase that finished.
    PhaseComplete(Phase),
}

/// Countdown state for the active phase.
///
/// `seconds_remaining` is reset to the full configured duration whenever the
/// phase changes, on explicit reset, and when the active phase's duration is
/// edited while paused. Pausing never touches it, so resuming continues the
/// same countdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub phase: Phase,
    pub seconds_remaining: u32,
    pub running: bool,
    pub focus_minutes: u32,
    pub break_minutes: u32,
}

impl Default for TimerState {
    fn default() -> Self {
        Self::new(FOCUS_DEFAULT_MINUTES, BREAK_DEFAULT_MINUTES)
    }
}

fn clamp_minutes(minutes: u32, range: (u32, u32)) -> u32 {
    minutes.clamp(range.0, range.1)
}

impl TimerState {
    pub fn new(focus_minutes: u32, break_minutes: u32) -> Self {
        let focus_minutes = clamp_minutes(focus_minutes, FOCUS_MINUTES_RANGE);
        let break_minutes = clamp_minutes(break_minutes, BREAK_MINUTES_RANGE);
        Self {
            phase: Phase::Focus,
            seconds_remaining: focus_minutes * 60,
            running: false,
            focus_minutes,
            break_minutes,
        }
    }

    pub fn phase_duration_secs(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Focus => self.focus_minutes * 60,
            Phase::Break => self.break_minutes * 60,
        }
    }

    /// True when the current phase has not lost any seconds yet, i.e. a
    /// start from here is a fresh phase rather than a resume.
    pub fn at_full_duration(&self) -> bool {
        self.seconds_remaining == self.phase_duration_secs(self.phase)
    }

    /// Returns true when this start opens a fresh phase (activity counters
    /// must be zeroed by the caller); false when it resumes a paused one.
    pub fn start(&mut self) -> bool {
        let fresh = self.at_full_duration();
        self.running = true;
        fresh
    }

    /// Idempotent; remaining time is preserved.
    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn reset(&mut self) {
        self.running = false;
        self.seconds_remaining = self.phase_duration_secs(self.phase);
    }

    /// Advance the countdown by one second. On reaching zero the finished
    /// phase is reported and the caller is expected to assign the next one
    /// via [`TimerState::switch_phase`].
    pub fn tick(&mut self) -> TickOutcome {
        if !self.running || self.seconds_remaining == 0 {
            return TickOutcome::Idle;
        }
        self.seconds_remaining -= 1;
        if self.seconds_remaining == 0 {
            TickOutcome::PhaseComplete(self.phase)
        } else {
            TickOutcome::Ticked
        }
    }

    /// Flip Focus<->Break and load the new phase's full duration.
    pub fn switch_phase(&mut self) {
        self.phase = match self.phase {
            Phase::Focus => Phase::Break,
            Phase::Break => Phase::Focus,
        };
        self.seconds_remaining = self.phase_duration_secs(self.phase);
    }

    /// Clamped to [1, 60]. Rejected while the clock is running.
    pub fn set_focus_minutes(&mut self, minutes: u32) -> bool {
        if self.running {
            return false;
        }
        self.focus_minutes = clamp_minutes(minutes, FOCUS_MINUTES_RANGE);
        if self.phase == Phase::Focus {
            self.seconds_remaining = self.focus_minutes * 60;
        }
        true
    }

    /// Clamped to [1, 30]. Rejected while the clock is running.
    pub fn set_break_minutes(&mut self, minutes: u32) -> bool {
        if self.running {
            return false;
        }
        self.break_minutes = clamp_minutes(minutes, BREAK_MINUTES_RANGE);
        if self.phase == Phase::Break {
            self.seconds_remaining = self.break_minutes * 60;
        }
        true
    }
}

/// mm:ss rendering used by the status line.
pub fn format_clock(total_seconds: u64) -> String {
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_and_resume_preserve_remaining_seconds() {
        let mut state = TimerState::default();
        let initial = state.seconds_remaining;

        state.start();
        for _ in 0..10 {
            assert_eq!(state.tick(), TickOutcome::Ticked);
        }
        state.pause();
        for _ in 0..5 {
            assert_eq!(state.tick(), TickOutcome::Idle);
        }
        state.start();
        state.tick();

        assert_eq!(state.seconds_remaining, initial - 11);
    }

    #[test]
    fn pause_is_idempotent() {
        let mut state = TimerState::default();
        state.start();
        state.tick();
        let remaining = state.seconds_remaining;
        state.pause();
        state.pause();
        assert!(!state.running);
        assert_eq!(state.seconds_remaining, remaining);
    }

    #[test]
    fn reset_restores_full_duration_and_stops_the_clock() {
        let mut state = TimerState::new(25, 5);
        state.start();
        for _ in 0..100 {
            state.tick();
        }
        state.reset();
        assert!(!state.running);
        assert_eq!(state.seconds_remaining, 25 * 60);
    }

    #[test]
    fn countdown_reports_completion_exactly_at_zero() {
        let mut state = TimerState::new(1, 5);
        state.start();
        for _ in 0..59 {
            assert_eq!(state.tick(), TickOutcome::Ticked);
        }
        assert_eq!(state.tick(), TickOutcome::PhaseComplete(Phase::Focus));
        // Stays parked at zero until the next phase is assigned.
        assert_eq!(state.tick(), TickOutcome::Idle);

        state.switch_phase();
        assert_eq!(state.phase, Phase::Break);
        assert_eq!(state.seconds_remaining, 5 * 60);
    }

    #[test]
    fn phases_alternate_indefinitely() {
        let mut state = TimerState::new(1, 1);
        state.start();
        for expected in [Phase::Focus, Phase::Break, Phase::Focus] {
            let mut completed = None;
            for _ in 0..60 {
                if let TickOutcome::PhaseComplete(phase) = state.tick() {
                    completed = Some(phase);
                }
            }
            assert_eq!(completed, Some(expected));
            state.switch_phase();
        }
    }

    #[test]
    fn duration_edits_while_running_are_rejected() {
        let mut state = TimerState::new(25, 5);
        state.start();
        assert!(!state.set_focus_minutes(10));
        assert!(!state.set_break_minutes(10));
        assert_eq!(state.focus_minutes, 25);
        assert_eq!(state.break_minutes, 5);
        assert_eq!(state.seconds_remaining, 25 * 60);
    }

    #[test]
    fn duration_edits_clamp_to_bounds() {
        let mut state = TimerState::new(25, 5);
        assert!(state.set_focus_minutes(0));
        assert_eq!(state.focus_minutes, 1);
        assert_eq!(state.seconds_remaining, 60);

        assert!(state.set_focus_minutes(90));
        assert_eq!(state.focus_minutes, 60);
        assert_eq!(state.seconds_remaining, 60 * 60);

        assert!(state.set_break_minutes(45));
        assert_eq!(state.break_minutes, 30);
        // Break edit while in Focus leaves the countdown alone.
        assert_eq!(state.seconds_remaining, 60 * 60);
    }

    #[test]
    fn editing_the_active_phase_reloads_the_countdown() {
        let mut state = TimerState::new(25, 5);
        state.start();
        for _ in 0..60 {
            state.tick();
        }
        state.pause();
        assert!(state.set_focus_minutes(30));
        assert_eq!(state.seconds_remaining, 30 * 60);
    }

    #[test]
    fn start_reports_fresh_only_at_full_duration() {
        let mut state = TimerState::default();
        assert!(state.start());
        state.tick();
        state.pause();
        assert!(!state.start());
    }

    #[test]
    fn format_clock_pads_minutes_and_seconds() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(65), "01:05");
        assert_eq!(format_clock(25 * 60), "25:00");
    }
}
