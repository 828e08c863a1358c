//! Phase/Timer Controller.
//!
//! One explicit state enum replaces the usual spread of `is_generating` /
//! `has_started` / `is_running` flags; those become predicates over the state.
//! The controller is pure: it has no clock of its own and only moves when the
//! countdown calls `tick` or the session reports generation start/stop.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    PhaseOneRunning,
    PhaseOnePaused,
    PhaseTwoRunning,
    PhaseTwoPaused,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    One,
    Two,
}

/// Serializable view of the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerState {
    pub remaining_seconds: u32,
    pub is_running: bool,
    pub phase: Phase,
    /// Elapsed seconds at which phase two began, once it has.
    pub phase_two_entered_at: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTimings {
    pub session_seconds: u32,
    /// Remaining time at which phase one gives way to phase two.
    pub phase_two_threshold_seconds: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running (idle, paused or complete); nothing changed.
    Idle,
    Ticked,
    PhaseAdvanced,
    /// Remaining time hit zero; the countdown must stop.
    Expired { phase_advanced: bool },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot {event} while session is {from:?}")]
pub struct TransitionError {
    pub from: SessionState,
    pub event: &'static str,
}

#[derive(Debug, Clone)]
pub struct PhaseController {
    state: SessionState,
    remaining_seconds: u32,
    timings: PhaseTimings,
    /// Elapsed seconds at which phase two was entered. Set at most once.
    phase_two_entered_at: Option<u32>,
}

impl PhaseController {
    pub fn new(timings: PhaseTimings) -> Self {
        Self {
            state: SessionState::Idle,
            remaining_seconds: timings.session_seconds,
            timings,
            phase_two_entered_at: None,
        }
    }

    // ────────────────────────────────────────────────────────────────
    // Predicates
    // ────────────────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    /// False whenever generation is in flight, regardless of anything else.
    pub fn is_running(&self) -> bool {
        matches!(
            self.state,
            SessionState::PhaseOneRunning | SessionState::PhaseTwoRunning
        ) && self.remaining_seconds > 0
    }

    pub fn is_generating(&self) -> bool {
        matches!(
            self.state,
            SessionState::PhaseOnePaused | SessionState::PhaseTwoPaused
        )
    }

    pub fn has_started(&self) -> bool {
        self.state != SessionState::Idle
    }

    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            SessionState::PhaseTwoRunning | SessionState::PhaseTwoPaused => Phase::Two,
            SessionState::Complete if self.phase_two_entered_at.is_some() => Phase::Two,
            _ => Phase::One,
        }
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.timings.session_seconds - self.remaining_seconds
    }

    pub fn phase_two_entered_at(&self) -> Option<u32> {
        self.phase_two_entered_at
    }

    pub fn timer(&self) -> TimerState {
        TimerState {
            remaining_seconds: self.remaining_seconds(),
            is_running: self.is_running(),
            phase: self.phase(),
            phase_two_entered_at: self.phase_two_entered_at(),
        }
    }

    // ────────────────────────────────────────────────────────────────
    // Events
    // ────────────────────────────────────────────────────────────────

    pub fn start(&mut self) -> Result<(), TransitionError> {
        match self.state {
            SessionState::Idle => {
                self.state = SessionState::PhaseOneRunning;
                Ok(())
            }
            from => Err(TransitionError { from, event: "start" }),
        }
    }

    /// Pauses the countdown for the phase that is currently active.
    pub fn generation_started(&mut self) -> Result<(), TransitionError> {
        self.state = match self.state {
            SessionState::PhaseOneRunning => SessionState::PhaseOnePaused,
            SessionState::PhaseTwoRunning => SessionState::PhaseTwoPaused,
            from => {
                return Err(TransitionError {
                    from,
                    event: "start generation",
                })
            }
        };
        Ok(())
    }

    /// Resumes the countdown. Returns false when there was nothing to resume,
    /// e.g. the session was terminated while generation was in flight.
    pub fn generation_finished(&mut self) -> bool {
        match self.state {
            SessionState::PhaseOnePaused => self.state = SessionState::PhaseOneRunning,
            SessionState::PhaseTwoPaused => self.state = SessionState::PhaseTwoRunning,
            _ => return false,
        }
        true
    }

    /// Explicit early move to phase two. `Ok(false)` when already there.
    pub fn advance_to_phase_two(&mut self) -> Result<bool, TransitionError> {
        match self.state {
            SessionState::PhaseOneRunning => Ok(self.enter_phase_two()),
            SessionState::PhaseTwoRunning | SessionState::PhaseTwoPaused => Ok(false),
            from => Err(TransitionError {
                from,
                event: "advance to phase two",
            }),
        }
    }

    pub fn submit(&mut self) -> Result<(), TransitionError> {
        match self.state {
            SessionState::PhaseTwoRunning | SessionState::PhaseTwoPaused => {
                self.state = SessionState::Complete;
                Ok(())
            }
            from => Err(TransitionError { from, event: "submit" }),
        }
    }

    /// Ends the session from any state. Returns false if it was already complete.
    pub fn terminate(&mut self) -> bool {
        if self.state == SessionState::Complete {
            return false;
        }
        self.state = SessionState::Complete;
        true
    }

    /// One countdown period.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_running() {
            return TickOutcome::Idle;
        }

        self.remaining_seconds -= 1;

        let phase_advanced = self.state == SessionState::PhaseOneRunning
            && self.remaining_seconds <= self.timings.phase_two_threshold_seconds
            && self.enter_phase_two();

        match (self.remaining_seconds, phase_advanced) {
            (0, phase_advanced) => TickOutcome::Expired { phase_advanced },
            (_, true) => TickOutcome::PhaseAdvanced,
            _ => TickOutcome::Ticked,
        }
    }

    /// The one-shot edge. Returns true only the first time.
    fn enter_phase_two(&mut self) -> bool {
        if self.phase_two_entered_at.is_some() {
            return false;
        }
        self.phase_two_entered_at = Some(self.elapsed_seconds());
        self.state = SessionState::PhaseTwoRunning;
        true
    }
}
