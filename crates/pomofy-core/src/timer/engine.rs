//! Timer engine implementation.
//!
//! The engine is a synchronous state machine over a [`SessionPlan`]. It does
//! not own a thread or a task: whoever drives it calls `tick()` once per
//! second while it is running (see [`TimerService`](super::TimerService)).
//!
//! ## State Transitions
//!
//! ```text
//! Stopped -> Running <-> Paused
//! Running -> SessionComplete -> Running
//! Running -> CycleComplete -> (reset) -> Stopped
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::new(plan);
//! engine.start()?;
//! // Once per second:
//! engine.tick(); // Returns Some(Event) on a session boundary
//! ```

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::plan::{SessionKind, SessionPlan};
use crate::audio::Chime;
use crate::error::TimerError;
use crate::events::{Event, Snapshot};

/// How long a first reset stays armed for the second, cycle-wide reset.
pub const RESET_CONFIRM_WINDOW: Duration = Duration::from_secs(3);

/// Label shown once every slot has been consumed.
pub const COMPLETE_LABEL: &str = "COMPLETE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    Stopped,
    Running,
    Paused,
    /// A slot ended and the clock stopped at the boundary.
    SessionComplete,
    /// Every slot has been consumed. Only `reset` leaves this state.
    CycleComplete,
}

/// Identity of one armed clock.
///
/// `start` hands out a fresh token; `stop`, `reset` and session boundaries
/// clear it. Ticks carrying any other token are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClockToken(u64);

/// Behavioural settings that can change without replacing the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub auto_continue: bool,
    pub sound: String,
    pub volume: u8,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            auto_continue: false,
            sound: crate::audio::DEFAULT_SOUND.to_string(),
            volume: crate::audio::DEFAULT_VOLUME,
        }
    }
}

/// Core timer engine.
#[derive(Debug, Clone)]
pub struct TimerEngine {
    plan: SessionPlan,
    /// False while running on the fallback plan, before settings arrive.
    plan_loaded: bool,
    state: TimerState,
    current_index: usize,
    remaining_secs: u64,
    /// Full duration of the current slot when it became current.
    reset_remaining_secs: u64,
    auto_continue: bool,
    chime: Chime,
    clock: Option<ClockToken>,
    clock_generation: u64,
    reset_armed_at: Option<Instant>,
}

impl TimerEngine {
    /// Create an engine over a loaded plan, `Stopped` at slot 0.
    pub fn new(plan: SessionPlan) -> Self {
        let mut engine = Self::unloaded();
        engine.plan = plan;
        engine.plan_loaded = true;
        engine.reseed();
        engine
    }

    /// Create an engine before settings are available.
    ///
    /// It runs on [`SessionPlan::fallback`] until `apply_new_plan` is called.
    pub fn unloaded() -> Self {
        let plan = SessionPlan::fallback();
        let first = plan.duration_of(0).unwrap_or(super::plan::FALLBACK_WORK_SECS);
        Self {
            plan,
            plan_loaded: false,
            state: TimerState::Stopped,
            current_index: 0,
            remaining_secs: first,
            reset_remaining_secs: first,
            auto_continue: false,
            chime: Chime::silent(),
            clock: None,
            clock_generation: 0,
            reset_armed_at: None,
        }
    }

    pub fn with_chime(mut self, chime: Chime) -> Self {
        self.chime = chime;
        self
    }

    pub fn with_options(mut self, options: &EngineOptions) -> Self {
        self.apply_options(options);
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    pub fn reset_remaining_secs(&self) -> u64 {
        self.reset_remaining_secs
    }

    pub fn plan(&self) -> &SessionPlan {
        &self.plan
    }

    pub fn is_plan_loaded(&self) -> bool {
        self.plan_loaded
    }

    pub fn auto_continue(&self) -> bool {
        self.auto_continue
    }

    pub fn chime(&self) -> &Chime {
        &self.chime
    }

    /// The armed clock, if the engine is running.
    pub fn clock_token(&self) -> Option<ClockToken> {
        self.clock
    }

    pub fn is_clock(&self, token: ClockToken) -> bool {
        self.clock == Some(token)
    }

    pub fn is_reset_armed(&self) -> bool {
        self.reset_armed_at.is_some()
    }

    pub fn is_cycle_complete(&self) -> bool {
        self.state == TimerState::CycleComplete
    }

    /// Kind of the current slot; `None` once the cycle is complete.
    pub fn current_kind(&self) -> Option<SessionKind> {
        if self.is_cycle_complete() {
            return None;
        }
        self.plan.kind_of(self.clamped_index()).ok()
    }

    pub fn current_label(&self) -> String {
        if self.is_cycle_complete() {
            return COMPLETE_LABEL.to_string();
        }
        self.plan
            .label_of(self.clamped_index())
            .map(str::to_string)
            .unwrap_or_default()
    }

    /// Build a full state snapshot.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            remaining_secs: self.remaining_secs,
            current_index: self.current_index,
            state: self.state,
            label: self.current_label(),
            kind: self.current_kind(),
            total_slots: self.plan.len(),
            reset_armed: self.is_reset_armed(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start or resume the clock.
    ///
    /// Already running is a no-op. A finished cycle must be restarted with
    /// [`restart_cycle`](Self::restart_cycle) or a double reset first.
    pub fn start(&mut self) -> Result<Option<Event>, TimerError> {
        match self.state {
            TimerState::Stopped | TimerState::Paused | TimerState::SessionComplete => {
                self.state = TimerState::Running;
                self.clock_generation += 1;
                self.clock = Some(ClockToken(self.clock_generation));
                tracing::debug!(slot = self.current_index, remaining = self.remaining_secs, "timer started");
                Ok(Some(Event::TimerStarted {
                    slot_index: self.current_index,
                    kind: self.current_kind().unwrap_or(SessionKind::Work),
                    remaining_secs: self.remaining_secs,
                    at: Utc::now(),
                }))
            }
            TimerState::Running => Ok(None),
            TimerState::CycleComplete => Err(TimerError::InvalidTransition {
                action: "start",
                state: self.state,
            }),
        }
    }

    /// Cancel the clock. A running engine becomes `Paused`; otherwise nothing changes.
    pub fn pause(&mut self) -> Option<Event> {
        self.clock = None;
        if self.state != TimerState::Running {
            return None;
        }
        self.state = TimerState::Paused;
        tracing::debug!(remaining = self.remaining_secs, "timer paused");
        Some(Event::TimerPaused {
            remaining_secs: self.remaining_secs,
            at: Utc::now(),
        })
    }

    /// Alias of [`pause`](Self::pause).
    pub fn stop(&mut self) -> Option<Event> {
        self.pause()
    }

    /// Count one second. Returns the boundary event when a slot ends.
    ///
    /// Does nothing unless the engine is running. Remaining time never rests
    /// at zero: the slot advances inside the same call.
    pub fn tick(&mut self) -> Option<Event> {
        if self.state != TimerState::Running {
            return None;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            return self.advance_session();
        }
        None
    }

    /// Tick on behalf of a specific clock. Stale clocks are ignored.
    pub fn tick_for(&mut self, token: ClockToken) -> Option<Event> {
        if !self.is_clock(token) {
            tracing::debug!(?token, "dropping tick from stale clock");
            return None;
        }
        self.tick()
    }

    /// Move to the next slot, ringing the completion cue.
    ///
    /// Returns `None` if the cycle is already complete.
    pub fn advance_session(&mut self) -> Option<Event> {
        if self.is_cycle_complete() {
            return None;
        }
        self.chime.ring();

        let from_slot = self.current_index;
        self.current_index += 1;

        if self.current_index >= self.plan.len() {
            self.current_index = self.plan.len();
            self.remaining_secs = 0;
            self.state = TimerState::CycleComplete;
            self.clock = None;
            tracing::debug!(slots = self.plan.len(), "cycle complete");
            return Some(Event::CycleCompleted {
                slots: self.plan.len(),
                at: Utc::now(),
            });
        }

        let duration = self.slot_duration(self.current_index);
        self.remaining_secs = duration;
        self.reset_remaining_secs = duration;
        let kind = self.current_kind().unwrap_or(SessionKind::Work);

        if self.auto_continue && self.state == TimerState::Running {
            tracing::debug!(from_slot, to_slot = self.current_index, "session advanced");
            Some(Event::SessionAdvanced {
                from_slot,
                to_slot: self.current_index,
                kind,
                duration_secs: duration,
                at: Utc::now(),
            })
        } else {
            self.state = TimerState::SessionComplete;
            self.clock = None;
            tracing::debug!(completed_slot = from_slot, "session complete");
            Some(Event::SessionCompleted {
                completed_slot: from_slot,
                next_kind: kind,
                at: Utc::now(),
            })
        }
    }

    /// Two-stage reset, using the current instant.
    pub fn reset(&mut self) -> Event {
        self.reset_at(Instant::now())
    }

    /// Two-stage reset.
    ///
    /// The first call rewinds the current slot and arms a confirmation
    /// window. A second call inside [`RESET_CONFIRM_WINDOW`] rewinds the whole
    /// cycle to slot 0.
    pub fn reset_at(&mut self, now: Instant) -> Event {
        if self.reset_window_open(now) {
            return self.restart_cycle();
        }

        self.clock = None;
        if self.state == TimerState::Running {
            self.state = TimerState::Paused;
        }
        self.remaining_secs = self.reset_remaining_secs;
        self.reset_armed_at = Some(now);
        tracing::debug!(restored = self.remaining_secs, "reset armed");
        Event::ResetArmed {
            restored_secs: self.remaining_secs,
            at: Utc::now(),
        }
    }

    /// Rewind to a stopped slot 0 from any state, clearing an armed reset.
    pub fn restart_cycle(&mut self) -> Event {
        self.clock = None;
        self.state = TimerState::Stopped;
        self.reset_armed_at = None;
        self.reseed();
        tracing::debug!("cycle reset");
        Event::CycleReset { at: Utc::now() }
    }

    /// Disarm a confirmation window that has lapsed by `now`.
    pub fn expire_reset_window(&mut self, now: Instant) -> Option<Event> {
        if self.reset_armed_at.is_some() && !self.reset_window_open(now) {
            self.reset_armed_at = None;
            return Some(Event::ResetDisarmed { at: Utc::now() });
        }
        None
    }

    /// Replace the plan.
    ///
    /// A running slot keeps its position and remaining time; the new plan
    /// takes effect at the next boundary. Otherwise the engine reseeds at slot 0.
    pub fn apply_new_plan(&mut self, plan: SessionPlan) -> Event {
        self.plan = plan;
        self.plan_loaded = true;
        let reseeded = self.state != TimerState::Running;
        if reseeded {
            if self.state == TimerState::CycleComplete {
                self.state = TimerState::Stopped;
            }
            self.reseed();
        }
        tracing::info!(slots = self.plan.len(), reseeded, "plan applied");
        Event::PlanApplied {
            slots: self.plan.len(),
            reseeded,
            at: Utc::now(),
        }
    }

    /// Update auto-continue and the completion cue. Slot state is untouched.
    pub fn apply_options(&mut self, options: &EngineOptions) {
        self.auto_continue = options.auto_continue;
        self.chime.set_sound(options.sound.clone());
        self.chime.set_volume(options.volume);
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn reset_window_open(&self, now: Instant) -> bool {
        self.reset_armed_at
            .is_some_and(|armed| now.saturating_duration_since(armed) < RESET_CONFIRM_WINDOW)
    }

    fn reseed(&mut self) {
        self.current_index = 0;
        let first = self.slot_duration(0);
        self.remaining_secs = first;
        self.reset_remaining_secs = first;
    }

    /// Index used for lookups while a shrunken plan is still catching up
    /// with a running slot.
    fn clamped_index(&self) -> usize {
        self.current_index.min(self.plan.len().saturating_sub(1))
    }

    fn slot_duration(&self, index: usize) -> u64 {
        match self.plan.duration_of(index) {
            Ok(secs) => secs,
            Err(e) => {
                debug_assert!(false, "plan/index desync: {e}");
                tracing::error!(error = %e, "plan/index desync, clamping to last slot");
                self.plan.duration_of(self.clamped_index()).unwrap_or(0)
            }
        }
    }
}
