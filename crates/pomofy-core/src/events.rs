use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::{SessionKind, TimerState};

/// Full engine state handed to presentation after every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub remaining_secs: u64,
    pub current_index: usize,
    pub state: TimerState,
    pub label: String,
    /// `None` once the cycle is complete.
    pub kind: Option<SessionKind>,
    pub total_slots: usize,
    /// A first reset happened and a second one within the window resets the cycle.
    pub reset_armed: bool,
}

/// Every state change in the engine produces an Event.
/// Front ends subscribe to them; `StateSnapshot` follows every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        slot_index: usize,
        kind: SessionKind,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    /// The clock crossed a slot boundary and kept running (auto-continue).
    SessionAdvanced {
        from_slot: usize,
        to_slot: usize,
        kind: SessionKind,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    /// A slot finished and the clock stopped at the boundary.
    SessionCompleted {
        completed_slot: usize,
        next_kind: SessionKind,
        at: DateTime<Utc>,
    },
    CycleCompleted {
        slots: usize,
        at: DateTime<Utc>,
    },
    /// First reset stage: the current slot was rewound.
    ResetArmed {
        restored_secs: u64,
        at: DateTime<Utc>,
    },
    /// The confirmation window lapsed without a second reset.
    ResetDisarmed {
        at: DateTime<Utc>,
    },
    CycleReset {
        at: DateTime<Utc>,
    },
    PlanApplied {
        slots: usize,
        reseeded: bool,
        at: DateTime<Utc>,
    },
    StateSnapshot(Snapshot),
}

impl Event {
    /// Events that the engine raises on a session boundary.
    pub fn is_boundary(&self) -> bool {
        matches!(
            self,
            Event::SessionAdvanced { .. } | Event::SessionCompleted { .. } | Event::CycleCompleted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_type() {
        let event = Event::CycleReset { at: Utc::now() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CycleReset");
    }

    #[test]
    fn snapshot_event_flattens_fields() {
        let event = Event::StateSnapshot(Snapshot {
            remaining_secs: 61,
            current_index: 2,
            state: TimerState::Paused,
            label: "WORK".into(),
            kind: Some(SessionKind::Work),
            total_slots: 8,
            reset_armed: false,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StateSnapshot");
        assert_eq!(json["remaining_secs"], 61);
        assert_eq!(json["state"], "paused");
        assert_eq!(json["kind"], "work");
    }
}
