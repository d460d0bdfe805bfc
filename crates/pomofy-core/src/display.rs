//! Presentation helpers derived from a [`Snapshot`].
//!
//! Front ends render the same things: the `MM:SS` clock, the tab title,
//! the favicon colour, the progress strip and the button captions.

use serde::Serialize;

use crate::events::Snapshot;
use crate::timer::{SessionKind, TimerState};

/// Format whole seconds as zero-padded `MM:SS`. Minutes may exceed 59.
pub fn format_clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FaviconVariant {
    Work,
    Break,
    Paused,
    Complete,
}

impl FaviconVariant {
    pub fn for_snapshot(snapshot: &Snapshot) -> Self {
        match snapshot.state {
            TimerState::Running => match snapshot.kind {
                Some(SessionKind::Work) => FaviconVariant::Work,
                Some(_) => FaviconVariant::Break,
                None => FaviconVariant::Complete,
            },
            TimerState::SessionComplete | TimerState::CycleComplete => FaviconVariant::Complete,
            TimerState::Stopped | TimerState::Paused => FaviconVariant::Paused,
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            FaviconVariant::Work => "#1db954",
            FaviconVariant::Break => "#1e90ff",
            FaviconVariant::Paused => "#b3b3b3",
            FaviconVariant::Complete => "#ff4444",
        }
    }
}

/// Page title text, or `None` to restore the page's own title.
pub fn page_title(snapshot: &Snapshot, show_in_title: bool) -> Option<String> {
    if !show_in_title {
        return None;
    }
    match snapshot.state {
        TimerState::SessionComplete | TimerState::CycleComplete => Some("Complete".to_string()),
        _ => Some(format_clock(snapshot.remaining_secs)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DotState {
    Completed,
    Active,
    ActivePaused,
    Pending,
}

/// One dot per slot.
pub fn progress_dots(snapshot: &Snapshot) -> Vec<DotState> {
    (0..snapshot.total_slots)
        .map(|index| {
            if index < snapshot.current_index {
                DotState::Completed
            } else if index == snapshot.current_index {
                if snapshot.state == TimerState::Running {
                    DotState::Active
                } else {
                    DotState::ActivePaused
                }
            } else {
                DotState::Pending
            }
        })
        .collect()
}

/// Caption of the start/pause control.
pub fn control_label(snapshot: &Snapshot) -> &'static str {
    match snapshot.state {
        TimerState::Running => "Pause",
        TimerState::SessionComplete => "Continue",
        TimerState::CycleComplete => "New Cycle",
        TimerState::Stopped | TimerState::Paused => "Start",
    }
}

/// Caption of the reset control. An armed reset offers the cycle-wide reset.
pub fn reset_label(snapshot: &Snapshot) -> &'static str {
    if snapshot.reset_armed {
        "Reset All"
    } else {
        "Reset"
    }
}
