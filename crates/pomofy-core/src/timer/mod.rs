mod engine;
mod plan;
mod service;

pub use engine::{
    ClockToken, EngineOptions, TimerEngine, TimerState, COMPLETE_LABEL, RESET_CONFIRM_WINDOW,
};
pub use plan::{
    build_sequence, PresetDurations, SessionKind, SessionPlan, SessionType, FALLBACK_WORK_SECS,
    MAX_WORK_SESSIONS,
};
pub use service::{TimerService, TICK_PERIOD};
