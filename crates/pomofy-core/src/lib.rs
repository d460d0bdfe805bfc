//! # Pomofy Core Library
//!
//! This library provides the core logic for the Pomofy Pomodoro timer: the
//! session plan a cycle walks through, the timer state machine, persisted
//! settings and the presentation helpers shared by every front end.
//!
//! ## Architecture
//!
//! - **Timer Engine**: A synchronous state machine; the caller invokes
//!   `tick()` once per second while it runs
//! - **Timer Service**: Async driver owning the engine and its single clock task
//! - **Storage**: Versioned JSON settings in an SQLite key-value table
//! - **Audio**: Completion cue behind the `CuePlayer` trait
//!
//! ## Key Components
//!
//! - [`SessionPlan`]: Ordered slots with their durations and labels
//! - [`TimerEngine`]: Core timer state machine
//! - [`TimerService`]: Clock task, settings reconciliation and event fan-out
//! - [`Settings`]: Persisted settings record and presets

pub mod audio;
pub mod display;
pub mod error;
pub mod events;
pub mod storage;
pub mod timer;

pub use audio::{Chime, CuePlayer, SilentPlayer, TerminalBell};
pub use error::{AudioError, ConfigError, CoreError, Result, StorageError, TimerError};
pub use events::{Event, Snapshot};
pub use storage::{KvStore, MemoryKv, Preset, Settings, SettingsStore, SqliteKv, ValidatedSettings};
pub use timer::{
    EngineOptions, PresetDurations, SessionKind, SessionPlan, TimerEngine, TimerService, TimerState,
};
