//! Core error types for pomofy-core.
//!
//! Errors are grouped by the layer that raises them. Configuration errors
//! surface to the settings layer, timer errors are caller contract
//! violations, storage and audio errors are recovered close to where they
//! happen.

use std::path::PathBuf;
use thiserror::Error;

use crate::timer::TimerState;

/// Core error type for pomofy-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Timer contract violations
    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Audio playback errors
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Invalid plan construction or settings values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A cycle needs between 1 and `MAX_WORK_SESSIONS` work sessions
    #[error("Work session count must be at least 1 and at most 100, got {0}")]
    InvalidWorkSessionCount(i64),

    /// Durations are whole seconds and never negative
    #[error("Duration for '{kind}' must not be negative, got {secs}")]
    NegativeDuration { kind: String, secs: i64 },

    /// A sequence entry that names no session kind at all
    #[error("Unknown session kind: '{0}'")]
    UnknownSessionKind(String),

    /// A sequence entry whose kind has no session type configured
    #[error("Session kind '{kind}' at position {position} has no configured session type")]
    DanglingSessionKind { kind: String, position: usize },

    /// Empty session sequence
    #[error("Session sequence must contain at least one slot")]
    EmptySequence,

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Timer state machine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// The requested action is not legal from the current state
    #[error("Cannot {action} while {state:?}")]
    InvalidTransition {
        action: &'static str,
        state: TimerState,
    },

    /// Slot lookup outside the plan
    #[error("Slot index {index} out of bounds for plan of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// Persistent key-value storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Store is locked")]
    Locked,

    /// Stored value could not be encoded or decoded
    #[error("Failed to encode stored value for '{key}': {message}")]
    Encode { key: String, message: String },

    /// Data directory could not be prepared
    #[error("Data directory unavailable: {0}")]
    DataDir(#[from] std::io::Error),
}

/// Completion cue playback errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// Output device unavailable
    #[error("Audio output unavailable: {0}")]
    Unavailable(String),

    /// The requested sound is not known to the player
    #[error("Unknown sound '{0}'")]
    UnknownSound(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_names_action_and_state() {
        let err = TimerError::InvalidTransition {
            action: "start",
            state: TimerState::CycleComplete,
        };
        assert_eq!(err.to_string(), "Cannot start while CycleComplete");
    }

    #[test]
    fn config_error_wraps_into_core_error() {
        let err: CoreError = ConfigError::InvalidWorkSessionCount(0).into();
        assert!(matches!(err, CoreError::Config(_)));
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn rusqlite_errors_become_query_failures() {
        let err: StorageError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StorageError::QueryFailed(_)));
    }
}
