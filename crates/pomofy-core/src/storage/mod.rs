pub mod kv;
mod settings;
mod settings_store;

pub use kv::{KvStore, MemoryKv, SqliteKv};
pub use settings::{
    AudioSettings, CycleProfile, CycleSettings, Preset, Profile, Settings, UiSettings,
    ValidatedSettings, SETTINGS_KEY, SETTINGS_VERSION,
};
pub use settings_store::SettingsStore;

use std::path::PathBuf;

use crate::error::StorageError;

/// Returns `~/.config/pomofy[-dev]/` based on POMOFY_ENV.
///
/// Set POMOFY_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, StorageError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("POMOFY_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("pomofy-dev")
    } else {
        base_dir.join("pomofy")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
