pub mod config;
pub mod plan;
pub mod run;
pub mod sound;

use pomofy_core::{KvStore, MemoryKv, SettingsStore, SqliteKv, StorageError};

/// Open the settings store in the user's data directory.
pub fn open_store() -> Result<SettingsStore<SqliteKv>, Box<dyn std::error::Error>> {
    Ok(SettingsStore::new(SqliteKv::open()?))
}

/// Like [`open_store`], but keeps going on in-memory defaults when the
/// database cannot be opened.
pub fn open_store_or_memory() -> SettingsStore<Box<dyn KvStore>> {
    store_or_memory(SqliteKv::open())
}

fn store_or_memory(opened: Result<SqliteKv, StorageError>) -> SettingsStore<Box<dyn KvStore>> {
    match opened {
        Ok(kv) => SettingsStore::new(Box::new(kv)),
        Err(e) => {
            tracing::warn!(error = %e, "settings store unavailable, using in-memory defaults");
            SettingsStore::new(Box::new(MemoryKv::new()))
        }
    }
}
