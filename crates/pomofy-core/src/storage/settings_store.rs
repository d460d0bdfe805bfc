//! Loading and saving the settings record, with change notification.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::kv::KvStore;
use super::settings::{Settings, SETTINGS_KEY};
use crate::error::StorageError;

/// Settings persisted in a [`KvStore`].
///
/// Every successful `save` that changes the record is published to
/// subscribers.
pub struct SettingsStore<K: KvStore> {
    kv: K,
    tx: watch::Sender<Settings>,
}

impl<K: KvStore> SettingsStore<K> {
    pub fn new(kv: K) -> Self {
        let (tx, _rx) = watch::channel(Settings::default());
        Self { kv, tx }
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    /// Read the stored record.
    ///
    /// A missing record is replaced by the defaults, which are written back.
    /// An unreadable or corrupt record yields the defaults in memory only.
    pub fn load(&self) -> Settings {
        let settings = match self.read() {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                let settings = Settings::default();
                if let Err(e) = self.write(&settings) {
                    tracing::warn!(error = %e, "could not persist default settings");
                }
                settings
            }
            Err(e) => {
                tracing::warn!(error = %e, "settings unreadable, using defaults");
                Settings::default()
            }
        };
        self.publish(settings.clone());
        settings
    }

    /// Read the stored record without falling back.
    pub fn read(&self) -> Result<Option<Settings>, StorageError> {
        let Some(raw) = self.kv.get(SETTINGS_KEY)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StorageError::Encode {
                key: SETTINGS_KEY.to_string(),
                message: e.to_string(),
            })
    }

    /// Re-read the stored record and publish it if it changed.
    ///
    /// Unlike [`load`](Self::load) nothing is written and failures are
    /// returned, so a half-written or missing record never replaces the
    /// published settings. Returns whether a change was published.
    pub fn refresh(&self) -> Result<bool, StorageError> {
        match self.read()? {
            Some(settings) => Ok(self.publish(settings)),
            None => Ok(false),
        }
    }

    /// Persist `settings` and notify subscribers.
    pub fn save(&self, settings: &Settings) -> Result<(), StorageError> {
        self.write(settings)?;
        self.publish(settings.clone());
        Ok(())
    }

    /// Receiver that observes every published change.
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    fn write(&self, settings: &Settings) -> Result<(), StorageError> {
        let raw = serde_json::to_string(settings).map_err(|e| StorageError::Encode {
            key: SETTINGS_KEY.to_string(),
            message: e.to_string(),
        })?;
        self.kv.set(SETTINGS_KEY, &raw)
    }

    fn publish(&self, settings: Settings) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == settings {
                return false;
            }
            *current = settings;
            true
        })
    }
}

impl<K: KvStore + 'static> SettingsStore<K> {
    /// Refresh from the backing store every `period`, picking up edits made
    /// by other processes. The task ends once the store is dropped.
    pub fn spawn_refresh(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(refresh_every(store, period))
    }
}

async fn refresh_every<K: KvStore + 'static>(store: Weak<SettingsStore<K>>, period: Duration) {
    let mut interval = time::interval_at(time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let Some(store) = store.upgrade() else { break };
        match tokio::task::spawn_blocking(move || store.refresh()).await {
            Ok(Ok(true)) => tracing::info!("settings changed on disk"),
            Ok(Ok(false)) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "could not refresh settings"),
            Err(e) => tracing::warn!(error = %e, "settings refresh task failed"),
        }
    }
    tracing::debug!("settings refresh finished");
}
