//! Persisted user settings.
//!
//! The record is stored as JSON under [`SETTINGS_KEY`] and mirrors what the
//! settings popup writes:
//! - the selected preset (`classic`, `focus`, `sprint` or `custom`)
//! - the user's custom profile, kept even while a preset is active
//! - the active durations, cycle, audio and UI flags
//!
//! Raw settings are never handed to the engine. [`Settings::validate`]
//! decodes them once into [`ValidatedSettings`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::audio::{DEFAULT_SOUND, DEFAULT_VOLUME};
use crate::error::ConfigError;
use crate::timer::{build_sequence, EngineOptions, PresetDurations, SessionPlan, MAX_WORK_SESSIONS};

/// Key of the settings record in the key-value store.
pub const SETTINGS_KEY: &str = "pomofySettings";

/// Current schema version of the settings record.
pub const SETTINGS_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    #[default]
    Classic,
    Focus,
    Sprint,
    Custom,
}

impl Preset {
    pub const NAMED: [Preset; 3] = [Preset::Classic, Preset::Focus, Preset::Sprint];

    pub fn as_str(self) -> &'static str {
        match self {
            Preset::Classic => "classic",
            Preset::Focus => "focus",
            Preset::Sprint => "sprint",
            Preset::Custom => "custom",
        }
    }

    /// Bundled values of a named preset. `Custom` has none.
    pub fn profile(self) -> Option<Profile> {
        let (durations, work_sessions) = match self {
            Preset::Classic => (PresetDurations::from_minutes(25, 5, 15), 4),
            Preset::Focus => (PresetDurations::from_minutes(50, 10, 30), 3),
            Preset::Sprint => (PresetDurations::from_minutes(15, 3, 10), 6),
            Preset::Custom => return None,
        };
        Some(Profile {
            durations,
            cycle: CycleProfile {
                work_sessions,
                sessions: None,
            },
            audio: AudioSettings::default(),
            ui: UiSettings::default(),
        })
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classic" => Ok(Preset::Classic),
            "focus" => Ok(Preset::Focus),
            "sprint" => Ok(Preset::Sprint),
            "custom" => Ok(Preset::Custom),
            other => Err(ConfigError::InvalidValue {
                key: "selectedPreset".into(),
                message: format!("unknown preset '{other}'"),
            }),
        }
    }
}

/// Cycle shape of a profile.
///
/// `sessions` holds a hand-written sequence only; `None` means the sequence
/// is derived from `work_sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleProfile {
    #[serde(default = "default_work_sessions")]
    pub work_sessions: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<String>>,
}

/// Active cycle: the work-session count and, when present, the explicit
/// sequence that takes precedence over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSettings {
    #[serde(default = "default_work_sessions")]
    pub work_sessions: i64,
    #[serde(default)]
    pub sessions: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSettings {
    #[serde(default = "default_sound")]
    pub sound: String,
    /// 0..=100.
    #[serde(default = "default_volume")]
    pub volume: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiSettings {
    #[serde(default = "default_true")]
    pub show_in_title: bool,
    #[serde(default)]
    pub auto_continue: bool,
}

/// A complete, user-editable bundle of values.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub durations: PresetDurations,
    #[serde(default)]
    pub cycle: CycleProfile,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub ui: UiSettings,
}

/// The persisted settings record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub selected_preset: Preset,
    #[serde(default)]
    pub custom_settings: Option<Profile>,
    #[serde(default)]
    pub durations: PresetDurations,
    #[serde(default)]
    pub cycle: CycleSettings,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub ui: UiSettings,
}

/// Settings decoded and checked once, ready for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSettings {
    pub preset: Preset,
    pub plan: SessionPlan,
    pub options: EngineOptions,
    pub show_in_title: bool,
}

// Default functions
fn default_version() -> u32 {
    SETTINGS_VERSION
}
fn default_work_sessions() -> i64 {
    4
}
fn default_sound() -> String {
    DEFAULT_SOUND.into()
}
fn default_volume() -> i64 {
    i64::from(DEFAULT_VOLUME)
}
fn default_true() -> bool {
    true
}

impl Default for CycleProfile {
    fn default() -> Self {
        Self {
            work_sessions: default_work_sessions(),
            sessions: None,
        }
    }
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            work_sessions: default_work_sessions(),
            sessions: derived_sessions(default_work_sessions()),
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sound: default_sound(),
            volume: default_volume(),
        }
    }
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            show_in_title: true,
            auto_continue: false,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            selected_preset: Preset::Classic,
            custom_settings: Preset::Classic.profile(),
            durations: PresetDurations::default(),
            cycle: CycleSettings::default(),
            audio: AudioSettings::default(),
            ui: UiSettings::default(),
        }
    }
}

/// Stored names of the derived sequence, or `None` for an invalid count.
fn derived_sessions(work_sessions: i64) -> Option<Vec<String>> {
    let count = usize::try_from(work_sessions)
        .ok()
        .filter(|n| (1..=MAX_WORK_SESSIONS).contains(n))?;
    Some(
        build_sequence(count)
            .into_iter()
            .map(|kind| kind.as_str().to_string())
            .collect(),
    )
}

impl Settings {
    /// Decode into engine-ready settings.
    ///
    /// An explicit `cycle.sessions` sequence wins over `cycle.workSessions`.
    pub fn validate(&self) -> Result<ValidatedSettings, ConfigError> {
        if self.version > SETTINGS_VERSION {
            return Err(ConfigError::InvalidValue {
                key: "version".into(),
                message: format!(
                    "settings version {} is newer than supported version {SETTINGS_VERSION}",
                    self.version
                ),
            });
        }
        let volume = u8::try_from(self.audio.volume)
            .ok()
            .filter(|v| *v <= 100)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "audio.volume".into(),
                message: format!("must be between 0 and 100, got {}", self.audio.volume),
            })?;

        let plan = match &self.cycle.sessions {
            Some(sessions) => SessionPlan::from_durations_and_sequence(self.durations, sessions)?,
            None => SessionPlan::from_preset(self.durations, self.cycle.work_sessions)?,
        };

        Ok(ValidatedSettings {
            preset: self.selected_preset,
            plan,
            options: EngineOptions {
                auto_continue: self.ui.auto_continue,
                sound: self.audio.sound.clone(),
                volume,
            },
            show_in_title: self.ui.show_in_title,
        })
    }

    /// The active values as a profile.
    ///
    /// The active sequence is kept only when it differs from the one
    /// `cycle.workSessions` derives.
    pub fn active_profile(&self) -> Profile {
        let derived = derived_sessions(self.cycle.work_sessions);
        let sessions = self
            .cycle
            .sessions
            .clone()
            .filter(|sessions| derived.as_ref() != Some(sessions));
        Profile {
            durations: self.durations,
            cycle: CycleProfile {
                work_sessions: self.cycle.work_sessions,
                sessions,
            },
            audio: self.audio.clone(),
            ui: self.ui.clone(),
        }
    }

    /// Switch to a preset.
    ///
    /// Durations, cycle and UI flags come from the preset; the current audio
    /// choice and the stored custom profile are kept. Selecting
    /// [`Preset::Custom`] restores the custom profile.
    pub fn with_preset(self, preset: Preset) -> Self {
        let Some(profile) = preset.profile() else {
            return self.restore_custom();
        };
        let custom_settings = self.custom_settings.or_else(|| Some(profile.clone()));
        Self {
            version: SETTINGS_VERSION,
            selected_preset: preset,
            custom_settings,
            durations: profile.durations,
            cycle: CycleSettings {
                work_sessions: profile.cycle.work_sessions,
                sessions: derived_sessions(profile.cycle.work_sessions),
            },
            audio: self.audio,
            ui: profile.ui,
        }
    }

    /// Store `profile` as the custom profile and make it active.
    pub fn with_custom(self, profile: Profile) -> Self {
        Self {
            version: SETTINGS_VERSION,
            selected_preset: Preset::Custom,
            durations: profile.durations,
            cycle: CycleSettings {
                work_sessions: profile.cycle.work_sessions,
                sessions: profile
                    .cycle
                    .sessions
                    .clone()
                    .or_else(|| derived_sessions(profile.cycle.work_sessions)),
            },
            audio: profile.audio.clone(),
            ui: profile.ui.clone(),
            custom_settings: Some(profile),
        }
    }

    /// Reactivate the stored custom profile, or capture the active values as one.
    pub fn restore_custom(self) -> Self {
        let profile = self
            .custom_settings
            .clone()
            .unwrap_or_else(|| self.active_profile());
        self.with_custom(profile)
    }

    // ── Dot-path access ──────────────────────────────────────────────

    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => value
                        .parse::<i64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as integer")))?,
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    serde_json::Value::Null => serde_json::from_str(value)
                        .unwrap_or_else(|_| serde_json::Value::String(value.into())),
                    serde_json::Value::String(_) => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Get a value as string by dot-separated key, e.g. `ui.autoContinue`.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key.
    ///
    /// Editing active durations, the work-session count or UI flags switches
    /// the selection to `custom`, as a manual edit in the settings form does.
    /// Setting `selectedPreset` applies that preset.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Settings =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        *self = match key {
            "selectedPreset" => {
                let preset = updated.selected_preset;
                updated.with_preset(preset)
            }
            "cycle.workSessions" => {
                let mut profile = updated.active_profile();
                profile.cycle.sessions = None;
                updated.with_custom(profile)
            }
            _ if key.starts_with("durations.") || key.starts_with("ui.") || key == "cycle.sessions" => {
                let profile = updated.active_profile();
                updated.with_custom(profile)
            }
            _ => updated,
        };
        Ok(())
    }
}
