use clap::Subcommand;
use pomofy_core::{ConfigError, Preset, Settings};

use super::open_store;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g. "ui.autoContinue", "durations.work")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
    /// Switch to a preset (classic, focus, sprint, custom)
    Preset {
        name: Preset,
    },
    /// Edit and select the custom profile. Durations are in minutes.
    Custom {
        #[arg(long)]
        work: Option<i64>,
        #[arg(long = "break")]
        short_break: Option<i64>,
        #[arg(long)]
        long_break: Option<i64>,
        /// Work sessions per cycle
        #[arg(long)]
        sessions: Option<i64>,
    },
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store()?;
    match action {
        ConfigAction::Get { key } => {
            println!("{}", lookup(&store.load(), &key)?);
        }
        ConfigAction::Set { key, value } => {
            let mut settings = store.load();
            settings.set(&key, &value)?;
            settings.validate()?;
            store.save(&settings)?;
            println!("ok");
        }
        ConfigAction::List => {
            let settings = store.load();
            let json = serde_json::to_string_pretty(&settings)?;
            println!("{json}");
        }
        ConfigAction::Reset => {
            store.save(&Settings::default())?;
            println!("config reset to defaults");
        }
        ConfigAction::Preset { name } => {
            let settings = store.load().with_preset(name);
            settings.validate()?;
            store.save(&settings)?;
            println!("preset: {}", settings.selected_preset);
        }
        ConfigAction::Custom {
            work,
            short_break,
            long_break,
            sessions,
        } => {
            let settings = store.load();
            let mut profile = settings
                .custom_settings
                .clone()
                .unwrap_or_else(|| settings.active_profile());
            if let Some(minutes) = work {
                profile.durations.work = minutes_to_secs("durations.work", minutes)?;
            }
            if let Some(minutes) = short_break {
                profile.durations.short_break = minutes_to_secs("durations.break", minutes)?;
            }
            if let Some(minutes) = long_break {
                profile.durations.long_break = minutes_to_secs("durations.longBreak", minutes)?;
            }
            if let Some(count) = sessions {
                profile.cycle.work_sessions = count;
                profile.cycle.sessions = None;
            }
            let settings = settings.with_custom(profile);
            settings.validate()?;
            store.save(&settings)?;
            println!("preset: {}", settings.selected_preset);
        }
    }
    Ok(())
}

fn lookup(settings: &Settings, key: &str) -> Result<String, ConfigError> {
    settings
        .get(key)
        .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))
}

fn minutes_to_secs(key: &str, minutes: i64) -> Result<i64, ConfigError> {
    minutes
        .checked_mul(60)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{minutes} minutes is out of range"),
        })
}
