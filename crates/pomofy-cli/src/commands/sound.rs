use std::sync::Arc;

use clap::Subcommand;
use pomofy_core::audio::KNOWN_SOUNDS;
use pomofy_core::{Chime, EngineOptions, TerminalBell};

use super::open_store;

#[derive(Subcommand)]
pub enum SoundAction {
    /// Play the completion sound once
    Test {
        /// Sound to play instead of the configured one
        #[arg(long)]
        sound: Option<String>,
        /// Volume 0-100 instead of the configured one
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        volume: Option<u8>,
    },
    /// List available sounds
    List,
}

pub fn run(action: SoundAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SoundAction::Test { sound, volume } => {
            let options = open_store()?
                .load()
                .validate()
                .map(|validated| validated.options)
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "invalid settings, using default sound");
                    EngineOptions::default()
                });
            let sound = sound.unwrap_or(options.sound);
            let volume = volume.unwrap_or(options.volume);
            Chime::new(Arc::new(TerminalBell)).preview(&sound, volume)?;
            println!("played {sound} at volume {volume}");
        }
        SoundAction::List => {
            for sound in KNOWN_SOUNDS {
                println!("{sound}");
            }
        }
    }
    Ok(())
}
