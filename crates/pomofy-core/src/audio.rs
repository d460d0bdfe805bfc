//! Completion cue.
//!
//! The engine rings a [`Chime`] at every session boundary. Playback is
//! delegated to a [`CuePlayer`]; failures are logged and never reach the
//! engine.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use crate::error::AudioError;

pub const DEFAULT_SOUND: &str = "gong";
pub const DEFAULT_VOLUME: u8 = 50;

/// Sounds bundled with the product.
pub const KNOWN_SOUNDS: &[&str] = &["gong", "bell", "chime", "beep"];

/// Something that can play a named sound at a volume in `0.0..=1.0`.
pub trait CuePlayer: Send + Sync {
    fn play(&self, sound: &str, volume: f32) -> Result<(), AudioError>;
}

/// Plays nothing. Used by tests and headless embedders.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentPlayer;

impl CuePlayer for SilentPlayer {
    fn play(&self, _sound: &str, _volume: f32) -> Result<(), AudioError> {
        Ok(())
    }
}

/// Rings the terminal bell on stderr. A muted volume rings nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl CuePlayer for TerminalBell {
    fn play(&self, sound: &str, volume: f32) -> Result<(), AudioError> {
        if !KNOWN_SOUNDS.contains(&sound) {
            return Err(AudioError::UnknownSound(sound.to_string()));
        }
        if volume <= 0.0 {
            return Ok(());
        }
        let mut stderr = std::io::stderr().lock();
        stderr
            .write_all(b"\x07")
            .and_then(|_| stderr.flush())
            .map_err(|e| AudioError::Unavailable(e.to_string()))
    }
}

/// Convert a stored 0..=100 volume to the 0.0..=1.0 playback scale.
pub fn volume_fraction(volume: u8) -> f32 {
    f32::from(volume.min(100)) / 100.0
}

/// Configured completion cue.
#[derive(Clone)]
pub struct Chime {
    player: Arc<dyn CuePlayer>,
    sound: String,
    volume: u8,
}

impl Chime {
    pub fn new(player: Arc<dyn CuePlayer>) -> Self {
        Self {
            player,
            sound: DEFAULT_SOUND.to_string(),
            volume: DEFAULT_VOLUME,
        }
    }

    pub fn silent() -> Self {
        Self::new(Arc::new(SilentPlayer))
    }

    pub fn sound(&self) -> &str {
        &self.sound
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn set_sound(&mut self, sound: impl Into<String>) {
        self.sound = sound.into();
    }

    /// Volume on the 0..=100 scale; larger values are clamped.
    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
    }

    /// Play the configured sound. Failures are logged and swallowed.
    pub fn ring(&self) {
        self.play_logged(&self.sound, self.volume);
    }

    /// Play an arbitrary sound once, e.g. to audition a setting.
    pub fn preview(&self, sound: &str, volume: u8) -> Result<(), AudioError> {
        self.player.play(sound, volume_fraction(volume))
    }

    fn play_logged(&self, sound: &str, volume: u8) {
        if let Err(e) = self.player.play(sound, volume_fraction(volume)) {
            tracing::warn!(sound, error = %e, "completion cue failed");
        }
    }
}

impl fmt::Debug for Chime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chime")
            .field("sound", &self.sound)
            .field("volume", &self.volume)
            .finish_non_exhaustive()
    }
}

impl Default for Chime {
    fn default() -> Self {
        Self::silent()
    }
}
