//! Speech engine seam.
//!
//! The core never synthesizes audio itself; it drives an implementation of
//! [`SpeechEngine`]. `speak` blocks the calling thread until the utterance has
//! been rendered or stopped, so callers run it on the blocking pool. `stop` may
//! be invoked from any other thread while a `speak` is in flight.

use thiserror::Error;

/// Default speech rate in words per minute.
pub const DEFAULT_RATE_WPM: u32 = 175;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No speech engine available: {0}")]
    Unavailable(String),

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Audio playback failed: {0}")]
    Playback(String),

    #[error("Invalid voice settings: {0}")]
    InvalidSettings(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Voice parameters applied through [`SpeechEngine::configure`].
#[derive(Clone, Debug, PartialEq)]
pub struct VoiceSettings {
    /// Words per minute
    pub rate: u32,
    /// 0.0 – 2.0, 1.0 is unchanged
    pub volume: f32,
    /// Engine-specific voice identifier
    pub voice: Option<String>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE_WPM,
            volume: 1.0,
            voice: None,
        }
    }
}

impl VoiceSettings {
    pub fn with_rate(mut self, rate: u32) -> Self {
        self.rate = rate;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.rate == 0 {
            return Err(EngineError::InvalidSettings("rate must be positive".into()));
        }
        if !(0.0..=2.0).contains(&self.volume) {
            return Err(EngineError::InvalidSettings(format!(
                "volume {} outside 0.0-2.0",
                self.volume
            )));
        }
        Ok(())
    }
}

/// A voice installed on this system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub language: String,
}

pub trait SpeechEngine: Send + Sync {
    /// Speak `text` and block until it finished or was stopped.
    ///
    /// An utterance interrupted by [`SpeechEngine::stop`] returns `Ok(())`.
    fn speak(&self, text: &str) -> Result<(), EngineError>;

    /// Request early termination of the in-flight utterance.
    ///
    /// Idempotent and a no-op while idle.
    fn stop(&self);

    fn configure(&self, settings: &VoiceSettings) -> Result<(), EngineError>;

    fn list_voices(&self) -> Result<Vec<Voice>, EngineError>;
}
