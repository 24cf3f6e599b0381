// Audio-side implementations of the core speech seam

// Shared audio utilities
#[cfg(feature = "tts")]
pub(crate) mod utils;

#[cfg(feature = "tts")]
pub mod tts;

#[cfg(feature = "tts")]
pub use tts::{CliSpeechEngine, EngineKind, TtsEngineConfig};
