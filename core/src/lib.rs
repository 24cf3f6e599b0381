// pptx-reader Core Library
// Slide extraction, playback sessions and presentation-process detection

pub mod playback;
pub mod remarks;
pub mod scanner;
pub mod slides;
pub mod speech;
pub mod watcher;

// Export core types
pub use playback::{PlaybackConfig, PlaybackError, PlaybackOutcome, PlaybackSession};
pub use remarks::{ClosingRemarks, RemarkPolicy, CLOSING_REMARKS};
pub use scanner::{DetectedProcess, ProcessScanner, ScanError, SystemProcessScanner};
pub use slides::{ParseError, PptxSlideSource, SlideRecord, SlideSource};
pub use speech::{EngineError, SpeechEngine, Voice, VoiceSettings};
pub use watcher::{DetectionWatcher, WatchEvent, WatchPhase, WatchSnapshot, WatcherConfig};

// Error types
use thiserror::Error;

/// Top-level error, one variant per pipeline stage.
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ParseError),

    #[error("Synthesis failed: {0}")]
    Synthesis(#[from] EngineError),

    #[error("Detection failed: {0}")]
    Detection(#[from] ScanError),

    #[error("Playback failed: {0}")]
    Playback(#[from] PlaybackError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReaderError>;
