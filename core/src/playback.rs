//! Playback of one deck through a speech engine.
//!
//! A [`PlaybackSession`] walks the slides in order. Every step is one blocking
//! call at a time: either a speak on the blocking pool or the inter-slide
//! delay. Cancellation is observed before each slide, during the delay, and
//! right after a speak returns; a speak in flight is interrupted by asking the
//! engine to stop.

use crate::remarks::ClosingRemarks;
use crate::slides::SlideRecord;
use crate::speech::{EngineError, SpeechEngine, VoiceSettings};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default pause between slides.
pub const DEFAULT_SLIDE_DELAY: Duration = Duration::from_millis(1500);

/// Characters of slide text shown in logs.
const LOG_PREVIEW_CHARS: usize = 80;

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Speech worker failed: {0}")]
    Worker(String),

    #[error("Session already ran")]
    AlreadyStarted,
}

#[derive(Debug)]
pub enum PlaybackOutcome {
    Completed,
    Cancelled,
    Failed(PlaybackError),
}

impl PlaybackOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Settings captured when a session starts.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    pub voice: VoiceSettings,
    pub delay: Duration,
    pub closing_remark_enabled: bool,
    pub remarks: ClosingRemarks,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            voice: VoiceSettings::default(),
            delay: DEFAULT_SLIDE_DELAY,
            closing_remark_enabled: true,
            remarks: ClosingRemarks::default(),
        }
    }
}

struct SessionInner {
    engine: Arc<dyn SpeechEngine>,
    cancel: CancellationToken,
    started: AtomicBool,
    speaking: AtomicBool,
    engine_stop_sent: AtomicBool,
    position: AtomicUsize,
}

/// One run through one deck. Clones are handles to the same session.
#[derive(Clone)]
pub struct PlaybackSession {
    inner: Arc<SessionInner>,
}

impl PlaybackSession {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                engine,
                cancel: CancellationToken::new(),
                started: AtomicBool::new(false),
                speaking: AtomicBool::new(false),
                engine_stop_sent: AtomicBool::new(false),
                position: AtomicUsize::new(0),
            }),
        }
    }

    /// Index of the slide most recently reached, 0 before the first one.
    pub fn position(&self) -> usize {
        self.inner.position.load(Ordering::SeqCst)
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.speaking.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Request the run loop to stop. Safe from any thread, any number of times.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
        // `speaking` is raised before the token is re-checked in `speak`, so either
        // the run loop sees the cancellation or this sees the utterance.
        if self.inner.speaking.load(Ordering::SeqCst)
            && !self.inner.engine_stop_sent.swap(true, Ordering::SeqCst)
        {
            debug!(target = "playback", "Stopping in-flight utterance");
            self.inner.engine.stop();
        }
    }

    pub async fn run(&self, slides: &[SlideRecord], config: &PlaybackConfig) -> PlaybackOutcome {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return PlaybackOutcome::Failed(PlaybackError::AlreadyStarted);
        }
        if slides.is_empty() {
            warn!(target = "playback", "No slides to read");
            return PlaybackOutcome::Completed;
        }
        if let Err(e) = self.inner.engine.configure(&config.voice) {
            return PlaybackOutcome::Failed(e.into());
        }

        let total = slides.len();
        info!(target = "playback", slides = total, "Starting presentation");

        for (i, slide) in slides.iter().enumerate() {
            if self.is_cancelled() {
                info!(target = "playback", slide = slide.index, "Playback cancelled");
                return PlaybackOutcome::Cancelled;
            }
            self.inner.position.store(slide.index, Ordering::SeqCst);

            if slide.is_empty() {
                debug!(target = "playback", slide = slide.index, "Slide is empty, nothing to say");
            } else {
                info!(
                    target = "playback",
                    slide = slide.index,
                    total,
                    text = %preview(&slide.text),
                    "Reading slide"
                );
                if let Some(outcome) = self.speak(slide.text.clone()).await {
                    return outcome;
                }
            }

            let is_last = i + 1 == total;
            if !is_last && !self.pause(config.delay).await {
                info!(target = "playback", slide = slide.index, "Playback cancelled during pause");
                return PlaybackOutcome::Cancelled;
            }
        }

        if config.closing_remark_enabled {
            if self.is_cancelled() {
                return PlaybackOutcome::Cancelled;
            }
            let remark = config.remarks.next_remark();
            info!(target = "playback", remark = %remark, "Closing remark");
            if let Some(outcome) = self.speak(remark).await {
                return outcome;
            }
        }

        info!(target = "playback", slides = total, "Presentation complete");
        PlaybackOutcome::Completed
    }

    /// Speak one utterance on the blocking pool.
    ///
    /// Returns `Some(outcome)` when the run must end here.
    async fn speak(&self, text: String) -> Option<PlaybackOutcome> {
        self.inner.speaking.store(true, Ordering::SeqCst);
        if self.is_cancelled() {
            self.inner.speaking.store(false, Ordering::SeqCst);
            return Some(PlaybackOutcome::Cancelled);
        }

        let engine = Arc::clone(&self.inner.engine);
        let result = tokio::task::spawn_blocking(move || engine.speak(&text)).await;
        self.inner.speaking.store(false, Ordering::SeqCst);

        match result {
            _ if self.is_cancelled() => Some(PlaybackOutcome::Cancelled),
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                warn!(target = "playback", error = %e, slide = self.position(), "Speech engine failed");
                Some(PlaybackOutcome::Failed(e.into()))
            }
            Err(join) => Some(PlaybackOutcome::Failed(PlaybackError::Worker(join.to_string()))),
        }
    }

    /// Sleep for `delay`. Returns false when cancelled first.
    async fn pause(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.is_cancelled();
        }
        tokio::select! {
            _ = self.inner.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => !self.is_cancelled(),
        }
    }
}

fn preview(text: &str) -> String {
    let flat = text.replace('\n', " ");
    match flat.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}
