//! Detection watcher: polls for presentation processes and drives playback.
//!
//! The watcher owns a single [`WatchState`]: the path believed to be open in
//! the target application and at most one running [`PlaybackSession`]. Each
//! poll compares a fresh process scan against that state:
//!
//! - a new path starts a session (after parsing the deck)
//! - a vanished path cancels the session and clears the state
//! - a changed path cancels the old session before starting the new one
//! - a session that finished on its own is reaped, the path is kept so the
//!   same open file does not restart playback
//!
//! A failed scan skips that cycle entirely: the state is left as it was, a
//! playing session keeps playing, and a [`WatchEvent::ScanFailed`] is sent.
//!
//! The state lock is never held across an `.await`; session handoff happens
//! under the lock, so two sessions are never considered active together.

use crate::playback::{PlaybackConfig, PlaybackError, PlaybackOutcome, PlaybackSession};
use crate::scanner::{default_targets, DetectedProcess, ProcessScanner, ScanError};
use crate::slides::{ParseError, SlideSource};
use crate::speech::SpeechEngine;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
const EVENT_CAPACITY: usize = 64;

#[derive(Clone, Debug)]
pub struct WatcherConfig {
    pub poll_interval: Duration,
    /// Process names treated as presentation applications
    pub targets: Vec<String>,
    /// Applied to every session the watcher starts
    pub playback: PlaybackConfig,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            targets: default_targets(),
            playback: PlaybackConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchPhase {
    /// Not polling
    Idle,
    /// Polling, no session running
    WatchingInactive,
    Playing,
    /// Tearing down a session
    Stopping,
}

/// Notifications published on every state transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchEvent {
    SessionStarted { path: PathBuf, slides: usize },
    SessionCancelled { path: PathBuf },
    /// Ran to its end; `error` is set when the session failed
    SessionFinished { path: PathBuf, error: Option<String> },
    ParseFailed { path: PathBuf, error: String },
    ScanFailed { error: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchSnapshot {
    pub phase: WatchPhase,
    pub current_path: Option<PathBuf>,
    pub session_active: bool,
}

struct ActiveSession {
    path: PathBuf,
    session: PlaybackSession,
    task: JoinHandle<PlaybackOutcome>,
}

/// Invariant: `active_session` is set only while `currently_open_path` is set
/// and equal to the session's path.
struct WatchState {
    phase: WatchPhase,
    currently_open_path: Option<PathBuf>,
    active_session: Option<ActiveSession>,
}

pub struct DetectionWatcher {
    scanner: Arc<dyn ProcessScanner>,
    source: Arc<dyn SlideSource>,
    engine: Arc<dyn SpeechEngine>,
    cfg: WatcherConfig,
    state: Mutex<WatchState>,
    shutdown: CancellationToken,
    events: broadcast::Sender<WatchEvent>,
}

impl DetectionWatcher {
    pub fn new(
        scanner: Arc<dyn ProcessScanner>,
        source: Arc<dyn SlideSource>,
        engine: Arc<dyn SpeechEngine>,
        cfg: WatcherConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            scanner,
            source,
            engine,
            cfg,
            state: Mutex::new(WatchState {
                phase: WatchPhase::Idle,
                currently_open_path: None,
                active_session: None,
            }),
            shutdown: CancellationToken::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn snapshot(&self) -> WatchSnapshot {
        let st = self.state();
        let running = st
            .active_session
            .as_ref()
            .map(|a| !a.task.is_finished())
            .unwrap_or(false);
        let phase = match st.phase {
            WatchPhase::Playing if !running => WatchPhase::WatchingInactive,
            other => other,
        };
        WatchSnapshot {
            phase,
            current_path: st.currently_open_path.clone(),
            session_active: running,
        }
    }

    /// Poll until [`DetectionWatcher::stop`] is called, then tear down.
    ///
    /// A stopped watcher does not run again.
    pub async fn run(&self) {
        if self.is_stopped() {
            return;
        }
        self.state().phase = WatchPhase::WatchingInactive;

        let period = self.cfg.poll_interval.max(MIN_POLL_INTERVAL);
        info!(
            target = "watcher",
            poll_ms = period.as_millis() as u64,
            targets = ?self.cfg.targets,
            "Watching for presentation processes"
        );

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => self.poll_once().await,
            }
        }

        self.teardown().await;
    }

    /// Halt polling and cancel the active session. Safe during a poll.
    pub fn stop(&self) {
        // Cancel before locking: a poll that already holds the lock either sees
        // the token or has published its session for us to cancel below.
        self.shutdown.cancel();
        let st = self.state();
        if let Some(active) = st.active_session.as_ref() {
            active.session.cancel();
        }
        debug!(target = "watcher", "Stop requested");
    }

    /// [`DetectionWatcher::stop`] plus waiting for the session to wind down.
    pub async fn shutdown(&self) {
        self.stop();
        self.teardown().await;
    }

    /// One scan and the transitions it implies.
    pub async fn poll_once(&self) {
        if self.is_stopped() {
            return;
        }
        {
            let mut st = self.state();
            if st.phase == WatchPhase::Idle {
                st.phase = WatchPhase::WatchingInactive;
            }
        }
        self.reap_finished().await;

        let scanner = Arc::clone(&self.scanner);
        let targets = self.cfg.targets.clone();
        let scanned = tokio::task::spawn_blocking(move || scanner.scan(&targets))
            .await
            .unwrap_or_else(|e| Err(ScanError::Worker(e.to_string())));
        let detected = match scanned {
            Ok(d) => d,
            Err(e) => {
                warn!(target = "watcher", stage = "detection", error = %e, "Process scan failed; retrying next poll");
                self.emit(WatchEvent::ScanFailed {
                    error: e.to_string(),
                });
                return;
            }
        };

        let current = self.state().currently_open_path.clone();
        let observed = choose_path(current.as_deref(), &detected);

        match (current, observed) {
            (None, None) => {}
            (Some(cur), Some(obs)) if cur == obs => {}
            (Some(cur), None) => {
                info!(target = "watcher", path = %cur.display(), "Presentation closed");
                self.stop_active().await;
                let mut st = self.state();
                st.currently_open_path = None;
                st.phase = WatchPhase::WatchingInactive;
            }
            (cur, Some(obs)) => {
                if let Some(cur) = cur {
                    info!(target = "watcher", from = %cur.display(), to = %obs.display(), "Presentation switched");
                    self.stop_active().await;
                }
                self.start_session(obs).await;
            }
        }
    }

    fn state(&self) -> MutexGuard<'_, WatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: WatchEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn start_session(&self, path: PathBuf) {
        {
            // Remember the path even if parsing fails so it is not retried every poll
            let mut st = self.state();
            st.currently_open_path = Some(path.clone());
            st.phase = WatchPhase::WatchingInactive;
        }
        info!(target = "watcher", path = %path.display(), "Detected presentation");

        let source = Arc::clone(&self.source);
        let to_parse = path.clone();
        let parsed = tokio::task::spawn_blocking(move || source.parse(&to_parse))
            .await
            .unwrap_or_else(|e| Err(ParseError::Malformed(format!("parser worker failed: {}", e))));
        let slides = match parsed {
            Ok(slides) => slides,
            Err(e) => {
                error!(target = "watcher", stage = "extraction", path = %path.display(), error = %e, "Could not read presentation");
                self.emit(WatchEvent::ParseFailed {
                    path,
                    error: e.to_string(),
                });
                return;
            }
        };

        let count = slides.len();
        let session = PlaybackSession::new(Arc::clone(&self.engine));
        {
            let mut st = self.state();
            if self.is_stopped() || st.currently_open_path.as_deref() != Some(path.as_path()) {
                debug!(target = "watcher", path = %path.display(), "Watcher stopped before playback started");
                return;
            }
            let task = {
                let session = session.clone();
                let config = self.cfg.playback.clone();
                tokio::spawn(async move { session.run(&slides, &config).await })
            };
            st.active_session = Some(ActiveSession {
                path: path.clone(),
                session,
                task,
            });
            st.phase = WatchPhase::Playing;
        }

        info!(target = "watcher", path = %path.display(), slides = count, "Playback started");
        self.emit(WatchEvent::SessionStarted {
            path,
            slides: count,
        });
    }

    /// Cancel the active session, if any, and wait for it to end.
    async fn stop_active(&self) {
        let active = {
            let mut st = self.state();
            let active = st.active_session.take();
            if active.is_some() {
                st.phase = WatchPhase::Stopping;
            }
            active
        };
        let Some(active) = active else {
            return;
        };

        active.session.cancel();
        let outcome = join_outcome(active.task).await;
        self.report(active.path, outcome);
    }

    /// Collect a session that ended by itself. The path stays recorded.
    async fn reap_finished(&self) {
        let finished = {
            let mut st = self.state();
            let done = st
                .active_session
                .as_ref()
                .map(|a| a.task.is_finished())
                .unwrap_or(false);
            if done {
                st.phase = WatchPhase::WatchingInactive;
                st.active_session.take()
            } else {
                None
            }
        };
        if let Some(active) = finished {
            let outcome = join_outcome(active.task).await;
            self.report(active.path, outcome);
        }
    }

    fn report(&self, path: PathBuf, outcome: PlaybackOutcome) {
        match outcome {
            PlaybackOutcome::Cancelled => {
                info!(target = "watcher", path = %path.display(), "Playback cancelled");
                self.emit(WatchEvent::SessionCancelled { path });
            }
            PlaybackOutcome::Completed => {
                info!(target = "watcher", path = %path.display(), "Playback completed");
                self.emit(WatchEvent::SessionFinished { path, error: None });
            }
            PlaybackOutcome::Failed(e) => {
                error!(target = "watcher", stage = "synthesis", path = %path.display(), error = %e, "Playback failed");
                self.emit(WatchEvent::SessionFinished {
                    path,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    async fn teardown(&self) {
        self.stop_active().await;
        let mut st = self.state();
        st.currently_open_path = None;
        st.phase = WatchPhase::Idle;
        info!(target = "watcher", "Watcher stopped");
    }
}

async fn join_outcome(task: JoinHandle<PlaybackOutcome>) -> PlaybackOutcome {
    task.await
        .unwrap_or_else(|e| PlaybackOutcome::Failed(PlaybackError::Worker(e.to_string())))
}

/// Keep the open path while it is still reported, otherwise take the lowest pid.
fn choose_path(current: Option<&Path>, detected: &[DetectedProcess]) -> Option<PathBuf> {
    if let Some(cur) = current {
        if detected.iter().any(|d| d.path == cur) {
            return Some(cur.to_path_buf());
        }
    }
    detected
        .iter()
        .min_by_key(|d| d.pid)
        .map(|d| d.path.clone())
}
