//! Fakes shared by the playback and watcher tests.

#![allow(dead_code)]

use reader_core::{
    DetectedProcess, EngineError, ParseError, ProcessScanner, ScanError, SlideRecord, SlideSource,
    SpeechEngine, Voice, VoiceSettings,
};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Engine that records every utterance.
///
/// With `hold` set, `speak` blocks until `stop` is called, like a long
/// utterance that only ends when interrupted.
#[derive(Default)]
pub struct RecordingEngine {
    spoken: Mutex<Vec<String>>,
    configured: Mutex<Option<VoiceSettings>>,
    stops: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_on: Option<usize>,
    hold: bool,
    stop_signal: Mutex<bool>,
    wake: Condvar,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holding() -> Self {
        Self {
            hold: true,
            ..Self::default()
        }
    }

    /// Fail the `n`-th utterance (1-based).
    pub fn failing_on(n: usize) -> Self {
        Self {
            fail_on: Some(n),
            ..Self::default()
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn speak_count(&self) -> usize {
        self.spoken.lock().unwrap().len()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn configured(&self) -> Option<VoiceSettings> {
        self.configured.lock().unwrap().clone()
    }
}

impl SpeechEngine for RecordingEngine {
    fn speak(&self, text: &str) -> Result<(), EngineError> {
        let n = {
            let mut spoken = self.spoken.lock().unwrap();
            spoken.push(text.to_string());
            spoken.len()
        };
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = if self.fail_on == Some(n) {
            Err(EngineError::Synthesis(format!("audio device lost on utterance {}", n)))
        } else {
            if self.hold {
                let mut stopped = self.stop_signal.lock().unwrap();
                while !*stopped {
                    stopped = self.wake.wait(stopped).unwrap();
                }
                *stopped = false;
            }
            Ok(())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.hold {
            *self.stop_signal.lock().unwrap() = true;
            self.wake.notify_all();
        }
    }

    fn configure(&self, settings: &VoiceSettings) -> Result<(), EngineError> {
        *self.configured.lock().unwrap() = Some(settings.clone());
        Ok(())
    }

    fn list_voices(&self) -> Result<Vec<Voice>, EngineError> {
        Ok(vec![])
    }
}

/// Scanner that replays a fixed script, then reports nothing.
#[derive(Default)]
pub struct ScriptedScanner {
    script: Mutex<VecDeque<Result<Vec<DetectedProcess>, ScanError>>>,
    calls: AtomicUsize,
    repeat_last: Mutex<Option<Vec<DetectedProcess>>>,
}

impl ScriptedScanner {
    pub fn new(script: Vec<Result<Vec<DetectedProcess>, ScanError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// Report the same processes on every scan.
    pub fn always(found: Vec<DetectedProcess>) -> Self {
        Self {
            repeat_last: Mutex::new(Some(found)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProcessScanner for ScriptedScanner {
    fn scan(&self, _targets: &[String]) -> Result<Vec<DetectedProcess>, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        Ok(self.repeat_last.lock().unwrap().clone().unwrap_or_default())
    }
}

/// Slide source backed by an in-memory map.
#[derive(Default)]
pub struct MapSource {
    decks: HashMap<PathBuf, Vec<SlideRecord>>,
    calls: Mutex<Vec<PathBuf>>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deck(mut self, path: &str, slides: Vec<SlideRecord>) -> Self {
        self.decks.insert(PathBuf::from(path), slides);
        self
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

impl SlideSource for MapSource {
    fn parse(&self, path: &Path) -> Result<Vec<SlideRecord>, ParseError> {
        self.calls.lock().unwrap().push(path.to_path_buf());
        self.decks
            .get(path)
            .cloned()
            .ok_or_else(|| ParseError::NotFound(path.to_path_buf()))
    }
}

pub fn deck(n: usize) -> Vec<SlideRecord> {
    (1..=n)
        .map(|i| SlideRecord::new(i, format!("Slide {}", i)))
        .collect()
}

pub fn found(pid: u32, path: &str) -> DetectedProcess {
    DetectedProcess {
        pid,
        path: PathBuf::from(path),
    }
}

/// Poll `cond` until it holds; panics after `timeout`.
pub async fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in {:?}", timeout);
        sleep(Duration::from_millis(5)).await;
    }
}
