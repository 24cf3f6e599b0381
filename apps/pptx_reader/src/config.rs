use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reader_audio::TtsEngineConfig;
use reader_core::playback::DEFAULT_SLIDE_DELAY;
use reader_core::scanner::default_targets;
use reader_core::speech::DEFAULT_RATE_WPM;
use reader_core::watcher::DEFAULT_POLL_INTERVAL;
use reader_core::{ClosingRemarks, PlaybackConfig, RemarkPolicy, VoiceSettings, WatcherConfig};

/// High-level configuration for pptx-reader
#[derive(Clone, Debug, Default)]
pub struct ReaderConfig {
    pub playback: PlaybackSettings,
    pub watch: WatchSettings,
    pub tts: TtsEngineConfig,
}

/// Voice and pacing used for every session
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackSettings {
    pub rate_wpm: u32,
    pub volume: f32,
    pub voice: Option<String>,
    /// Pause between slides, seconds
    pub delay_secs: f64,
    pub closing_remark: bool,
    pub remark_policy: RemarkPolicy,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WatchSettings {
    /// Seconds between process scans
    pub poll_interval_secs: f64,
    pub targets: Vec<String>,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_secs(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| parse_secs(&v).ok())
}

/// Parse a non-negative, finite number of seconds such as `1.5`.
pub fn parse_secs(s: &str) -> Result<f64, String> {
    let secs: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", s))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("'{}' must be zero or more seconds", s));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| format!("'{}': {}", s, e))?;
    Ok(secs)
}

fn secs_to_duration(secs: f64, fallback: Duration) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(fallback)
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            rate_wpm: env_parse("READER_RATE").unwrap_or(DEFAULT_RATE_WPM),
            volume: env_parse("READER_VOLUME").unwrap_or(1.0),
            voice: std::env::var("READER_VOICE").ok().filter(|s| !s.is_empty()),
            delay_secs: env_secs("SLIDE_DELAY_SECS").unwrap_or(DEFAULT_SLIDE_DELAY.as_secs_f64()),
            closing_remark: env_parse("CLOSING_REMARK").unwrap_or(true),
            remark_policy: env_parse("REMARK_POLICY").unwrap_or_default(),
        }
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        let targets = std::env::var("TARGET_APPS")
            .ok()
            .map(|s| split_targets(&s))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(default_targets);
        Self {
            poll_interval_secs: env_secs("POLL_INTERVAL_SECS")
                .unwrap_or(DEFAULT_POLL_INTERVAL.as_secs_f64()),
            targets,
        }
    }
}

fn split_targets(s: &str) -> Vec<String> {
    s.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

impl ReaderConfig {
    /// Load configuration from a TOML file (path via PPTX_READER_CONFIG or ./pptx_reader.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path =
            std::env::var("PPTX_READER_CONFIG").unwrap_or_else(|_| "pptx_reader.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::debug!(target = "pptx_reader", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match default.clone().overlay_str(&s) {
                Ok(cfg) => {
                    tracing::info!(target = "pptx_reader", path = %path, "Loaded TOML config");
                    cfg
                }
                Err(e) => {
                    tracing::warn!(target = "pptx_reader", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target = "pptx_reader", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    pub fn overlay_str(self, s: &str) -> Result<Self, toml::de::Error> {
        let t = toml::from_str::<ReaderToml>(s)?;
        Ok(t.overlay(self))
    }

    pub fn playback_config(&self) -> PlaybackConfig {
        let p = &self.playback;
        PlaybackConfig {
            voice: VoiceSettings {
                rate: p.rate_wpm,
                volume: p.volume,
                voice: p.voice.clone(),
            },
            delay: secs_to_duration(p.delay_secs, DEFAULT_SLIDE_DELAY),
            closing_remark_enabled: p.closing_remark,
            remarks: ClosingRemarks::new(p.remark_policy.clone()),
        }
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            poll_interval: secs_to_duration(self.watch.poll_interval_secs, DEFAULT_POLL_INTERVAL),
            targets: self.watch.targets.clone(),
            playback: self.playback_config(),
        }
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ReaderToml {
    pub playback: Option<PlaybackToml>,
    pub watch: Option<WatchToml>,
    pub tts: Option<TtsToml>,
}

impl ReaderToml {
    fn overlay(self, mut base: ReaderConfig) -> ReaderConfig {
        if let Some(p) = self.playback {
            p.apply(&mut base.playback);
        }
        if let Some(w) = self.watch {
            w.apply(&mut base.watch);
        }
        if let Some(t) = self.tts {
            t.apply(&mut base.tts);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct PlaybackToml {
    pub rate: Option<u32>,
    pub volume: Option<f32>,
    pub voice: Option<String>,
    pub delay_secs: Option<f64>,
    pub closing_remark: Option<bool>,
    pub remark_policy: Option<String>,
}
impl PlaybackToml {
    fn apply(self, p: &mut PlaybackSettings) {
        if let Some(x) = self.rate {
            p.rate_wpm = x;
        }
        if let Some(x) = self.volume {
            p.volume = x.clamp(0.0, 2.0);
        }
        if let Some(x) = self.voice {
            p.voice = Some(x).filter(|v| !v.is_empty());
        }
        if let Some(x) = self.delay_secs {
            match parse_secs(&x.to_string()) {
                Ok(secs) => p.delay_secs = secs,
                Err(e) => tracing::warn!(target = "pptx_reader", error = %e, "Ignoring delay_secs"),
            }
        }
        if let Some(x) = self.closing_remark {
            p.closing_remark = x;
        }
        if let Some(x) = self.remark_policy {
            match x.parse() {
                Ok(policy) => p.remark_policy = policy,
                Err(e) => tracing::warn!(target = "pptx_reader", error = %e, "Ignoring remark_policy"),
            }
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct WatchToml {
    pub poll_interval_secs: Option<f64>,
    pub targets: Option<Vec<String>>,
}
impl WatchToml {
    fn apply(self, w: &mut WatchSettings) {
        if let Some(x) = self.poll_interval_secs {
            match parse_secs(&x.to_string()) {
                Ok(secs) => w.poll_interval_secs = secs,
                Err(e) => {
                    tracing::warn!(target = "pptx_reader", error = %e, "Ignoring poll_interval_secs")
                }
            }
        }
        if let Some(x) = self.targets {
            let targets: Vec<String> = x.into_iter().filter(|t| !t.trim().is_empty()).collect();
            if !targets.is_empty() {
                w.targets = targets;
            }
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct TtsToml {
    pub temp_dir: Option<PathBuf>,
    pub sample_rate: Option<u32>,
    pub piper_bin: Option<PathBuf>,
    pub piper_voice: Option<PathBuf>,
    pub piper_voice_dir: Option<PathBuf>,
    pub espeak_bin: Option<PathBuf>,
    pub player: Option<String>,
}
impl TtsToml {
    fn apply(self, t: &mut TtsEngineConfig) {
        if let Some(x) = self.temp_dir {
            t.temp_dir = x;
        }
        if let Some(x) = self.sample_rate {
            t.default_sample_rate = x;
        }
        if let Some(x) = self.piper_bin {
            t.piper_bin = Some(x);
        }
        if let Some(x) = self.piper_voice {
            t.piper_voice = Some(x);
        }
        if let Some(x) = self.piper_voice_dir {
            t.piper_voice_dir = Some(x);
        }
        if let Some(x) = self.espeak_bin {
            t.espeak_bin = Some(x);
        }
        if let Some(x) = self.player {
            t.player = Some(x);
        }
    }
}
