//! Text-to-Speech (TTS) engine backed by local CLI tools
//!
//! Implements the core `SpeechEngine` seam with graceful engine selection:
//! - Prefer Piper (higher quality, requires a voice model and an audio player)
//! - Fallback to espeak-ng (widely available, speaks straight to the device)
//! - If neither is usable, construction fails with `EngineError::Unavailable`
//!
//! Every child process is tracked so `stop()` can kill it from another thread;
//! an utterance ended that way counts as a normal return. A stop that arrives
//! before the child exists is latched and ends the next utterance before it
//! spawns anything; the latch is cleared when that utterance returns.
//!
//! Env overrides:
//! - PIPER_BIN, PIPER_VOICE, PIPER_VOICE_DIR
//! - ESPEAK_BIN
//! - TTS_PLAYER, TTS_TEMP_DIR

use crate::utils::scratch_wav_path;
use reader_core::speech::DEFAULT_RATE_WPM;
use reader_core::{EngineError, SpeechEngine, Voice, VoiceSettings};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often a running child is checked for exit.
const CHILD_POLL: Duration = Duration::from_millis(20);
const PLAYERS: [&str; 3] = ["aplay", "paplay", "ffplay"];

#[derive(Clone, Debug)]
pub struct TtsEngineConfig {
    pub temp_dir: PathBuf,
    pub default_sample_rate: u32,
    pub piper_bin: Option<PathBuf>,
    pub piper_voice: Option<PathBuf>,
    pub piper_voice_dir: Option<PathBuf>,
    pub espeak_bin: Option<PathBuf>,
    /// Preferred WAV player (aplay|paplay|ffplay)
    pub player: Option<String>,
}

impl Default for TtsEngineConfig {
    fn default() -> Self {
        let temp_dir = std::env::var("TTS_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());

        let piper_bin = get_from_env_or_path("PIPER_BIN", "piper");
        let piper_voice = std::env::var("PIPER_VOICE").ok().map(PathBuf::from);
        let piper_voice_dir = std::env::var("PIPER_VOICE_DIR").ok().map(PathBuf::from);
        let espeak_bin =
            get_from_env_or_path("ESPEAK_BIN", "espeak-ng").or_else(|| get_from_path("espeak"));
        let player = std::env::var("TTS_PLAYER").ok().filter(|s| !s.is_empty());

        Self {
            temp_dir,
            default_sample_rate: 22_050,
            piper_bin,
            piper_voice,
            piper_voice_dir,
            espeak_bin,
            player,
        }
    }
}

fn get_from_env_or_path(env_key: &str, default_bin: &str) -> Option<PathBuf> {
    if let Ok(p) = std::env::var(env_key) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Some(pb);
        }
    }
    get_from_path(default_bin)
}

fn get_from_path(bin: &str) -> Option<PathBuf> {
    // If a path-like string is provided, respect it directly
    if bin.contains(std::path::MAIN_SEPARATOR) {
        let p = PathBuf::from(bin);
        return if p.exists() { Some(p) } else { None };
    }

    // Search PATH portably
    if let Some(paths_os) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&paths_os) {
            let candidate = dir.join(bin);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineKind {
    Piper,
    EspeakNg,
}

/// Process slot shared by `speak` and `stop`.
#[derive(Default)]
struct Tracked {
    child: Option<Child>,
    stop_requested: bool,
}

pub struct CliSpeechEngine {
    cfg: TtsEngineConfig,
    kind: EngineKind,
    player: Option<PathBuf>,
    settings: Mutex<VoiceSettings>,
    tracked: Mutex<Tracked>,
}

impl CliSpeechEngine {
    pub fn new(cfg: TtsEngineConfig) -> Result<Self, EngineError> {
        let player = select_player(cfg.player.as_deref());
        let piper_ready = cfg.piper_bin.is_some()
            && resolve_piper_voice_path(&cfg, "").is_some()
            && player.is_some();

        let kind = if piper_ready {
            EngineKind::Piper
        } else if cfg.espeak_bin.is_some() {
            EngineKind::EspeakNg
        } else {
            return Err(EngineError::Unavailable(
                "install espeak-ng, or piper with a voice model (PIPER_VOICE) and an audio player"
                    .into(),
            ));
        };

        match kind {
            EngineKind::Piper => {
                info!(target = "tts", bin = ?cfg.piper_bin, player = ?player, "Using Piper")
            }
            EngineKind::EspeakNg => {
                info!(target = "tts", bin = ?cfg.espeak_bin, "Using espeak-ng")
            }
        }

        Ok(Self {
            cfg,
            kind,
            player,
            settings: Mutex::new(VoiceSettings::default()),
            tracked: Mutex::new(Tracked::default()),
        })
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    fn tracked(&self) -> MutexGuard<'_, Tracked> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_settings(&self) -> VoiceSettings {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn stop_pending(&self) -> bool {
        self.tracked().stop_requested
    }

    /// Kill and reap a child that will not be waited on normally.
    fn abandon_child(&self) {
        let child = self.tracked().child.take();
        if let Some(mut child) = child {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    /// Spawn `cmd`, optionally feeding `stdin_text`, and wait for it while
    /// keeping it reachable for `stop()`.
    fn run_tracked(
        &self,
        mut cmd: Command,
        stdin_text: Option<&str>,
        what: &str,
    ) -> Result<(), EngineError> {
        cmd.stdin(if stdin_text.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());
        if self.stop_pending() {
            debug!(target = "tts", "{} skipped, stop pending", what);
            return Ok(());
        }
        debug!(target = "tts", command = ?cmd, "Running {}", what);

        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take();
        let stderr = child.stderr.take();
        {
            // A stop that raced the spawn finds no child; honour it here
            let mut tracked = self.tracked();
            if tracked.stop_requested {
                let _ = child.kill();
            }
            tracked.child = Some(child);
        }

        if let (Some(text), Some(mut stdin)) = (stdin_text, stdin) {
            if let Err(e) = stdin.write_all(text.as_bytes()) {
                drop(stdin);
                self.abandon_child();
                if self.stop_pending() {
                    return Ok(());
                }
                return Err(e.into());
            }
        }

        let status = self.wait_tracked()?;
        if self.stop_pending() {
            debug!(target = "tts", "{} interrupted", what);
            return Ok(());
        }
        if !status.success() {
            let mut detail = String::new();
            if let Some(mut err) = stderr {
                let _ = err.read_to_string(&mut detail);
            }
            return Err(EngineError::Synthesis(format!(
                "{} exited with {}: {}",
                what,
                status,
                detail.trim()
            )));
        }
        Ok(())
    }

    fn wait_tracked(&self) -> Result<ExitStatus, EngineError> {
        loop {
            {
                let mut tracked = self.tracked();
                match tracked.child.as_mut() {
                    Some(child) => {
                        if let Some(status) = child.try_wait()? {
                            tracked.child = None;
                            return Ok(status);
                        }
                    }
                    None => {
                        return Err(EngineError::Synthesis("speech process lost".into()));
                    }
                }
            }
            thread::sleep(CHILD_POLL);
        }
    }

    fn speak_with_espeak(&self, settings: &VoiceSettings, text: &str) -> Result<(), EngineError> {
        let espeak = self
            .cfg
            .espeak_bin
            .as_ref()
            .ok_or_else(|| EngineError::Unavailable("espeak-ng not found".into()))?;
        let cmd = espeak_command(espeak, settings, text);
        self.run_tracked(cmd, None, "espeak-ng")
    }

    fn speak_with_piper(&self, settings: &VoiceSettings, text: &str) -> Result<(), EngineError> {
        let piper = self
            .cfg
            .piper_bin
            .as_ref()
            .ok_or_else(|| EngineError::Unavailable("Piper binary not found".into()))?;
        let voice = settings.voice.as_deref().unwrap_or("");
        let voice_path = resolve_piper_voice_path(&self.cfg, voice).ok_or_else(|| {
            EngineError::Synthesis("Piper voice not found; set PIPER_VOICE or choose a voice".into())
        })?;
        let player = self
            .player
            .as_ref()
            .ok_or_else(|| EngineError::Playback("No audio player found".into()))?;

        let wav_path = scratch_wav_path(&self.cfg.temp_dir);
        let result = (|| {
            let cmd = piper_command(
                piper,
                &voice_path,
                settings.rate,
                self.cfg.default_sample_rate,
                &wav_path,
            );
            self.run_tracked(cmd, Some(text), "piper")?;
            if self.stop_pending() {
                return Ok(());
            }

            // Post-process volume for Piper only
            if (settings.volume - 1.0).abs() > f32::EPSILON {
                if let Err(e) = scale_wav_pcm16_inplace(&wav_path, settings.volume) {
                    warn!(target = "tts", error = %e, "Failed to scale volume for WAV");
                }
            }

            self.run_tracked(player_command(player, &wav_path), None, "player")
                .map_err(|e| match e {
                    EngineError::Synthesis(msg) => EngineError::Playback(msg),
                    other => other,
                })
        })();

        let _ = fs::remove_file(&wav_path);
        result
    }

    fn piper_voices(&self) -> Result<Vec<Voice>, EngineError> {
        let mut voices = Vec::new();
        if let Some(v) = &self.cfg.piper_voice {
            voices.push(piper_voice_entry(v));
        }
        if let Some(dir) = &self.cfg.piper_voice_dir {
            let mut models: Vec<PathBuf> = fs::read_dir(dir)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().map(|e| e == "onnx").unwrap_or(false))
                .collect();
            models.sort();
            for m in models {
                let entry = piper_voice_entry(&m);
                if !voices.contains(&entry) {
                    voices.push(entry);
                }
            }
        }
        Ok(voices)
    }

    fn espeak_voices(&self) -> Result<Vec<Voice>, EngineError> {
        let espeak = self
            .cfg
            .espeak_bin
            .as_ref()
            .ok_or_else(|| EngineError::Unavailable("espeak-ng not found".into()))?;
        let output = Command::new(espeak).arg("--voices").output()?;
        if !output.status.success() {
            return Err(EngineError::Synthesis(format!(
                "espeak-ng --voices failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(parse_espeak_voices(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl SpeechEngine for CliSpeechEngine {
    fn speak(&self, text: &str) -> Result<(), EngineError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        if std::mem::take(&mut self.tracked().stop_requested) {
            debug!(target = "tts", "Stop requested before speaking");
            return Ok(());
        }
        let settings = self.current_settings();
        let result = match self.kind {
            EngineKind::Piper => self.speak_with_piper(&settings, text),
            EngineKind::EspeakNg => self.speak_with_espeak(&settings, text),
        };
        // A stop aimed at this utterance must not end the next one
        self.tracked().stop_requested = false;
        result
    }

    fn stop(&self) {
        let mut tracked = self.tracked();
        tracked.stop_requested = true;
        if let Some(child) = tracked.child.as_mut() {
            if let Err(e) = child.kill() {
                // Already exited between polls
                debug!(target = "tts", error = %e, "Kill failed");
            }
        }
    }

    fn configure(&self, settings: &VoiceSettings) -> Result<(), EngineError> {
        settings.validate()?;
        if self.kind == EngineKind::Piper {
            if let Some(v) = settings.voice.as_deref() {
                if resolve_piper_voice_path(&self.cfg, v).is_none() {
                    return Err(EngineError::InvalidSettings(format!("unknown Piper voice '{}'", v)));
                }
            }
        }
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner) = settings.clone();
        Ok(())
    }

    fn list_voices(&self) -> Result<Vec<Voice>, EngineError> {
        match self.kind {
            EngineKind::Piper => self.piper_voices(),
            EngineKind::EspeakNg => self.espeak_voices(),
        }
    }
}

fn espeak_command(espeak: &Path, settings: &VoiceSettings, text: &str) -> Command {
    let mut cmd = Command::new(espeak);
    let wpm = settings.rate.clamp(80, 450);
    let amp = (100.0 * settings.volume).round().clamp(0.0, 200.0) as i32;
    if let Some(voice) = settings.voice.as_deref().filter(|v| !v.is_empty()) {
        cmd.arg("-v").arg(voice);
    }
    cmd.arg("-s").arg(wpm.to_string());
    cmd.arg("-a").arg(amp.to_string());
    cmd.arg("--").arg(text);
    cmd
}

/// Piper's length scale for a words-per-minute rate.
fn length_scale(rate_wpm: u32) -> f32 {
    (DEFAULT_RATE_WPM as f32 / rate_wpm.max(1) as f32).clamp(0.5, 2.0)
}

fn piper_command(
    piper: &Path,
    voice_path: &Path,
    rate_wpm: u32,
    sample_rate: u32,
    out_wav: &Path,
) -> Command {
    let mut cmd = Command::new(piper);
    cmd.arg("-m").arg(voice_path);
    cmd.arg("-f").arg(out_wav);
    cmd.arg("--length_scale")
        .arg(format!("{:.2}", length_scale(rate_wpm)));
    cmd.arg("--sample_rate").arg(sample_rate.to_string());
    cmd
}

fn player_command(player_bin: &Path, wav_path: &Path) -> Command {
    let name = player_bin
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    let mut cmd = Command::new(player_bin);
    if name == "ffplay" {
        cmd.arg("-autoexit").arg("-nodisp").arg("-loglevel").arg("error");
    }
    cmd.arg(wav_path);
    cmd
}

fn select_player(pref: Option<&str>) -> Option<PathBuf> {
    pref.and_then(get_from_path)
        .or_else(|| PLAYERS.iter().find_map(|p| get_from_path(p)))
}

fn resolve_piper_voice_path(cfg: &TtsEngineConfig, voice: &str) -> Option<PathBuf> {
    if voice.is_empty() {
        return cfg.piper_voice.clone().filter(|p| p.exists());
    }
    let vh = PathBuf::from(voice);
    if vh.exists() {
        return Some(vh);
    }
    if let Some(dir) = &cfg.piper_voice_dir {
        let candidate = dir.join(voice);
        if candidate.exists() {
            return Some(candidate);
        }
        for ext in ["onnx", "onnx.gz", "pt", "pth"].iter() {
            let c = dir.join(format!("{}.{}", voice, ext));
            if c.exists() {
                return Some(c);
            }
        }
    }
    None
}

fn piper_voice_entry(model: &Path) -> Voice {
    let name = model
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    // Piper models are named like `en_US-lessac-medium`
    let language = name.split('-').next().unwrap_or("").to_string();
    Voice {
        id: model.to_string_lossy().to_string(),
        name,
        language,
    }
}

/// Parse the table printed by `espeak-ng --voices`.
fn parse_espeak_voices(table: &str) -> Vec<Voice> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 5 {
                return None;
            }
            Some(Voice {
                id: cols[1].to_string(),
                name: cols[3].replace('_', " "),
                language: cols[1].to_string(),
            })
        })
        .collect()
}

fn scale_wav_pcm16_inplace(path: &Path, gain: f32) -> std::io::Result<()> {
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;

    if buf.len() < 12 || &buf[0..4] != b"RIFF" || &buf[8..12] != b"WAVE" {
        return Ok(());
    }
    let mut idx = 12;
    let mut data_start = None;
    let mut data_len = 0usize;
    while idx + 8 <= buf.len() {
        let chunk_id = &buf[idx..idx + 4];
        let sz =
            u32::from_le_bytes([buf[idx + 4], buf[idx + 5], buf[idx + 6], buf[idx + 7]]) as usize;
        if chunk_id == b"data" {
            data_start = Some(idx + 8);
            data_len = sz;
            break;
        }
        idx += 8 + sz;
    }
    if let Some(start) = data_start {
        let end = (start + data_len).min(buf.len());
        let data = &mut buf[start..end];
        for chunk in data.chunks_exact_mut(2) {
            let s = i16::from_le_bytes([chunk[0], chunk[1]]);
            let scaled = (s as f32 * gain).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            let bytes = scaled.to_le_bytes();
            chunk[0] = bytes[0];
            chunk[1] = bytes[1];
        }
        let mut out = File::create(path)?;
        out.write_all(&buf)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    fn bare_config() -> TtsEngineConfig {
        TtsEngineConfig {
            temp_dir: std::env::temp_dir(),
            default_sample_rate: 22_050,
            piper_bin: None,
            piper_voice: None,
            piper_voice_dir: None,
            espeak_bin: None,
            player: None,
        }
    }

    fn engine_with(kind: EngineKind) -> CliSpeechEngine {
        CliSpeechEngine {
            cfg: bare_config(),
            kind,
            player: None,
            settings: Mutex::new(VoiceSettings::default()),
            tracked: Mutex::new(Tracked::default()),
        }
    }

    /// espeak-ng stand-in: appends a line to `log`, then sleeps.
    #[cfg(unix)]
    fn fake_espeak(dir: &Path, log: &Path, secs: u32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let bin = dir.join("espeak-ng");
        fs::write(
            &bin,
            format!("#!/bin/sh\necho spoken >> '{}'\nexec sleep {}\n", log.display(), secs),
        )
        .unwrap();
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();
        bin
    }

    #[cfg(unix)]
    fn espeak_engine(bin: PathBuf) -> CliSpeechEngine {
        let mut engine = engine_with(EngineKind::EspeakNg);
        engine.cfg.espeak_bin = Some(bin);
        engine
    }

    #[cfg(unix)]
    fn spoken_lines(log: &Path) -> usize {
        fs::read_to_string(log).map(|s| s.lines().count()).unwrap_or(0)
    }

    #[test]
    fn test_unavailable_without_engines() {
        let err = CliSpeechEngine::new(bare_config()).err().unwrap();
        assert!(matches!(err, EngineError::Unavailable(_)));
    }

    #[test]
    fn test_espeak_arguments() {
        let settings = VoiceSettings {
            rate: 1000,
            volume: 0.5,
            voice: Some("en-us".into()),
        };
        let cmd = espeak_command(Path::new("espeak-ng"), &settings, "-hello");
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            vec!["-v", "en-us", "-s", "450", "-a", "50", "--", "-hello"]
        );
    }

    #[test]
    fn test_length_scale_tracks_rate() {
        assert!((length_scale(DEFAULT_RATE_WPM) - 1.0).abs() < f32::EPSILON);
        assert!(length_scale(350) < 1.0);
        assert_eq!(length_scale(10), 2.0);
    }

    #[test]
    fn test_parse_espeak_voices() {
        let table = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 2  en-us           --/M      English_(America)  gmw/en-US            (en 3)
 bad line
";
        let voices = parse_espeak_voices(table);
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[1].id, "en-us");
        assert_eq!(voices[1].name, "English (America)");
    }

    #[test]
    fn test_piper_voice_entry() {
        let v = piper_voice_entry(Path::new("/voices/en_US-lessac-medium.onnx"));
        assert_eq!(v.name, "en_US-lessac-medium");
        assert_eq!(v.language, "en_US");
    }

    #[test]
    fn test_scale_wav_halves_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.wav");
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&0u32.to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&4u32.to_le_bytes());
        wav.extend_from_slice(&1000i16.to_le_bytes());
        wav.extend_from_slice(&(-2000i16).to_le_bytes());
        fs::write(&path, &wav).unwrap();

        scale_wav_pcm16_inplace(&path, 0.5).unwrap();

        let out = fs::read(&path).unwrap();
        assert_eq!(i16::from_le_bytes([out[20], out[21]]), 500);
        assert_eq!(i16::from_le_bytes([out[22], out[23]]), -1000);
    }

    #[test]
    fn test_configure_rejects_bad_volume() {
        let engine = engine_with(EngineKind::EspeakNg);
        let bad = VoiceSettings {
            volume: 3.0,
            ..VoiceSettings::default()
        };
        assert!(matches!(
            engine.configure(&bad),
            Err(EngineError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_repeated_stop_when_idle() {
        let engine = engine_with(EngineKind::EspeakNg);
        engine.stop();
        engine.stop();
        assert!(engine.stop_pending());
        assert!(engine.tracked().child.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_before_speak_ends_that_utterance() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("spoken.log");
        let engine = espeak_engine(fake_espeak(dir.path(), &log, 3));

        engine.stop();
        let started = Instant::now();
        assert!(engine.speak("hello").is_ok());

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(spoken_lines(&log), 0);
        assert!(!engine.stop_pending());
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_does_not_carry_over_to_next_utterance() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("spoken.log");
        let engine = Arc::new(espeak_engine(fake_espeak(dir.path(), &log, 3)));

        for round in 1..=2 {
            let stopper = {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(300));
                    engine.stop();
                })
            };
            let started = Instant::now();
            assert!(engine.speak("hello").is_ok());
            stopper.join().unwrap();

            assert!(started.elapsed() < Duration::from_secs(2));
            assert_eq!(spoken_lines(&log), round);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_stop_kills_running_process() {
        let engine = Arc::new(engine_with(EngineKind::EspeakNg));
        let stopper = {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(150));
                engine.stop();
            })
        };

        let started = Instant::now();
        let mut cmd = Command::new("sleep");
        cmd.arg("10");
        let result = engine.run_tracked(cmd, None, "sleep");

        stopper.join().unwrap();
        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_stdin_write_failure_kills_child() {
        let engine = engine_with(EngineKind::EspeakNg);
        // Closes its stdin and would otherwise outlive the test
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exec 0<&-; sleep 10"]);
        let text = "x".repeat(1 << 20);

        let started = Instant::now();
        let result = engine.run_tracked(cmd, Some(&text), "sh");

        assert!(matches!(result, Err(EngineError::IoError(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(engine.tracked().child.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_process_is_synthesis_error() {
        let engine = engine_with(EngineKind::EspeakNg);
        let result = engine.run_tracked(Command::new("false"), None, "false");
        assert!(matches!(result, Err(EngineError::Synthesis(_))));
    }
}
