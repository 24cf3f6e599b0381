//! Scratch-file helpers for synthesized audio.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static SEQ: AtomicU64 = AtomicU64::new(0);

/// Unique WAV path under `dir` for one utterance.
/// Process id and a counter keep concurrent engines apart.
pub(crate) fn scratch_wav_path(dir: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    dir.join(format!(
        "pptx_reader_{}_{:x}_{}.wav",
        std::process::id(),
        nanos,
        seq
    ))
}
