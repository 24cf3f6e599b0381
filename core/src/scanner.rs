//! Presentation-process detection.
//!
//! A scan lists running processes whose name matches one of the target
//! applications and pulls the first existing `.pptx` path out of each one's
//! command line. Processes that vanish or cannot be inspected mid-scan are
//! skipped.

use crate::slides::has_pptx_extension;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use sysinfo::System;
use thiserror::Error;
use tracing::trace;

/// Process names of PowerPoint and LibreOffice Impress.
pub const DEFAULT_TARGET_APPS: &[&str] = &[
    "powerpnt.exe",
    "powerpnt",
    "soffice.bin",
    "soffice",
    "libreoffice",
    "impress",
];

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Process table unavailable: {0}")]
    Unavailable(String),

    #[error("Scan worker failed: {0}")]
    Worker(String),
}

/// A target process with a presentation open.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DetectedProcess {
    pub pid: u32,
    pub path: PathBuf,
}

pub trait ProcessScanner: Send + Sync {
    /// Matching processes; empty when nothing matches.
    fn scan(&self, targets: &[String]) -> Result<Vec<DetectedProcess>, ScanError>;
}

pub fn default_targets() -> Vec<String> {
    DEFAULT_TARGET_APPS.iter().map(|s| s.to_string()).collect()
}

/// Name match against the target list, case-insensitive.
pub fn is_target_process(name: &str, targets: &[String]) -> bool {
    targets.iter().any(|t| t.eq_ignore_ascii_case(name))
}

/// First argument naming an existing `.pptx` file.
pub fn find_presentation_arg<S: AsRef<str>>(args: &[S]) -> Option<PathBuf> {
    args.iter()
        .map(|a| Path::new(a.as_ref()))
        .find(|p| has_pptx_extension(p) && p.is_file())
        .map(Path::to_path_buf)
}

/// Scanner over the live OS process table.
pub struct SystemProcessScanner {
    system: Mutex<System>,
}

impl Default for SystemProcessScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProcessScanner {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl ProcessScanner for SystemProcessScanner {
    fn scan(&self, targets: &[String]) -> Result<Vec<DetectedProcess>, ScanError> {
        let mut system = self
            .system
            .lock()
            .map_err(|e| ScanError::Unavailable(e.to_string()))?;
        system.refresh_processes();

        let mut found: Vec<DetectedProcess> = system
            .processes()
            .iter()
            .filter(|(_, proc_)| is_target_process(proc_.name(), targets))
            .filter_map(|(pid, proc_)| {
                let path = find_presentation_arg(proc_.cmd());
                trace!(target = "scanner", pid = pid.as_u32(), name = proc_.name(), path = ?path, "Target process");
                path.map(|path| DetectedProcess {
                    pid: pid.as_u32(),
                    path,
                })
            })
            .collect();
        found.sort_by_key(|d| d.pid);
        Ok(found)
    }
}
