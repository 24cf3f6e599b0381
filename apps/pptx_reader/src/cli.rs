//! Command line interface for pptx-reader

use crate::config::{parse_secs, PlaybackSettings, WatchSettings};
use clap::{Args, Parser, Subcommand};
use reader_core::RemarkPolicy;
use std::path::PathBuf;

/// Read PowerPoint decks aloud
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read one .pptx file aloud
    Read(ReadCommand),

    /// Watch for presentations being opened and read each one aloud
    Watch(WatchCommand),

    /// List the voices of the detected speech engine
    Voices,
}

#[derive(Parser, Debug)]
pub struct ReadCommand {
    /// Path to the .pptx file
    pub file: PathBuf,

    #[command(flatten)]
    pub playback: PlaybackArgs,
}

#[derive(Parser, Debug)]
pub struct WatchCommand {
    /// Seconds between process scans
    #[arg(long, value_parser = parse_secs)]
    pub poll: Option<f64>,

    /// Presentation process name to look for (repeatable, replaces the defaults)
    #[arg(long = "target")]
    pub targets: Vec<String>,

    #[command(flatten)]
    pub playback: PlaybackArgs,
}

impl WatchCommand {
    pub fn apply(&self, w: &mut WatchSettings) {
        if let Some(secs) = self.poll {
            w.poll_interval_secs = secs;
        }
        if !self.targets.is_empty() {
            w.targets = self.targets.clone();
        }
    }
}

/// Options shared by `read` and `watch`
#[derive(Args, Debug, Default)]
pub struct PlaybackArgs {
    /// Speech rate in words per minute
    #[arg(short, long)]
    pub rate: Option<u32>,

    /// Volume, 0.0 to 2.0
    #[arg(long)]
    pub volume: Option<f32>,

    /// Engine-specific voice id (see `voices`)
    #[arg(long)]
    pub voice: Option<String>,

    /// Pause between slides in seconds
    #[arg(short, long, value_parser = parse_secs)]
    pub delay: Option<f64>,

    /// Skip the closing remark
    #[arg(long)]
    pub no_remark: bool,

    /// rotate, random or fixed:<text>
    #[arg(long)]
    pub remark_policy: Option<RemarkPolicy>,
}

impl PlaybackArgs {
    pub fn apply(&self, p: &mut PlaybackSettings) {
        if let Some(v) = self.rate {
            p.rate_wpm = v;
        }
        if let Some(v) = self.volume {
            p.volume = v;
        }
        if let Some(v) = &self.voice {
            p.voice = Some(v.clone());
        }
        if let Some(v) = self.delay {
            p.delay_secs = v;
        }
        if self.no_remark {
            p.closing_remark = false;
        }
        if let Some(v) = &self.remark_policy {
            p.remark_policy = v.clone();
        }
    }
}
