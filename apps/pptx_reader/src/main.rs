mod cli;
mod config;

use clap::Parser;
use cli::{Cli, Commands};
use config::ReaderConfig;
use reader_audio::CliSpeechEngine;
use reader_core::{
    DetectionWatcher, EngineError, PlaybackError, PlaybackOutcome, PlaybackSession,
    PptxSlideSource, ReaderError, SlideSource, SpeechEngine, SystemProcessScanner, WatchEvent,
};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    // Logging / tracing
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        "info,reader_core=info,reader_audio=info,pptx_reader=info".to_string()
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let cli = Cli::parse();

    // Defaults + env, then optional TOML, then flags
    let mut cfg = ReaderConfig::load();

    let result = match cli.command {
        Commands::Read(cmd) => {
            cmd.playback.apply(&mut cfg.playback);
            read_file(&cmd.file, &cfg).await
        }
        Commands::Watch(cmd) => {
            cmd.apply(&mut cfg.watch);
            cmd.playback.apply(&mut cfg.playback);
            watch(&cfg).await
        }
        Commands::Voices => list_voices(&cfg),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(target = "pptx_reader", error = %e, "Exiting with error");
            eprintln!("Error: {}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(e: &ReaderError) -> u8 {
    match e {
        ReaderError::Extraction(_) => 2,
        ReaderError::Synthesis(_) | ReaderError::Playback(PlaybackError::Engine(_)) => 3,
        _ => 1,
    }
}

fn build_engine(cfg: &ReaderConfig) -> Result<Arc<dyn SpeechEngine>, EngineError> {
    let engine = CliSpeechEngine::new(cfg.tts.clone())?;
    info!(target = "pptx_reader", engine = ?engine.kind(), "Speech engine ready");
    Ok(Arc::new(engine))
}

async fn read_file(file: &Path, cfg: &ReaderConfig) -> Result<(), ReaderError> {
    let slides = PptxSlideSource::new().parse(file)?;
    info!(target = "pptx_reader", file = %file.display(), slides = slides.len(), "Reading presentation");

    let engine = build_engine(cfg)?;
    let session = PlaybackSession::new(engine);
    let playback = cfg.playback_config();
    let mut runner = {
        let session = session.clone();
        tokio::spawn(async move { session.run(&slides, &playback).await })
    };

    let joined = tokio::select! {
        res = &mut runner => res,
        _ = shutdown_signal() => {
            info!(target = "pptx_reader", "Interrupted; stopping playback");
            session.cancel();
            runner.await
        }
    };

    match joined.map_err(|e| PlaybackError::Worker(e.to_string()))? {
        PlaybackOutcome::Completed => {
            info!(target = "pptx_reader", "Finished reading");
            Ok(())
        }
        PlaybackOutcome::Cancelled => {
            info!(target = "pptx_reader", "Playback cancelled");
            Ok(())
        }
        PlaybackOutcome::Failed(e) => Err(e.into()),
    }
}

async fn watch(cfg: &ReaderConfig) -> Result<(), ReaderError> {
    let engine = build_engine(cfg)?;
    let watcher = Arc::new(DetectionWatcher::new(
        Arc::new(SystemProcessScanner::new()),
        Arc::new(PptxSlideSource::new()),
        engine,
        cfg.watcher_config(),
    ));

    let mut events = watcher.subscribe();
    let reporter = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ev) => log_event(&ev),
                Err(RecvError::Lagged(n)) => {
                    warn!(target = "pptx_reader", skipped = n, "Dropped watcher events")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let runner = {
        let watcher = Arc::clone(&watcher);
        tokio::spawn(async move { watcher.run().await })
    };
    info!(
        target = "pptx_reader",
        targets = ?cfg.watch.targets,
        poll_secs = cfg.watch.poll_interval_secs,
        "Watching for presentations (Ctrl+C to quit)"
    );

    shutdown_signal().await;
    info!(target = "pptx_reader", "Shutting down...");
    watcher.stop();
    runner
        .await
        .map_err(|e| PlaybackError::Worker(e.to_string()))?;

    // Closing the channel lets the reporter drain the teardown events
    drop(watcher);
    let _ = reporter.await;
    Ok(())
}

fn log_event(ev: &WatchEvent) {
    match ev {
        WatchEvent::SessionStarted { path, slides } => {
            info!(target = "pptx_reader", path = %path.display(), slides, "Reading presentation")
        }
        WatchEvent::SessionCancelled { path } => {
            info!(target = "pptx_reader", path = %path.display(), "Presentation closed; stopped reading")
        }
        WatchEvent::SessionFinished { path, error: None } => {
            info!(target = "pptx_reader", path = %path.display(), "Finished reading")
        }
        WatchEvent::SessionFinished {
            path,
            error: Some(e),
        } => {
            error!(target = "pptx_reader", path = %path.display(), error = %e, "Reading failed")
        }
        WatchEvent::ParseFailed { path, error } => {
            warn!(target = "pptx_reader", path = %path.display(), error = %error, "Could not read presentation")
        }
        WatchEvent::ScanFailed { error } => {
            warn!(target = "pptx_reader", error = %error, "Process scan failed")
        }
    }
}

fn list_voices(cfg: &ReaderConfig) -> Result<(), ReaderError> {
    let engine = build_engine(cfg)?;
    let voices = engine.list_voices()?;
    if voices.is_empty() {
        println!("No voices found.");
    }
    for v in voices {
        println!("{} ({}) [{}]", v.name, v.id, v.language);
    }
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};
        match unix_signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(target = "pptx_reader", error = %e, "SIGTERM handler unavailable");
                let _ = signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
