pub mod aim_engine;
pub mod config;
pub mod errors;
pub mod executor;
pub mod perception;
pub mod targeting;

use crate::aim_engine::engine::AimEngine;
use crate::aim_engine::loop_control::CancelToken;
use crate::errors::{TrackerError, TrackerResult};
use crate::executor::input::EnigoPointer;
use crate::perception::debug_dump::DebugDump;
use crate::perception::screenshot::MonitorCapture;
use crate::perception::yolo_detector::YoloDetector;

/// Entry point of the `reticle` binary.
///
/// Builds the collaborators, asks for the target class, then runs the
/// tracking loop on this thread until Ctrl+C or a configured run limit.
pub fn run() -> TrackerResult<()> {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::load_config()?;

    let source = MonitorCapture::new(&config.capture)?;
    let detector = YoloDetector::new(&config.detector)?;
    let sink = EnigoPointer::new()?;

    let cancel = CancelToken::new();
    let mut engine = AimEngine::new(
        &config,
        Box::new(source),
        Box::new(detector),
        Box::new(sink),
        cancel.clone(),
    );
    if config.debug_dump.enabled {
        match DebugDump::new(&config.debug_dump, config.detector.class_names.clone()) {
            Ok(dump) => engine = engine.with_debug_dump(dump),
            Err(e) => tracing::warn!(error = %e, "debug dump unavailable; continuing without"),
        }
    }

    // The interrupt handler is installed only after selection, so Ctrl+C at
    // the prompt still terminates the process directly.
    match engine.prompt_target(&mut std::io::stdin().lock(), &mut std::io::stdout()) {
        Ok(()) => {}
        Err(TrackerError::Cancelled) => {
            tracing::info!("input closed before a target was selected");
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;
    let watcher = cancel.clone();
    runtime.spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl+C");
            return;
        }
        tracing::info!("interrupt received; stopping after the current frame");
        watcher.cancel();

        // A stuck capture or inference call never reaches the next
        // iteration boundary; a second interrupt exits immediately.
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("second interrupt; exiting without summary");
            std::process::exit(130);
        }
    });

    println!("\nTracking. Press Ctrl+C to stop.\n");
    let result = engine.run_loop();
    runtime.shutdown_background();

    let summary = result?;
    println!(
        "\nStopped. {} frames in {:.1}s ({:.1} FPS average), {} moves.",
        summary.counters.frames_captured,
        summary.elapsed.as_secs_f64(),
        summary.average_fps,
        summary.counters.moves_issued,
    );
    Ok(())
}
