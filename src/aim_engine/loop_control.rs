// Run limits, frame throttling, FPS windows and cooperative cancellation.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{RunConfig, RunMode};

/// Shared stop flag. Set from the interrupt watcher, polled by the loop
/// once per iteration boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct LoopController {
    mode: RunMode,
    max_duration: Option<Duration>,
    max_frames: Option<u64>,
    start_time: Instant,
    frame_count: u64,
}

impl LoopController {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            mode: config.mode,
            max_duration: config.max_duration_secs.map(Duration::from_secs),
            max_frames: config.max_frames,
            start_time: Instant::now(),
            frame_count: 0,
        }
    }

    /// Start the duration and frame budgets over from now.
    pub fn restart(&mut self) {
        self.start_time = Instant::now();
        self.frame_count = 0;
    }

    pub fn record_frame(&mut self) {
        self.frame_count += 1;
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn should_stop(&self) -> bool {
        match self.mode {
            RunMode::UntilInterrupted => false,
            RunMode::Timed => self.max_duration.is_some_and(|max| self.elapsed() >= max),
            RunMode::FrameLimit => self.max_frames.is_some_and(|max| self.frame_count >= max),
        }
    }
}

/// Lets targeting run on every Nth captured frame, starting with the first.
pub struct FrameThrottle {
    every: u32,
    seen: u64,
}

impl FrameThrottle {
    pub fn new(every: u32) -> Self {
        Self {
            every: every.max(1),
            seen: 0,
        }
    }

    pub fn should_process(&mut self) -> bool {
        let process = self.seen % self.every as u64 == 0;
        self.seen += 1;
        process
    }
}

/// Frames-per-second over windows of at least one second.
pub struct FpsCounter {
    frame_count: u32,
    window_start: Instant,
}

impl FpsCounter {
    const WINDOW: Duration = Duration::from_secs(1);

    pub fn new(now: Instant) -> Self {
        Self {
            frame_count: 0,
            window_start: now,
        }
    }

    /// Count a frame; returns the window's rate when a window closes.
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        self.frame_count += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < Self::WINDOW {
            return None;
        }
        let fps = self.frame_count as f64 / elapsed.as_secs_f64();
        self.frame_count = 0;
        self.window_start = now;
        Some(fps)
    }
}
