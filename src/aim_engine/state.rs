use std::time::Duration;

use crate::targeting::selector::CandidateSelector;

/// Lifecycle of a tracking session.
#[derive(Debug, Clone, Copy)]
pub enum EngineState {
    SelectingTarget,
    Running { selector: CandidateSelector },
    Stopped,
}

impl EngineState {
    pub fn name(&self) -> &'static str {
        match self {
            EngineState::SelectingTarget => "selecting_target",
            EngineState::Running { .. } => "running",
            EngineState::Stopped => "stopped",
        }
    }
}

/// What a single loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Frame captured and detected, targeting throttled for this frame.
    Skipped,
    /// No qualifying detection.
    NoTarget,
    /// Target present but no move needed (dead zone or sub-pixel).
    Holding,
    Moved { dx: i32, dy: i32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounters {
    pub frames_captured: u64,
    pub frames_processed: u64,
    pub frames_with_target: u64,
    pub moves_issued: u64,
}

impl SessionCounters {
    pub fn record(&mut self, outcome: StepOutcome) {
        self.frames_captured += 1;
        match outcome {
            StepOutcome::Skipped => {}
            StepOutcome::NoTarget => self.frames_processed += 1,
            StepOutcome::Holding => {
                self.frames_processed += 1;
                self.frames_with_target += 1;
            }
            StepOutcome::Moved { .. } => {
                self.frames_processed += 1;
                self.frames_with_target += 1;
                self.moves_issued += 1;
            }
        }
    }
}

/// Final report emitted when the loop stops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSummary {
    pub counters: SessionCounters,
    pub elapsed: Duration,
    pub average_fps: f64,
}

impl SessionSummary {
    pub fn new(counters: SessionCounters, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let average_fps = if secs > 0.0 {
            counters.frames_captured as f64 / secs
        } else {
            0.0
        };
        Self {
            counters,
            elapsed,
            average_fps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_follow_outcomes() {
        let mut c = SessionCounters::default();
        for o in [
            StepOutcome::Skipped,
            StepOutcome::NoTarget,
            StepOutcome::Holding,
            StepOutcome::Moved { dx: 3, dy: -1 },
        ] {
            c.record(o);
        }
        assert_eq!(
            c,
            SessionCounters {
                frames_captured: 4,
                frames_processed: 3,
                frames_with_target: 2,
                moves_issued: 1,
            }
        );
    }

    #[test]
    fn summary_average_fps() {
        let counters = SessionCounters {
            frames_captured: 120,
            ..Default::default()
        };
        let s = SessionSummary::new(counters, Duration::from_secs(4));
        assert!((s.average_fps - 30.0).abs() < 1e-9);
        assert_eq!(SessionSummary::new(counters, Duration::ZERO).average_fps, 0.0);
    }
}
