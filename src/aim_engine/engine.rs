use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

use crate::aim_engine::loop_control::{CancelToken, FpsCounter, FrameThrottle, LoopController};
use crate::aim_engine::prompt::prompt_class_filter;
use crate::aim_engine::state::{EngineState, SessionCounters, SessionSummary, StepOutcome};
use crate::config::AppConfig;
use crate::errors::{TrackerError, TrackerResult};
use crate::executor::input::PointerSink;
use crate::perception::debug_dump::DebugDump;
use crate::perception::traits::{Detector, FrameSource};
use crate::targeting::extractor::TargetPointExtractor;
use crate::targeting::planner::{AimState, MotionPlanner, MotionTunables};
use crate::targeting::selector::{CandidateSelector, ClassFilter};

/// Drives capture → detect → select → extract → plan → move, one frame at a
/// time on the calling thread.
pub struct AimEngine {
    state: EngineState,
    source: Box<dyn FrameSource>,
    detector: Box<dyn Detector>,
    sink: Box<dyn PointerSink>,
    debug_dump: Option<DebugDump>,

    class_names: Vec<String>,
    conf_threshold: f32,
    extractor: TargetPointExtractor,
    planner: MotionPlanner,
    aim: AimState,

    loop_ctrl: LoopController,
    throttle: FrameThrottle,
    fps: FpsCounter,
    counters: SessionCounters,
    loop_delay: Duration,
    cancel: CancelToken,
}

impl AimEngine {
    pub fn new(
        config: &AppConfig,
        source: Box<dyn FrameSource>,
        detector: Box<dyn Detector>,
        sink: Box<dyn PointerSink>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            state: EngineState::SelectingTarget,
            source,
            detector,
            sink,
            debug_dump: None,
            class_names: config.detector.class_names.clone(),
            conf_threshold: config.tracking.conf_threshold,
            extractor: TargetPointExtractor::new(config.tracking.head_fraction),
            planner: MotionPlanner::new(MotionTunables::from(&config.tracking)),
            aim: AimState::default(),
            loop_ctrl: LoopController::new(&config.run),
            throttle: FrameThrottle::new(config.run.frame_skip),
            fps: FpsCounter::new(Instant::now()),
            counters: SessionCounters::default(),
            loop_delay: Duration::from_millis(config.run.loop_delay_ms),
            cancel,
        }
    }

    pub fn with_debug_dump(mut self, dump: DebugDump) -> Self {
        self.debug_dump = Some(dump);
        self
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Fix the class filter for the session and enter `Running`.
    pub fn select_target(&mut self, filter: ClassFilter) -> TrackerResult<()> {
        if !matches!(self.state, EngineState::SelectingTarget) {
            return Err(TrackerError::Engine(format!(
                "target already selected (state: {})",
                self.state.name()
            )));
        }
        let target = match filter {
            ClassFilter::Specific(id) => self
                .class_names
                .get(id.0)
                .cloned()
                .ok_or_else(|| TrackerError::Engine(format!("unknown class id {id}")))?,
            ClassFilter::Any => "any class".to_string(),
        };
        tracing::info!(class = %target, "target selected → Running");
        self.state = EngineState::Running {
            selector: CandidateSelector::new(filter, self.conf_threshold),
        };
        Ok(())
    }

    /// Blocking prompt on the given streams, then `select_target`.
    pub fn prompt_target<R: BufRead, W: Write>(&mut self, input: &mut R, output: &mut W) -> TrackerResult<()> {
        let filter = prompt_class_filter(input, output, &self.class_names)?;
        self.select_target(filter)
    }

    /// Loop until cancelled or a run limit is reached. Capture and detector
    /// errors end the session and propagate.
    pub fn run_loop(&mut self) -> TrackerResult<SessionSummary> {
        let EngineState::Running { selector } = self.state else {
            return Err(TrackerError::Engine(format!(
                "run_loop requires a selected target (state: {})",
                self.state.name()
            )));
        };

        self.detector.warm_up()?;
        self.loop_ctrl.restart();
        self.fps = FpsCounter::new(Instant::now());
        tracing::info!(filter = ?selector.filter(), "tracking loop started");

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("interrupt received → Stopped");
                break;
            }
            if self.loop_ctrl.should_stop() {
                tracing::info!("run limit reached → Stopped");
                break;
            }

            if let Err(e) = self.step() {
                tracing::error!(error = %e, "fatal error in tracking loop → Stopped");
                self.state = EngineState::Stopped;
                self.report();
                return Err(e);
            }

            if !self.loop_delay.is_zero() {
                std::thread::sleep(self.loop_delay);
            }
        }

        self.state = EngineState::Stopped;
        Ok(self.report())
    }

    /// One iteration of the targeting pipeline.
    pub fn step(&mut self) -> TrackerResult<StepOutcome> {
        let selector = match self.state {
            EngineState::Running { selector } => selector,
            other => {
                return Err(TrackerError::Engine(format!(
                    "step called outside Running (state: {})",
                    other.name()
                )))
            }
        };

        let frame = self.source.capture()?;
        let detections = self.detector.infer(&frame.image)?;
        self.loop_ctrl.record_frame();
        if let Some(fps) = self.fps.tick(Instant::now()) {
            tracing::info!(fps = format_args!("{fps:.1}"), "frame rate");
        }

        let outcome = if !self.throttle.should_process() {
            StepOutcome::Skipped
        } else {
            let reference = frame.center();
            match selector.select(&detections, reference).copied() {
                None => {
                    self.aim.record_miss();
                    tracing::trace!(
                        detections = detections.len(),
                        frames_since_detection = self.aim.frames_since_detection,
                        "no qualifying target"
                    );
                    StepOutcome::NoTarget
                }
                Some(candidate) => {
                    let aim_point = self.extractor.aim_point(&candidate);
                    let plan = self.planner.plan(&self.aim, aim_point, reference);
                    let (dx, dy) = self.aim.whole_pixels(&plan);
                    if dx != 0 || dy != 0 {
                        self.sink.move_relative(dx, dy);
                    }
                    self.aim.apply(&plan, (dx, dy));

                    tracing::debug!(
                        class = %candidate.class_id,
                        confidence = format_args!("{:.2}", candidate.confidence),
                        distance = format_args!("{:.1}", plan.distance),
                        recommitted = plan.recommitted,
                        step = format_args!("{:.2}", plan.displacement.magnitude()),
                        dx,
                        dy,
                        latency_ms = frame.captured_at.elapsed().as_millis() as u64,
                        "target tracked"
                    );

                    if let Some(dump) = self.debug_dump.as_mut() {
                        dump.offer(&frame.image, &candidate, aim_point);
                    }

                    if dx != 0 || dy != 0 {
                        StepOutcome::Moved { dx, dy }
                    } else {
                        StepOutcome::Holding
                    }
                }
            }
        };

        self.counters.record(outcome);
        Ok(outcome)
    }

    fn report(&self) -> SessionSummary {
        let summary = SessionSummary::new(self.counters, self.loop_ctrl.elapsed());
        tracing::info!(
            frames = summary.counters.frames_captured,
            processed = summary.counters.frames_processed,
            with_target = summary.counters.frames_with_target,
            moves = summary.counters.moves_issued,
            elapsed_s = format_args!("{:.1}", summary.elapsed.as_secs_f64()),
            avg_fps = format_args!("{:.1}", summary.average_fps),
            "session summary"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DebugDumpConfig, RunMode};
    use crate::perception::types::{BoundingBox, ClassId, Detection, Frame};
    use image::RgbImage;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::rc::Rc;

    struct BlankSource {
        width: u32,
        height: u32,
        fail_after: Option<u32>,
        captured: u32,
    }

    impl FrameSource for BlankSource {
        fn capture(&mut self) -> TrackerResult<Frame> {
            if self.fail_after.is_some_and(|n| self.captured >= n) {
                return Err(TrackerError::Capture("device lost".into()));
            }
            self.captured += 1;
            Ok(Frame::new(RgbImage::new(self.width, self.height)))
        }
    }

    /// Replays scripted detections, then reports nothing.
    struct ScriptedDetector {
        script: VecDeque<Vec<Detection>>,
    }

    impl Detector for ScriptedDetector {
        fn infer(&mut self, _frame: &RgbImage) -> TrackerResult<Vec<Detection>> {
            Ok(self.script.pop_front().unwrap_or_default())
        }
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn infer(&mut self, _frame: &RgbImage) -> TrackerResult<Vec<Detection>> {
            Err(TrackerError::Detector("session run failed".into()))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink(Rc<RefCell<Vec<(i32, i32)>>>);

    impl PointerSink for RecordingSink {
        fn move_relative(&mut self, dx: i32, dy: i32) {
            self.0.borrow_mut().push((dx, dy));
        }
    }

    /// Box whose aim point (head fraction 0.12) lands at `(ax, ay)`.
    fn det_with_aim(class: usize, conf: f32, ax: f32, ay: f32) -> Detection {
        let (w, h) = (40.0, 100.0);
        let y1 = ay - h * 0.12;
        Detection {
            class_id: ClassId(class),
            confidence: conf,
            bbox: BoundingBox::new(ax - w / 2.0, y1, ax + w / 2.0, y1 + h),
        }
    }

    fn engine_with(
        config: &AppConfig,
        script: Vec<Vec<Detection>>,
        cancel: CancelToken,
    ) -> (AimEngine, RecordingSink) {
        let sink = RecordingSink::default();
        let engine = AimEngine::new(
            config,
            Box::new(BlankSource { width: 1920, height: 1080, fail_after: None, captured: 0 }),
            Box::new(ScriptedDetector { script: script.into() }),
            Box::new(sink.clone()),
            cancel,
        );
        (engine, sink)
    }

    #[test]
    fn step_requires_a_selected_target() {
        let (mut engine, _) = engine_with(&AppConfig::default(), vec![], CancelToken::new());
        assert!(matches!(engine.step(), Err(TrackerError::Engine(_))));
        assert!(matches!(engine.run_loop(), Err(TrackerError::Engine(_))));
    }

    #[test]
    fn prompt_selects_filter_and_enters_running() {
        let (mut engine, _) = engine_with(&AppConfig::default(), vec![], CancelToken::new());
        let mut out = Vec::new();
        engine.prompt_target(&mut Cursor::new(&b"9\n1\n"[..]), &mut out).unwrap();
        match engine.state() {
            EngineState::Running { selector } => {
                assert_eq!(selector.filter(), ClassFilter::Specific(ClassId(1)))
            }
            other => panic!("unexpected state {other:?}"),
        }
        assert!(matches!(engine.select_target(ClassFilter::Any), Err(TrackerError::Engine(_))));
    }

    #[test]
    fn target_right_of_centre_moves_pointer_right() {
        let (mut engine, sink) = engine_with(
            &AppConfig::default(),
            vec![vec![det_with_aim(0, 0.9, 1000.0, 540.0)]],
            CancelToken::new(),
        );
        engine.select_target(ClassFilter::Any).unwrap();

        assert_eq!(engine.step().unwrap(), StepOutcome::Moved { dx: 2, dy: 0 });
        assert_eq!(*sink.0.borrow(), vec![(2, 0)]);
        assert_eq!(engine.aim.last_move_vector, (2, 0));
        assert_eq!(engine.aim.frames_since_detection, 0);
    }

    #[test]
    fn no_qualifying_detection_means_no_move_and_counts_a_miss() {
        let (mut engine, sink) = engine_with(
            &AppConfig::default(),
            vec![
                vec![det_with_aim(0, 0.4, 1200.0, 540.0), det_with_aim(1, 0.9, 700.0, 540.0)],
                vec![],
            ],
            CancelToken::new(),
        );
        engine.select_target(ClassFilter::Specific(ClassId(0))).unwrap();

        assert_eq!(engine.step().unwrap(), StepOutcome::NoTarget);
        assert_eq!(engine.step().unwrap(), StepOutcome::NoTarget);
        assert!(sink.0.borrow().is_empty());
        assert_eq!(engine.aim.frames_since_detection, 2);
        assert_eq!(engine.aim.previous_target_point, None);
    }

    #[test]
    fn target_inside_dead_zone_holds() {
        let (mut engine, sink) = engine_with(
            &AppConfig::default(),
            vec![vec![det_with_aim(1, 0.9, 962.0, 541.0)]],
            CancelToken::new(),
        );
        engine.select_target(ClassFilter::Any).unwrap();
        assert_eq!(engine.step().unwrap(), StepOutcome::Holding);
        assert!(sink.0.borrow().is_empty());
    }

    #[test]
    fn frame_skip_throttles_targeting_but_not_capture() {
        let mut config = AppConfig::default();
        config.run.frame_skip = 2;
        config.run.mode = RunMode::FrameLimit;
        config.run.max_frames = Some(4);
        let far = det_with_aim(0, 0.9, 1400.0, 540.0);
        let (mut engine, sink) =
            engine_with(&config, vec![vec![far]; 4], CancelToken::new());
        engine.select_target(ClassFilter::Any).unwrap();

        let summary = engine.run_loop().unwrap();
        assert_eq!(summary.counters.frames_captured, 4);
        assert_eq!(summary.counters.frames_processed, 2);
        assert_eq!(summary.counters.moves_issued, 2);
        assert_eq!(sink.0.borrow().len(), 2);
        assert!(matches!(engine.state(), EngineState::Stopped));
    }

    #[test]
    fn cancelled_token_stops_before_the_first_frame() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let (mut engine, sink) = engine_with(
            &AppConfig::default(),
            vec![vec![det_with_aim(0, 0.9, 1400.0, 540.0)]],
            cancel,
        );
        engine.select_target(ClassFilter::Any).unwrap();
        let summary = engine.run_loop().unwrap();
        assert_eq!(summary.counters.frames_captured, 0);
        assert!(sink.0.borrow().is_empty());
        assert!(matches!(engine.state(), EngineState::Stopped));
    }

    #[test]
    fn capture_failure_is_fatal() {
        let sink = RecordingSink::default();
        let mut engine = AimEngine::new(
            &AppConfig::default(),
            Box::new(BlankSource { width: 640, height: 480, fail_after: Some(2), captured: 0 }),
            Box::new(ScriptedDetector { script: VecDeque::new() }),
            Box::new(sink),
            CancelToken::new(),
        );
        engine.select_target(ClassFilter::Any).unwrap();
        assert!(matches!(engine.run_loop(), Err(TrackerError::Capture(_))));
        assert!(matches!(engine.state(), EngineState::Stopped));
    }

    #[test]
    fn detector_failure_is_fatal() {
        let sink = RecordingSink::default();
        let mut engine = AimEngine::new(
            &AppConfig::default(),
            Box::new(BlankSource { width: 640, height: 480, fail_after: None, captured: 0 }),
            Box::new(FailingDetector),
            Box::new(sink.clone()),
            CancelToken::new(),
        );
        engine.select_target(ClassFilter::Any).unwrap();
        assert!(matches!(engine.run_loop(), Err(TrackerError::Detector(_))));
        assert!(matches!(engine.state(), EngineState::Stopped));
        assert!(sink.0.borrow().is_empty());
    }

    #[test]
    fn failed_debug_save_does_not_affect_targeting() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("frames");
        let dump_config = DebugDumpConfig {
            enabled: true,
            directory: dir.clone(),
            min_interval_ms: 0,
            ..DebugDumpConfig::default()
        };
        let dump = DebugDump::new(&dump_config, vec!["a".into(), "b".into()]).unwrap();
        std::fs::remove_dir(&dir).unwrap();
        std::fs::write(&dir, b"").unwrap();

        let (engine, sink) = engine_with(
            &AppConfig::default(),
            vec![vec![det_with_aim(0, 0.95, 1000.0, 540.0)]],
            CancelToken::new(),
        );
        let mut engine = engine.with_debug_dump(dump);
        engine.select_target(ClassFilter::Any).unwrap();

        assert_eq!(engine.step().unwrap(), StepOutcome::Moved { dx: 2, dy: 0 });
        assert_eq!(*sink.0.borrow(), vec![(2, 0)]);
        assert!(dir.is_file());
    }

    #[test]
    fn sub_pixel_remainder_is_issued_on_a_later_frame() {
        // 4.3 px out: past the dead zone but under half a pixel per frame.
        let near = det_with_aim(0, 0.9, 964.3, 540.0);
        let (mut engine, sink) =
            engine_with(&AppConfig::default(), vec![vec![near]; 2], CancelToken::new());
        engine.select_target(ClassFilter::Any).unwrap();

        assert_eq!(engine.step().unwrap(), StepOutcome::Holding);
        assert_eq!(engine.step().unwrap(), StepOutcome::Moved { dx: 1, dy: 0 });
        assert_eq!(*sink.0.borrow(), vec![(1, 0)]);
    }

    #[test]
    fn jitter_below_shift_threshold_keeps_the_committed_point() {
        let (mut engine, _) = engine_with(
            &AppConfig::default(),
            vec![
                vec![det_with_aim(0, 0.9, 1100.0, 540.0)],
                vec![det_with_aim(0, 0.9, 1110.0, 548.0)],
                vec![det_with_aim(0, 0.9, 600.0, 300.0)],
            ],
            CancelToken::new(),
        );
        engine.select_target(ClassFilter::Any).unwrap();

        engine.step().unwrap();
        let first = engine.aim.previous_target_point.unwrap();
        engine.step().unwrap();
        assert_eq!(engine.aim.previous_target_point, Some(first));
        engine.step().unwrap();
        let third = engine.aim.previous_target_point.unwrap();
        assert!((third.x - 600.0).abs() < 1e-3 && (third.y - 300.0).abs() < 1e-3);
    }
}
