//! Incremental pointer motion toward the committed target point.
//!
//! Two noise sources are suppressed independently: detector box jitter
//! (shift threshold on the committed point) and chatter when already on
//! target (hysteresis dead zone). Movement is always relative.

use crate::config::TrackingConfig;
use crate::perception::types::Point;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionTunables {
    pub hysteresis_px: f32,
    pub speed_coefficient: f32,
    pub curve_exponent: f32,
    pub shift_threshold_px: f32,
    pub max_step_px: Option<f32>,
}

impl From<&TrackingConfig> for MotionTunables {
    fn from(cfg: &TrackingConfig) -> Self {
        Self {
            hysteresis_px: cfg.hysteresis_px,
            speed_coefficient: cfg.speed_coefficient,
            curve_exponent: cfg.curve_exponent,
            shift_threshold_px: cfg.shift_threshold_px,
            max_step_px: cfg.max_step_px,
        }
    }
}

/// Relative pointer displacement in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Displacement {
    pub dx: f32,
    pub dy: f32,
}

impl Displacement {
    pub const ZERO: Displacement = Displacement { dx: 0.0, dy: 0.0 };

    pub fn magnitude(&self) -> f32 {
        (self.dx * self.dx + self.dy * self.dy).sqrt()
    }

    /// Whole-pixel move as handed to the pointer sink.
    pub fn rounded(&self) -> (i32, i32) {
        (self.dx.round() as i32, self.dy.round() as i32)
    }
}

/// Tracking state that outlives individual frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AimState {
    /// Last committed target point; `None` until the first commitment.
    pub previous_target_point: Option<Point>,
    /// Displacement actually issued on the last processed frame with a target.
    pub last_move_vector: (i32, i32),
    pub frames_since_detection: u32,
    /// Sub-pixel part of earlier steps not yet issued.
    pub carry: Displacement,
}

impl AimState {
    /// Whole-pixel move for `plan`, including the carried remainder.
    pub fn whole_pixels(&self, plan: &MotionPlan) -> (i32, i32) {
        self.pending(plan).rounded()
    }

    /// Record the outcome of a planned frame once its move has been issued.
    pub fn apply(&mut self, plan: &MotionPlan, issued: (i32, i32)) {
        let pending = self.pending(plan);
        self.carry = Displacement {
            dx: pending.dx - issued.0 as f32,
            dy: pending.dy - issued.1 as f32,
        };
        self.previous_target_point = Some(plan.committed_point);
        self.last_move_vector = issued;
        self.frames_since_detection = 0;
    }

    /// Record a processed frame with no qualifying detection.
    pub fn record_miss(&mut self) {
        self.frames_since_detection = self.frames_since_detection.saturating_add(1);
        self.carry = Displacement::ZERO;
    }

    // The remainder only applies while the same point stays committed and
    // outside the dead zone.
    fn pending(&self, plan: &MotionPlan) -> Displacement {
        if plan.recommitted || plan.displacement == Displacement::ZERO {
            return plan.displacement;
        }
        Displacement {
            dx: plan.displacement.dx + self.carry.dx,
            dy: plan.displacement.dy + self.carry.dy,
        }
    }
}

/// Result of planning one frame. Pure data; the state is not touched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionPlan {
    pub committed_point: Point,
    /// True when `committed_point` was replaced by the new observation.
    pub recommitted: bool,
    pub distance: f32,
    pub displacement: Displacement,
}

#[derive(Debug, Clone, Copy)]
pub struct MotionPlanner {
    tunables: MotionTunables,
}

impl MotionPlanner {
    pub fn new(tunables: MotionTunables) -> Self {
        Self { tunables }
    }

    pub fn plan(&self, state: &AimState, target: Point, reference: Point) -> MotionPlan {
        let (committed_point, recommitted) = self.commit(state, target);

        let ox = committed_point.x - reference.x;
        let oy = committed_point.y - reference.y;
        let distance = (ox * ox + oy * oy).sqrt();

        let displacement = if distance == 0.0 || distance < self.tunables.hysteresis_px {
            Displacement::ZERO
        } else {
            let step = self.step_length(distance);
            Displacement {
                dx: ox / distance * step,
                dy: oy / distance * step,
            }
        };

        MotionPlan {
            committed_point,
            recommitted,
            distance,
            displacement,
        }
    }

    /// Keep the previous point unless the observation moved further than
    /// the threshold from where the last move should have left it.
    fn commit(&self, state: &AimState, target: Point) -> (Point, bool) {
        match state.previous_target_point {
            None => (target, true),
            Some(prev) => {
                let (mx, my) = state.last_move_vector;
                let expected = Point::new(prev.x + mx as f32, prev.y + my as f32);
                if target.distance(expected) > self.tunables.shift_threshold_px {
                    (target, true)
                } else {
                    (prev, false)
                }
            }
        }
    }

    /// `distance^(exponent - 1) * coefficient`, optionally capped.
    fn step_length(&self, distance: f32) -> f32 {
        let t = &self.tunables;
        let speed = distance.powf(t.curve_exponent - 1.0) * t.speed_coefficient;
        match t.max_step_px {
            Some(cap) => speed.min(cap),
            None => speed,
        }
    }
}
