use crate::perception::types::{Detection, Point};

/// Turns a box into a single aim point near its top, approximating a head.
#[derive(Debug, Clone, Copy)]
pub struct TargetPointExtractor {
    head_fraction: f32,
}

impl TargetPointExtractor {
    pub fn new(head_fraction: f32) -> Self {
        Self { head_fraction }
    }

    pub fn aim_point(&self, detection: &Detection) -> Point {
        let b = detection.bbox;
        Point::new((b.x1 + b.x2) / 2.0, b.y1 + b.height() * self.head_fraction)
    }
}
