use crate::perception::types::{ClassId, Detection, Point};

/// Which detector classes are eligible as targets. Fixed for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassFilter {
    Specific(ClassId),
    Any,
}

impl ClassFilter {
    pub fn admits(&self, class: ClassId) -> bool {
        match self {
            ClassFilter::Any => true,
            ClassFilter::Specific(id) => *id == class,
        }
    }
}

/// Picks the eligible detection whose box centre is closest to the anchor.
#[derive(Debug, Clone, Copy)]
pub struct CandidateSelector {
    filter: ClassFilter,
    conf_threshold: f32,
}

impl CandidateSelector {
    pub fn new(filter: ClassFilter, conf_threshold: f32) -> Self {
        Self {
            filter,
            conf_threshold,
        }
    }

    pub fn filter(&self) -> ClassFilter {
        self.filter
    }

    pub fn qualifies(&self, detection: &Detection) -> bool {
        self.filter.admits(detection.class_id) && detection.confidence > self.conf_threshold
    }

    /// Closest qualifying detection by squared centre distance.
    /// On equal distance the earliest in detector order wins.
    pub fn select<'a>(&self, detections: &'a [Detection], reference: Point) -> Option<&'a Detection> {
        detections
            .iter()
            .filter(|d| self.qualifies(d))
            .map(|d| (d.bbox.center().distance_squared(reference), d))
            .min_by(|(a, _), (b, _)| a.total_cmp(b))
            .map(|(_, d)| d)
    }
}
