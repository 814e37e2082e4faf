use image::RgbImage;

use crate::errors::TrackerResult;
use crate::perception::types::{Detection, Frame};

/// Produces the current image of the configured display region.
/// Every call reflects the screen at call time. Errors are fatal to the loop.
pub trait FrameSource {
    fn capture(&mut self) -> TrackerResult<Frame>;
}

/// Black-box object detector. Must treat the frame as read-only.
pub trait Detector {
    fn infer(&mut self, frame: &RgbImage) -> TrackerResult<Vec<Detection>>;

    /// Optional warm-up hook, run once before the loop starts.
    fn warm_up(&mut self) -> TrackerResult<()> {
        Ok(())
    }
}
