/// Monitor capture through xcap.
///
/// The monitor handle is resolved once at construction; each `capture` grabs
/// the full monitor, crops the configured region and drops the alpha channel.
use image::DynamicImage;
use xcap::Monitor;

use crate::config::{CaptureConfig, CaptureRegion};
use crate::errors::{TrackerError, TrackerResult};
use crate::perception::traits::FrameSource;
use crate::perception::types::Frame;

pub struct MonitorCapture {
    monitor: Monitor,
    region: Option<CaptureRegion>,
}

impl MonitorCapture {
    pub fn new(config: &CaptureConfig) -> TrackerResult<Self> {
        let monitors = Monitor::all()
            .map_err(|e| TrackerError::Capture(format!("enumerate monitors: {e}")))?;

        let monitor = match config.monitor {
            Some(index) => monitors.into_iter().nth(index).ok_or_else(|| {
                TrackerError::Capture(format!("monitor index {index} out of range"))
            })?,
            None => monitors
                .into_iter()
                .find(|m| m.is_primary())
                .ok_or_else(|| TrackerError::Capture("no primary monitor found".into()))?,
        };

        if let Some(region) = config.region {
            check_region(region, monitor.width(), monitor.height())?;
        }

        tracing::info!(
            monitor = %monitor.name(),
            width = monitor.width(),
            height = monitor.height(),
            region = ?config.region,
            "capture source ready"
        );

        Ok(Self {
            monitor,
            region: config.region,
        })
    }
}

impl FrameSource for MonitorCapture {
    fn capture(&mut self) -> TrackerResult<Frame> {
        let rgba = self
            .monitor
            .capture_image()
            .map_err(|e| TrackerError::Capture(format!("capture monitor: {e}")))?;

        let rgba = match self.region {
            Some(r) => {
                check_region(r, rgba.width(), rgba.height())?;
                image::imageops::crop_imm(&rgba, r.x, r.y, r.width, r.height).to_image()
            }
            None => rgba,
        };

        Ok(Frame::new(DynamicImage::ImageRgba8(rgba).into_rgb8()))
    }
}

fn check_region(region: CaptureRegion, width: u32, height: u32) -> TrackerResult<()> {
    let fits_x = region.x.checked_add(region.width).is_some_and(|end| end <= width);
    let fits_y = region.y.checked_add(region.height).is_some_and(|end| end <= height);
    if fits_x && fits_y {
        Ok(())
    } else {
        Err(TrackerError::Capture(format!(
            "region {region:?} exceeds monitor bounds {width}x{height}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_must_fit_inside_monitor() {
        let inside = CaptureRegion { x: 640, y: 220, width: 640, height: 640 };
        assert!(check_region(inside, 1920, 1080).is_ok());

        let overflow = CaptureRegion { x: 1600, y: 0, width: 640, height: 640 };
        assert!(matches!(
            check_region(overflow, 1920, 1080),
            Err(TrackerError::Capture(_))
        ));

        let wraps = CaptureRegion { x: u32::MAX, y: 0, width: 2, height: 2 };
        assert!(check_region(wraps, 1920, 1080).is_err());
    }
}
