// Physical pointer actuation.
use enigo::{Coordinate, Enigo, Mouse, Settings};

use crate::errors::{TrackerError, TrackerResult};

/// Applies relative pointer movement. Never positions absolutely, so moves
/// stay correct if the pointer is repositioned between calls.
pub trait PointerSink {
    fn move_relative(&mut self, dx: i32, dy: i32);
}

pub struct EnigoPointer {
    enigo: Enigo,
}

impl EnigoPointer {
    pub fn new() -> TrackerResult<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| TrackerError::Config(format!("pointer backend unavailable: {e}")))?;
        Ok(Self { enigo })
    }
}

impl PointerSink for EnigoPointer {
    fn move_relative(&mut self, dx: i32, dy: i32) {
        if let Err(e) = self.enigo.move_mouse(dx, dy, Coordinate::Rel) {
            tracing::warn!(error = %e, dx, dy, "relative pointer move failed");
        }
    }
}
