pub mod annotator;
pub mod debug_dump;
pub mod screenshot;
pub mod traits;
pub mod types;
pub mod yolo_detector;
