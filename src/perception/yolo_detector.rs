/// ONNX YOLOv8 inference for on-screen object detection.
///
/// Loads a YOLOv8-family ONNX model and returns boxes in frame pixel space.
/// A missing or unloadable model is a hard error: the loop cannot run blind.
use crate::config::DetectorConfig;
use crate::errors::{TrackerError, TrackerResult};
use crate::perception::traits::Detector;
use crate::perception::types::{BoundingBox, ClassId, Detection};

use image::RgbImage;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

/// Letterbox parameters needed to map network space back to the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    pad_x: f32,
    pad_y: f32,
    scale: f32,
}

/// Holds the ONNX Runtime session and inference configuration.
pub struct YoloDetector {
    session: Session,
    input_size: u32,
    score_threshold: f32,
    iou_threshold: f32,
}

impl YoloDetector {
    pub fn new(config: &DetectorConfig) -> TrackerResult<Self> {
        if !Path::new(&config.model_path).exists() {
            return Err(TrackerError::Detector(format!(
                "model not found at {}",
                config.model_path
            )));
        }

        let session = Session::builder()
            .map_err(|e| TrackerError::Detector(format!("ort session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| TrackerError::Detector(format!("ort opt-level: {e}")))?
            .commit_from_file(&config.model_path)
            .map_err(|e| TrackerError::Detector(format!("ort load model: {e}")))?;

        tracing::info!(path = %config.model_path, input_size = config.input_size, "YOLO detector loaded");

        Ok(Self {
            session,
            input_size: config.input_size,
            score_threshold: config.score_threshold,
            iou_threshold: config.iou_threshold,
        })
    }

    // ── Pre-processing ──────────────────────────────────────────────────────

    /// Resize + letterbox + normalise → NCHW f32 tensor.
    fn preprocess(&self, img: &RgbImage) -> (Array4<f32>, Letterbox) {
        let sz = self.input_size;
        let letterbox = letterbox_for(img.width(), img.height(), sz);
        let nw = ((img.width() as f32 * letterbox.scale).round() as u32).clamp(1, sz);
        let nh = ((img.height() as f32 * letterbox.scale).round() as u32).clamp(1, sz);

        let resized = image::imageops::resize(img, nw, nh, image::imageops::FilterType::Triangle);

        // Grey-fill canvas
        let mut canvas = RgbImage::from_pixel(sz, sz, image::Rgb([114, 114, 114]));
        image::imageops::overlay(
            &mut canvas,
            &resized,
            letterbox.pad_x.round() as i64,
            letterbox.pad_y.round() as i64,
        );

        // HWC → NCHW normalised [0, 1]
        let mut tensor = Array4::<f32>::zeros((1, 3, sz as usize, sz as usize));
        for (x, y, p) in canvas.enumerate_pixels() {
            let (xi, yi) = (x as usize, y as usize);
            tensor[[0, 0, yi, xi]] = p[0] as f32 / 255.0;
            tensor[[0, 1, yi, xi]] = p[1] as f32 / 255.0;
            tensor[[0, 2, yi, xi]] = p[2] as f32 / 255.0;
        }

        (tensor, letterbox)
    }
}

// ── Post-processing ─────────────────────────────────────────────────────────

fn postprocess(
    output: &ndarray::ArrayViewD<f32>,
    frame_w: u32,
    frame_h: u32,
    letterbox: Letterbox,
    score_threshold: f32,
    iou_threshold: f32,
) -> TrackerResult<Vec<Detection>> {
    // YOLOv8 output: [1, 4+num_classes, num_proposals]
    let shape = output.shape();
    if shape.len() != 3 || shape[0] == 0 || shape[1] <= 4 {
        return Err(TrackerError::Detector(format!(
            "unexpected output shape: {:?}",
            shape
        )));
    }
    let num_classes = shape[1] - 4;
    let num_preds = shape[2];
    let (fw, fh) = (frame_w as f32, frame_h as f32);

    let mut detections: Vec<Detection> = Vec::new();

    for i in 0..num_preds {
        let cx = output[[0, 0, i]];
        let cy = output[[0, 1, i]];
        let w = output[[0, 2, i]];
        let h = output[[0, 3, i]];

        // Best class
        let mut max_score = 0.0f32;
        let mut max_class = 0usize;
        for c in 0..num_classes {
            let s = output[[0, 4 + c, i]];
            if s > max_score {
                max_score = s;
                max_class = c;
            }
        }
        if max_score < score_threshold {
            continue;
        }

        // Undo letterbox → frame pixel space
        let Letterbox { pad_x, pad_y, scale } = letterbox;
        let x1 = (((cx - w / 2.0) - pad_x) / scale).clamp(0.0, fw);
        let y1 = (((cy - h / 2.0) - pad_y) / scale).clamp(0.0, fh);
        let x2 = (((cx + w / 2.0) - pad_x) / scale).clamp(0.0, fw);
        let y2 = (((cy + h / 2.0) - pad_y) / scale).clamp(0.0, fh);

        // Boxes collapsed by clamping carry no usable aim point.
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        detections.push(Detection {
            class_id: ClassId(max_class),
            confidence: max_score.clamp(0.0, 1.0),
            bbox: BoundingBox::new(x1, y1, x2, y2),
        });
    }

    Ok(nms(detections, iou_threshold))
}

impl Detector for YoloDetector {
    fn infer(&mut self, frame: &RgbImage) -> TrackerResult<Vec<Detection>> {
        let (input_tensor, letterbox) = self.preprocess(frame);

        // Inference — convert ndarray to ort Tensor, then run
        let input_value = Tensor::from_array(input_tensor)
            .map_err(|e| TrackerError::Detector(format!("ort tensor: {e}")))?;

        let output_owned = {
            let outputs = self
                .session
                .run(ort::inputs![input_value])
                .map_err(|e| TrackerError::Detector(format!("ort run: {e}")))?;

            outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| TrackerError::Detector(format!("extract tensor: {e}")))?
                .to_owned()
            // `outputs` (and the mutable borrow on session) is dropped here
        };

        postprocess(
            &output_owned.view(),
            frame.width(),
            frame.height(),
            letterbox,
            self.score_threshold,
            self.iou_threshold,
        )
    }

    fn warm_up(&mut self) -> TrackerResult<()> {
        let blank = RgbImage::new(self.input_size, self.input_size);
        let found = self.infer(&blank)?;
        tracing::debug!(detections = found.len(), "detector warm-up finished");
        Ok(())
    }
}

// ── Utilities ────────────────────────────────────────────────────────────────

fn letterbox_for(width: u32, height: u32, size: u32) -> Letterbox {
    let (w, h, sz) = (width as f32, height as f32, size as f32);
    let scale = (sz / w).min(sz / h);
    let nw = (w * scale).round();
    let nh = (h * scale).round();
    Letterbox {
        pad_x: (sz - nw).max(0.0) / 2.0,
        pad_y: (sz - nh).max(0.0) / 2.0,
        scale,
    }
}

/// Per-class greedy NMS. Output is ordered by descending confidence.
fn nms(mut dets: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    dets.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::with_capacity(dets.len());
    for det in dets {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) > iou_threshold);
        if !suppressed {
            keep.push(det);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class: usize, conf: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            class_id: ClassId(class),
            confidence: conf,
            bbox: BoundingBox::new(x1, y1, x2, y2),
        }
    }

    #[test]
    fn letterbox_for_wide_frame_pads_vertically() {
        let lb = letterbox_for(1920, 1080, 640);
        assert!((lb.scale - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 140.0);
    }

    #[test]
    fn postprocess_maps_letterboxed_proposals_to_frame_pixels() {
        // Two classes, three proposals laid out as [1, 6, 3].
        // Proposal 0: class 1 at network (320, 320) 60x120 → frame centre.
        // Proposal 1: below the score threshold.
        // Proposal 2: entirely inside the top padding band, collapses on clamping.
        let mut raw = ndarray::ArrayD::<f32>::zeros(ndarray::IxDyn(&[1, 6, 3]));
        for (row, vals) in [
            [320.0, 320.0, 10.0],
            [320.0, 320.0, 20.0],
            [60.0, 40.0, 10.0],
            [120.0, 40.0, 10.0],
            [0.1, 0.1, 0.9],
            [0.85, 0.05, 0.0],
        ]
        .iter()
        .enumerate()
        {
            for (i, v) in vals.iter().enumerate() {
                raw[[0, row, i]] = *v;
            }
        }

        let lb = letterbox_for(1920, 1080, 640);
        let dets = postprocess(&raw.view(), 1920, 1080, lb, 0.25, 0.45).unwrap();

        assert_eq!(dets.len(), 1);
        let d = dets[0];
        assert_eq!(d.class_id, ClassId(1));
        assert!((d.confidence - 0.85).abs() < 1e-6);
        assert!((d.bbox.center().x - 960.0).abs() < 1e-3);
        assert!((d.bbox.center().y - 540.0).abs() < 1e-3);
        assert!((d.bbox.width() - 180.0).abs() < 1e-3);
        assert!((d.bbox.height() - 360.0).abs() < 1e-3);
    }

    #[test]
    fn postprocess_rejects_unexpected_shapes() {
        let lb = letterbox_for(640, 640, 640);
        for shape in [&[1, 4][..], &[1, 4, 8][..], &[0, 6, 8][..], &[1, 6, 8, 1][..]] {
            let raw = ndarray::ArrayD::<f32>::zeros(ndarray::IxDyn(shape));
            assert!(
                matches!(
                    postprocess(&raw.view(), 640, 640, lb, 0.25, 0.45),
                    Err(TrackerError::Detector(_))
                ),
                "shape {shape:?} accepted"
            );
        }
    }

    #[test]
    fn nms_suppresses_overlaps_within_a_class_only() {
        let kept = nms(
            vec![
                det(0, 0.7, 0.0, 0.0, 100.0, 100.0),
                det(0, 0.9, 5.0, 5.0, 105.0, 105.0),
                det(1, 0.8, 5.0, 5.0, 105.0, 105.0),
                det(0, 0.6, 300.0, 300.0, 400.0, 400.0),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class_id, ClassId(1));
        assert_eq!(kept[2].bbox.x1, 300.0);
    }
}
