/// Best-effort dump of annotated frames into a bounded, rotating directory.
///
/// Filenames are `{timestamp}_{class}_{confidence}.png`, so lexical order is
/// chronological and the oldest files are the first to be pruned.
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::RgbImage;

use crate::config::DebugDumpConfig;
use crate::errors::{TrackerError, TrackerResult};
use crate::perception::annotator::annotate_target;
use crate::perception::types::{Detection, Point};

pub struct DebugDump {
    directory: PathBuf,
    max_files: usize,
    min_confidence: f32,
    min_interval: Duration,
    class_names: Vec<String>,
    last_saved: Option<Instant>,
}

impl DebugDump {
    pub fn new(config: &DebugDumpConfig, class_names: Vec<String>) -> TrackerResult<Self> {
        std::fs::create_dir_all(&config.directory).map_err(|e| {
            TrackerError::Save(format!("create {}: {e}", config.directory.display()))
        })?;
        tracing::info!(dir = %config.directory.display(), max_files = config.max_files, "debug dump enabled");
        Ok(Self {
            directory: config.directory.clone(),
            max_files: config.max_files.max(1),
            min_confidence: config.min_confidence,
            min_interval: Duration::from_millis(config.min_interval_ms),
            class_names,
            last_saved: None,
        })
    }

    /// Save if the detection qualifies and the rate limit allows it.
    /// Failures are logged and swallowed; targeting never depends on this.
    pub fn offer(&mut self, frame: &RgbImage, detection: &Detection, aim: Point) -> Option<PathBuf> {
        if detection.confidence < self.min_confidence {
            return None;
        }
        let now = Instant::now();
        if matches!(self.last_saved, Some(t) if now.duration_since(t) < self.min_interval) {
            return None;
        }

        match self.save(frame, detection, aim) {
            Ok(path) => {
                self.last_saved = Some(now);
                tracing::debug!(path = %path.display(), "debug frame saved");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(error = %e, "debug frame save failed");
                None
            }
        }
    }

    fn save(&self, frame: &RgbImage, detection: &Detection, aim: Point) -> TrackerResult<PathBuf> {
        self.prune(self.max_files - 1)?;

        let path = self.directory.join(self.file_name(detection));
        annotate_target(frame, detection, aim)
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| TrackerError::Save(format!("write {}: {e}", path.display())))?;
        Ok(path)
    }

    fn file_name(&self, detection: &Detection) -> String {
        let class = self
            .class_names
            .get(detection.class_id.0)
            .map(|n| sanitize(n))
            .unwrap_or_else(|| format!("class{}", detection.class_id));
        format!(
            "{}_{}_{:.2}.png",
            chrono::Local::now().format("%Y%m%d_%H%M%S_%3f"),
            class,
            detection.confidence
        )
    }

    /// Delete the oldest dumps until at most `keep` remain.
    fn prune(&self, keep: usize) -> TrackerResult<()> {
        let mut existing = list_pngs(&self.directory)?;
        if existing.len() <= keep {
            return Ok(());
        }
        existing.sort();
        let excess = existing.len() - keep;
        for old in existing.into_iter().take(excess) {
            std::fs::remove_file(&old)
                .map_err(|e| TrackerError::Save(format!("remove {}: {e}", old.display())))?;
        }
        Ok(())
    }
}

fn list_pngs(dir: &Path) -> TrackerResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| TrackerError::Save(format!("read {}: {e}", dir.display())))?;
    Ok(entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
        .collect())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}
