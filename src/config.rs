use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{TrackerError, TrackerResult};

const CONFIG_ENV_VAR: &str = "RETICLE_CONFIG";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub debug_dump: DebugDumpConfig,
}

/// Targeting tunables. Immutable for the whole session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Detections must score strictly above this to be considered.
    pub conf_threshold: f32,
    /// Dead zone radius around the reference point; no movement inside it.
    pub hysteresis_px: f32,
    /// Scales the speed curve output.
    pub speed_coefficient: f32,
    /// Exponent of the speed curve. Values above 1 close large gaps faster.
    pub curve_exponent: f32,
    /// Minimum apparent target shift before the committed point is replaced.
    pub shift_threshold_px: f32,
    /// Fraction of box height below the top edge used as the aim point.
    pub head_fraction: f32,
    /// Optional cap on a single step, in pixels.
    pub max_step_px: Option<f32>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            conf_threshold: 0.6,
            hysteresis_px: 4.0,
            speed_coefficient: 0.2,
            curve_exponent: 1.6,
            shift_threshold_px: 40.0,
            head_fraction: 0.12,
            max_step_px: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: String,
    /// Square network input edge in pixels.
    pub input_size: u32,
    /// Proposals below this score are dropped before NMS.
    pub score_threshold: f32,
    pub iou_threshold: f32,
    /// Display names of the model classes, indexed by class id.
    pub class_names: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "models/detector.onnx".into(),
            input_size: 640,
            score_threshold: 0.25,
            iou_threshold: 0.45,
            class_names: vec!["class_a".into(), "class_b".into()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Index into the monitor list; the primary monitor when unset.
    pub monitor: Option<usize>,
    /// Sub-rectangle of the monitor to capture; the whole monitor when unset.
    pub region: Option<CaptureRegion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub mode: RunMode,
    pub max_duration_secs: Option<u64>,
    pub max_frames: Option<u64>,
    /// Targeting runs on every Nth captured frame.
    pub frame_skip: u32,
    pub loop_delay_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::UntilInterrupted,
            max_duration_secs: None,
            max_frames: None,
            frame_skip: 1,
            loop_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    UntilInterrupted,
    Timed,
    FrameLimit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugDumpConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    pub max_files: usize,
    pub min_confidence: f32,
    pub min_interval_ms: u64,
}

impl Default for DebugDumpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: PathBuf::from("debug_frames"),
            max_files: 10,
            min_confidence: 0.8,
            min_interval_ms: 1000,
        }
    }
}

impl AppConfig {
    /// Reject tunables that would make the targeting math meaningless.
    pub fn validate(&self) -> TrackerResult<()> {
        let t = &self.tracking;
        if !(0.0..=1.0).contains(&t.conf_threshold) {
            return Err(invalid("tracking.conf_threshold must be within [0, 1]"));
        }
        if !t.hysteresis_px.is_finite() || t.hysteresis_px < 0.0 {
            return Err(invalid("tracking.hysteresis_px must be finite and not negative"));
        }
        if !t.speed_coefficient.is_finite() || t.speed_coefficient <= 0.0 {
            return Err(invalid("tracking.speed_coefficient must be finite and positive"));
        }
        if !t.curve_exponent.is_finite() || t.curve_exponent <= 0.0 {
            return Err(invalid("tracking.curve_exponent must be finite and positive"));
        }
        if !t.shift_threshold_px.is_finite() || t.shift_threshold_px < 0.0 {
            return Err(invalid("tracking.shift_threshold_px must be finite and not negative"));
        }
        if !(0.0..=1.0).contains(&t.head_fraction) {
            return Err(invalid("tracking.head_fraction must be within [0, 1]"));
        }
        if matches!(t.max_step_px, Some(cap) if !cap.is_finite() || cap <= 0.0) {
            return Err(invalid("tracking.max_step_px must be finite and positive when set"));
        }

        if self.detector.class_names.is_empty() {
            return Err(invalid("detector.class_names must name at least one class"));
        }
        if self.detector.input_size == 0 {
            return Err(invalid("detector.input_size must be positive"));
        }

        if matches!(self.capture.region, Some(r) if r.width == 0 || r.height == 0) {
            return Err(invalid("capture.region must have a non-zero size"));
        }

        let run = &self.run;
        if run.frame_skip == 0 {
            return Err(invalid("run.frame_skip must be at least 1"));
        }
        match run.mode {
            RunMode::Timed if run.max_duration_secs.is_none() => {
                return Err(invalid("run.mode = \"timed\" requires run.max_duration_secs"));
            }
            RunMode::FrameLimit if run.max_frames.is_none() => {
                return Err(invalid("run.mode = \"frame_limit\" requires run.max_frames"));
            }
            _ => {}
        }

        if self.debug_dump.enabled && self.debug_dump.max_files == 0 {
            return Err(invalid("debug_dump.max_files must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> TrackerError {
    TrackerError::Config(msg.to_string())
}

/// Locate `config.toml`. `Ok(None)` means no file anywhere; an explicit
/// `RETICLE_CONFIG` pointing at a missing file is an error.
fn resolve_config_path() -> TrackerResult<Option<PathBuf>> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(explicit);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config taken from RETICLE_CONFIG");
            return Ok(Some(candidate));
        }
        return Err(TrackerError::Config(format!(
            "{} points to missing file {}",
            CONFIG_ENV_VAR,
            candidate.display()
        )));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(Some(candidate));
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join(CONFIG_FILE_NAME);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(Some(candidate));
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("reticle").join(CONFIG_FILE_NAME);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

pub fn parse_config(content: &str) -> TrackerResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load and validate the config. Without a file the defaults are used.
pub fn load_config() -> TrackerResult<AppConfig> {
    let Some(path) = resolve_config_path()? else {
        tracing::warn!("config.toml not found; running with built-in defaults");
        return Ok(AppConfig::default());
    };
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), model = %config.detector.model_path, "config loaded");
    Ok(config)
}
