//! Capture configuration.
//!
//! A configuration is built once per `startCapture` request and stays
//! immutable for the lifetime of the session it starts. Changing the flash
//! mode or the lens facing produces a new configuration and a new session.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Width/height pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    /// Pixels across.
    pub width: u32,
    /// Pixels down.
    pub height: u32,
}

impl Size {
    /// Builds a size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height.
    pub fn ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Physical direction of the lens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Rear lens.
    #[default]
    Back,
    /// Selfie lens.
    Front,
}

impl Facing {
    /// Maps a host option string. Anything other than `"front"` selects the
    /// back lens.
    pub fn from_option(value: &str) -> Self {
        if value == "front" {
            Facing::Front
        } else {
            Facing::Back
        }
    }

    /// Host option value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Facing::Back => "back",
            Facing::Front => "front",
        }
    }
}

/// How encoded images are handed back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Inline `data:image/jpeg;base64,...` payloads.
    #[default]
    Data,
    /// Files in the cache directory; the payload carries the path.
    File,
}

impl OutputMode {
    /// Host option value.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputMode::Data => "data",
            OutputMode::File => "file",
        }
    }
}

/// Flash mode requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashMode {
    /// Continuous light.
    Torch,
    /// No light.
    Off,
}

impl FlashMode {
    /// `Torch` when `enabled`.
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            FlashMode::Torch
        } else {
            FlashMode::Off
        }
    }

    /// Identifier matched against the device's supported flash modes.
    pub fn identifier(&self) -> &'static str {
        match self {
            FlashMode::Torch => "torch",
            FlashMode::Off => "off",
        }
    }

    /// True for `Torch`.
    pub fn is_on(&self) -> bool {
        matches!(self, FlashMode::Torch)
    }
}

/// Configuration for one capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    /// Desired frames per second; also the depth of the on-disk file ring.
    pub fps: u32,
    /// Desired frame width in pixels.
    pub width: u32,
    /// Desired frame height in pixels.
    pub height: u32,
    /// Size of the full-size output image.
    pub canvas: Size,
    /// Size used to negotiate the preview resolution.
    pub capture: Size,
    /// Emission mode for encoded images.
    #[serde(rename = "use")]
    pub output_mode: OutputMode,
    /// Flash mode override; `None` leaves the device default untouched.
    pub flash_mode: Option<FlashMode>,
    /// Lens to open.
    pub camera_facing: Facing,
    /// Emit a thumbnail next to the full-size image.
    pub has_thumbnail: bool,
    /// Thumbnail size relative to the full-size image.
    pub thumbnail_ratio: f64,
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            fps: 30,
            width: 352,
            height: 288,
            canvas: Size::new(352, 288),
            capture: Size::new(352, 288),
            output_mode: OutputMode::Data,
            flash_mode: None,
            camera_facing: Facing::Back,
            has_thumbnail: false,
            thumbnail_ratio: 1.0 / 6.0,
        }
    }
}

impl CaptureConfiguration {
    /// Creates a configuration where desired, canvas and capture sizes all
    /// match.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            canvas: Size::new(width, height),
            capture: Size::new(width, height),
            ..Default::default()
        }
    }

    /// Parses the host's `startCapture` options object.
    ///
    /// `width`/`height` set the desired, canvas and capture sizes at once;
    /// the nested `canvas` and `capture` objects override them. Unknown keys
    /// are ignored. A `null` options value yields the defaults.
    pub fn from_options(options: &Value) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let obj = match options {
            Value::Null => return Ok(config),
            Value::Object(obj) => obj,
            _ => {
                return Err(ConfigError::InvalidOption {
                    key: "options".to_string(),
                    expected: "object",
                })
            }
        };

        if let Some(value) = obj.get("use") {
            config.output_mode = match as_string(value, "use")?.as_str() {
                "data" => OutputMode::Data,
                "file" => OutputMode::File,
                other => return Err(ConfigError::UnsupportedOutputMode(other.to_string())),
            };
        }

        if let Some(value) = obj.get("flashMode") {
            config.flash_mode = Some(FlashMode::from_enabled(as_bool(value, "flashMode")?));
        }

        if let Some(value) = obj.get("cameraFacing") {
            config.camera_facing = Facing::from_option(&as_string(value, "cameraFacing")?);
        }

        if let Some(value) = obj.get("fps") {
            config.fps = as_dimension(value, "fps")?;
        }

        if let Some(value) = obj.get("width") {
            let width = as_dimension(value, "width")?;
            config.width = width;
            config.canvas.width = width;
            config.capture.width = width;
        }

        if let Some(value) = obj.get("height") {
            let height = as_dimension(value, "height")?;
            config.height = height;
            config.canvas.height = height;
            config.capture.height = height;
        }

        if let Some(value) = obj.get("hasThumbnail") {
            config.has_thumbnail = as_bool(value, "hasThumbnail")?;
        }

        if let Some(value) = obj.get("thumbnailRatio") {
            config.thumbnail_ratio = as_f64(value, "thumbnailRatio")?;
        }

        if let Some(value) = obj.get("canvas") {
            let canvas = as_object(value, "canvas")?;
            if let Some(w) = canvas.get("width") {
                config.canvas.width = as_dimension(w, "canvas.width")?;
            }
            if let Some(h) = canvas.get("height") {
                config.canvas.height = as_dimension(h, "canvas.height")?;
            }
        }

        if let Some(value) = obj.get("capture") {
            let capture = as_object(value, "capture")?;
            if let Some(w) = capture.get("width") {
                config.capture.width = as_dimension(w, "capture.width")?;
            }
            if let Some(h) = capture.get("height") {
                config.capture.height = as_dimension(h, "capture.height")?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Returns a copy with a different flash request.
    pub fn with_flash_mode(&self, flash_mode: FlashMode) -> Self {
        Self {
            flash_mode: Some(flash_mode),
            ..self.clone()
        }
    }

    /// Returns a copy targeting another lens.
    pub fn with_facing(&self, camera_facing: Facing) -> Self {
        Self {
            camera_facing,
            ..self.clone()
        }
    }

    /// Renders the configuration as a host options object, the inverse of
    /// [`CaptureConfiguration::from_options`].
    pub fn to_options(&self) -> Value {
        let mut options = serde_json::json!({
            "use": self.output_mode.as_str(),
            "fps": self.fps,
            "width": self.width,
            "height": self.height,
            "canvas": { "width": self.canvas.width, "height": self.canvas.height },
            "capture": { "width": self.capture.width, "height": self.capture.height },
            "cameraFacing": self.camera_facing.as_str(),
            "hasThumbnail": self.has_thumbnail,
            "thumbnailRatio": self.thumbnail_ratio,
        });
        if let (Some(flash), Value::Object(map)) = (self.flash_mode, &mut options) {
            map.insert("flashMode".into(), Value::Bool(flash.is_on()));
        }
        options
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            Size::new(self.width, self.height),
            self.canvas,
            self.capture,
        ];
        if sizes.iter().any(|s| s.width == 0 || s.height == 0) {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.fps == 0 || self.fps > 120 {
            return Err(ConfigError::InvalidFrameRate);
        }
        if !(self.thumbnail_ratio > 0.0 && self.thumbnail_ratio <= 1.0) {
            return Err(ConfigError::InvalidThumbnailRatio(self.thumbnail_ratio));
        }
        Ok(())
    }
}

fn as_object<'a>(
    value: &'a Value,
    key: &str,
) -> Result<&'a serde_json::Map<String, Value>, ConfigError> {
    value.as_object().ok_or_else(|| ConfigError::InvalidOption {
        key: key.to_string(),
        expected: "object",
    })
}

fn as_string(value: &Value, key: &str) -> Result<String, ConfigError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ConfigError::InvalidOption {
            key: key.to_string(),
            expected: "string",
        })
}

// Host bridges frequently stringify scalars, so "true"/"false" are accepted.
fn as_bool(value: &Value, key: &str) -> Result<bool, ConfigError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(ConfigError::InvalidOption {
            key: key.to_string(),
            expected: "boolean",
        }),
    }
}

fn as_f64(value: &Value, key: &str) -> Result<f64, ConfigError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| ConfigError::InvalidOption {
            key: key.to_string(),
            expected: "number",
        })
}

fn as_dimension(value: &Value, key: &str) -> Result<u32, ConfigError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    let parsed = parsed.ok_or_else(|| ConfigError::InvalidOption {
        key: key.to_string(),
        expected: "integer",
    })?;
    if parsed <= 0 || parsed > u32::MAX as i64 {
        return Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value: parsed,
        });
    }
    Ok(parsed as u32)
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Width or height is zero.
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    /// Frame rate outside 1-120.
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    /// Thumbnail ratio outside (0, 1].
    #[error("invalid thumbnail ratio {0} (must be in (0, 1])")]
    InvalidThumbnailRatio(f64),
    /// An option has the wrong JSON type.
    #[error("option `{key}` must be a {expected}")]
    InvalidOption {
        /// Option name.
        key: String,
        /// Expected JSON type.
        expected: &'static str,
    },
    /// A numeric option does not fit its field.
    #[error("option `{key}` is out of range: {value}")]
    OutOfRange {
        /// Option name.
        key: String,
        /// Value given.
        value: i64,
    },
    /// `outputMode` is neither `data` nor `file`.
    #[error("unsupported output mode `{0}` (expected `data` or `file`)")]
    UnsupportedOutputMode(String),
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The config file is not valid TOML for [`FileConfig`].
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Default capture options.
    #[serde(default)]
    pub capture: CaptureConfiguration,
    /// Cache and worker settings.
    #[serde(default)]
    pub output: OutputConfig,
    /// Prometheus exporter settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Output and processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory holding persisted frames.
    pub cache_dir: PathBuf,
    /// Number of frame processing workers.
    pub workers: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("canvascamera"),
            workers: 2,
        }
    }
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Metrics server port (0 to disable).
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { port: 9090 }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.capture.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config_valid() {
        let config = CaptureConfiguration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.canvas, Size::new(352, 288));
    }

    #[test]
    fn test_width_height_propagate_to_canvas_and_capture() {
        let config = CaptureConfiguration::from_options(&json!({
            "width": 640,
            "height": 480,
            "canvas": { "width": 320 },
        }))
        .unwrap();

        assert_eq!(config.width, 640);
        assert_eq!(config.capture, Size::new(640, 480));
        assert_eq!(config.canvas, Size::new(320, 480));
    }

    #[test]
    fn test_full_options_object() {
        let config = CaptureConfiguration::from_options(&json!({
            "use": "file",
            "fps": 15,
            "flashMode": true,
            "cameraFacing": "front",
            "hasThumbnail": true,
            "thumbnailRatio": 0.25,
            "capture": { "width": 1280, "height": 720 },
        }))
        .unwrap();

        assert_eq!(config.output_mode, OutputMode::File);
        assert_eq!(config.fps, 15);
        assert_eq!(config.flash_mode, Some(FlashMode::Torch));
        assert_eq!(config.camera_facing, Facing::Front);
        assert!(config.has_thumbnail);
        assert_eq!(config.thumbnail_ratio, 0.25);
        assert_eq!(config.capture, Size::new(1280, 720));
    }

    #[test]
    fn test_non_numeric_width_rejected() {
        let err = CaptureConfiguration::from_options(&json!({ "width": "wide" })).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { ref key, .. } if key == "width"));
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let config =
            CaptureConfiguration::from_options(&json!({ "width": "320", "fps": 10.0 })).unwrap();
        assert_eq!(config.width, 320);
        assert_eq!(config.fps, 10);
    }

    #[test]
    fn test_zero_dimensions_invalid() {
        let err = CaptureConfiguration::from_options(&json!({ "height": 0 })).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));

        let mut config = CaptureConfiguration::default();
        config.canvas.width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimensions)
        ));
    }

    #[test]
    fn test_thumbnail_ratio_bounds() {
        assert!(CaptureConfiguration::from_options(&json!({ "thumbnailRatio": 1.0 })).is_ok());
        assert!(matches!(
            CaptureConfiguration::from_options(&json!({ "thumbnailRatio": 1.5 })),
            Err(ConfigError::InvalidThumbnailRatio(_))
        ));
        assert!(matches!(
            CaptureConfiguration::from_options(&json!({ "thumbnailRatio": 0 })),
            Err(ConfigError::InvalidThumbnailRatio(_))
        ));
    }

    #[test]
    fn test_unknown_use_rejected() {
        assert!(matches!(
            CaptureConfiguration::from_options(&json!({ "use": "both" })),
            Err(ConfigError::UnsupportedOutputMode(_))
        ));
    }

    #[test]
    fn test_unknown_facing_is_back() {
        let config =
            CaptureConfiguration::from_options(&json!({ "cameraFacing": "side" })).unwrap();
        assert_eq!(config.camera_facing, Facing::Back);
    }

    #[test]
    fn test_file_config_from_toml() {
        let config = FileConfig::from_toml(
            r#"
            [capture]
            fps = 24
            use = "file"
            has_thumbnail = true
            thumbnail_ratio = 0.5
            camera_facing = "front"

            [output]
            cache_dir = "/tmp/frames"
            workers = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.fps, 24);
        assert_eq!(config.capture.output_mode, OutputMode::File);
        assert_eq!(config.capture.camera_facing, Facing::Front);
        assert_eq!(config.output.cache_dir, PathBuf::from("/tmp/frames"));
        assert_eq!(config.output.workers, 4);
        assert_eq!(config.metrics.port, 9090);
    }

    #[test]
    fn test_options_from_file_config() {
        let config = CaptureConfiguration {
            output_mode: OutputMode::File,
            flash_mode: Some(FlashMode::Torch),
            camera_facing: Facing::Front,
            has_thumbnail: true,
            thumbnail_ratio: 0.25,
            canvas: Size::new(176, 144),
            ..CaptureConfiguration::with_dimensions(640, 480)
        };

        let options = config.to_options();
        assert_eq!(options["flashMode"], json!(true));
        assert_eq!(CaptureConfiguration::from_options(&options).unwrap(), config);
        assert!(CaptureConfiguration::default().to_options().get("flashMode").is_none());
    }

    #[test]
    fn test_file_config_rejects_invalid_capture() {
        let err = FileConfig::from_toml("[capture]\nfps = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFrameRate));
    }
}
