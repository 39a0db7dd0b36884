//! JSON result messages delivered to the host.

use super::Emission;
use crate::capture::{CaptureConfiguration, FlashMode, PixelFormat};
use crate::negotiation::NegotiatedParameters;
use serde::Serialize;

/// One message on a command's result channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultPayload {
    /// `OK`, a status line or the error text.
    pub message: String,
    /// Active configuration.
    pub options: OptionsPayload,
    /// Device preview state.
    pub preview: PreviewPayload,
    /// Images of a frame result.
    pub output: OutputPayload,
}

impl ResultPayload {
    /// Message with no images.
    pub fn new(message: impl Into<String>, options: OptionsPayload, preview: PreviewPayload) -> Self {
        Self {
            message: message.into(),
            options,
            preview,
            output: OutputPayload::default(),
        }
    }

    /// Attaches the images of one frame.
    pub fn with_images(mut self, images: ImagesPayload) -> Self {
        self.output.images = images;
        self
    }

    /// Sets `output.images.orientation`, reported on command results.
    pub fn with_orientation(mut self, orientation: u32) -> Self {
        self.output.images.orientation = Some(orientation);
        self
    }

    /// Wire form sent to the host.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Width and height of a configured box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizePayload {
    /// Pixels across.
    pub width: u32,
    /// Pixels down.
    pub height: u32,
}

/// Echo of the active capture configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsPayload {
    /// Requested preview width.
    pub width: u32,
    /// Requested preview height.
    pub height: u32,
    /// Requested frame rate.
    pub fps: u32,
    /// Torch is on.
    pub flash_mode: bool,
    /// `back` or `front`.
    pub camera_facing: &'static str,
    /// Thumbnails are emitted.
    pub has_thumbnail: bool,
    /// Thumbnail scale.
    pub thumbnail_ratio: f64,
    /// Host canvas size.
    pub canvas: SizePayload,
    /// Output image box.
    pub capture: SizePayload,
}

impl OptionsPayload {
    /// `flash` is the mode in effect, which may differ from the request when
    /// the device lacks a flash.
    pub fn new(config: &CaptureConfiguration, flash: Option<FlashMode>) -> Self {
        Self {
            width: config.width,
            height: config.height,
            fps: config.fps,
            flash_mode: flash.is_some_and(|f| f.is_on()),
            camera_facing: config.camera_facing.as_str(),
            has_thumbnail: config.has_thumbnail,
            thumbnail_ratio: config.thumbnail_ratio,
            canvas: SizePayload {
                width: config.canvas.width,
                height: config.canvas.height,
            },
            capture: SizePayload {
                width: config.capture.width,
                height: config.capture.height,
            },
        }
    }
}

/// Camera in use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraPayload {
    /// Backend camera id.
    pub id: u32,
}

/// Frame rate range in whole frames per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FpsPayload {
    /// Lower bound.
    pub min: u32,
    /// Upper bound.
    pub max: u32,
}

/// Current preview state of the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewPayload {
    /// Frames are streaming.
    pub started: bool,
    /// Raw frame format label.
    pub format: &'static str,
    /// Focus mode in effect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_mode: Option<String>,
    /// Negotiated preview width.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Negotiated preview height.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Camera in use.
    pub camera: CameraPayload,
    /// Negotiated frame rate range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<FpsPayload>,
}

impl PreviewPayload {
    /// No camera open.
    pub fn stopped() -> Self {
        Self {
            started: false,
            format: PixelFormat::default().label(),
            focus_mode: None,
            width: None,
            height: None,
            camera: CameraPayload { id: 0 },
            fps: None,
        }
    }

    /// Preview state of an open camera.
    pub fn from_parameters(started: bool, camera_id: u32, parameters: &NegotiatedParameters) -> Self {
        Self {
            started,
            format: parameters.preview_format.label(),
            focus_mode: parameters.focus_mode.clone(),
            width: parameters.preview_size.map(|s| s.width),
            height: parameters.preview_size.map(|s| s.height),
            camera: CameraPayload { id: camera_id },
            fps: parameters.fps_range.map(|r| {
                let (min, max) = r.as_fps();
                FpsPayload { min, max }
            }),
        }
    }
}

/// `output` section of a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutputPayload {
    /// Emitted images.
    pub images: ImagesPayload,
}

/// Images of one frame, or only the orientation on command results.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImagesPayload {
    /// Full size image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fullsize: Option<ImagePayload>,
    /// Scaled down image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<ImagePayload>,
    /// Display orientation in degrees.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<u32>,
}

/// One emitted image: `data` or `file`, plus placement metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImagePayload {
    /// `data` or `file` key.
    #[serde(flatten)]
    pub emission: Emission,
    /// Clockwise rotation applied, in degrees.
    pub rotation: u32,
    /// Device orientation label.
    pub orientation: &'static str,
    /// Capture time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}
