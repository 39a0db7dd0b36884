//! What a device supports and what was picked from it.

use crate::capture::{Facing, FlashMode, PixelFormat, Size};
use serde::{Deserialize, Serialize};

/// Frame rate range in frames per second times 1000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FpsRange {
    /// Lower bound.
    pub min: u32,
    /// Upper bound.
    pub max: u32,
}

impl FpsRange {
    /// Builds a range from scaled bounds.
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Range in whole frames per second, as reported to the host.
    pub fn as_fps(&self) -> (u32, u32) {
        (self.min / 1000, self.max / 1000)
    }
}

/// Supported parameters of an open device. Read once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareCapabilities {
    /// Preview sizes in the device's order.
    pub preview_sizes: Vec<Size>,
    /// Supported frame rate ranges.
    pub fps_ranges: Vec<FpsRange>,
    /// Focus mode identifiers.
    pub focus_modes: Vec<String>,
    /// `None` when the device has no flash unit.
    pub flash_modes: Option<Vec<String>>,
    /// Lens direction.
    pub facing: Facing,
    /// Clockwise sensor mount angle in degrees.
    pub mount_angle: u32,
    /// Raw frame layout.
    pub preview_format: PixelFormat,
}

/// Parameters chosen for one preview. `None` fields leave the device
/// default in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiatedParameters {
    /// Chosen preview size.
    pub preview_size: Option<Size>,
    /// Chosen frame rate range.
    pub fps_range: Option<FpsRange>,
    /// Chosen focus mode.
    pub focus_mode: Option<String>,
    /// Flash mode in effect.
    pub flash_mode: Option<FlashMode>,
    /// Clockwise rotation applied to emitted images.
    pub display_orientation: u32,
    /// Rotation the sensor reports for captured stills.
    pub sensor_rotation: u32,
    /// Raw frame layout.
    pub preview_format: PixelFormat,
}
