//! Display and sensor rotation arithmetic.

use crate::capture::Facing;
use serde::{Deserialize, Serialize};

/// Rotation of the host display relative to its natural orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DisplayRotation {
    /// Natural orientation.
    #[default]
    Deg0,
    /// Quarter turn.
    Deg90,
    /// Upside down.
    Deg180,
    /// Three quarter turn.
    Deg270,
}

impl DisplayRotation {
    /// Rotation in degrees.
    #[inline]
    pub fn degrees(self) -> u32 {
        match self {
            DisplayRotation::Deg0 => 0,
            DisplayRotation::Deg90 => 90,
            DisplayRotation::Deg180 => 180,
            DisplayRotation::Deg270 => 270,
        }
    }

    /// Nearest quarter turn for an arbitrary angle in degrees.
    pub fn from_degrees(degrees: u32) -> Self {
        match ((degrees % 360) + 45) / 90 % 4 {
            1 => DisplayRotation::Deg90,
            2 => DisplayRotation::Deg180,
            3 => DisplayRotation::Deg270,
            _ => DisplayRotation::Deg0,
        }
    }
}

/// Coarse device orientation reported alongside every artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceOrientation {
    /// Taller than wide.
    Portrait,
    /// Wider than tall.
    Landscape,
    /// Not reported yet.
    #[default]
    Unknown,
}

impl DeviceOrientation {
    /// Name used in result payloads.
    pub fn label(self) -> &'static str {
        match self {
            DeviceOrientation::Portrait => "portrait",
            DeviceOrientation::Landscape => "landscape",
            DeviceOrientation::Unknown => "unknown",
        }
    }
}

/// Clockwise rotation to apply to preview output so it appears upright.
///
/// Front lenses compensate for the mirror.
pub fn display_orientation(facing: Facing, mount_angle: u32, rotation: DisplayRotation) -> u32 {
    let m = mount_angle % 360;
    let d = rotation.degrees();
    match facing {
        Facing::Front => (360 - (m + d) % 360) % 360,
        Facing::Back => (m + 360 - d) % 360,
    }
}

/// Rotation to report for sensor captures.
pub fn sensor_rotation(facing: Facing, mount_angle: u32, rotation: DisplayRotation) -> u32 {
    let m = mount_angle % 360;
    let d = rotation.degrees();
    match facing {
        Facing::Front => (360 + m + d) % 360,
        Facing::Back => (360 + m - d) % 360,
    }
}
