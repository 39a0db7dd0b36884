//! Parameter negotiation between a capture request and device capabilities.
//!
//! Everything here is pure and recomputed on every preview start, so a
//! restart after a rotation or lens change picks up fresh values.

mod capabilities;
mod negotiator;
mod rotation;

pub use capabilities::{FpsRange, HardwareCapabilities, NegotiatedParameters};
pub use negotiator::{
    negotiate, select_flash_mode, select_focus_mode, select_fps_range, select_preview_size,
    ASPECT_TOLERANCE,
};
pub use rotation::{display_orientation, sensor_rotation, DeviceOrientation, DisplayRotation};
