//! Camera input and frame handling.
//!
//! Hardware access goes through [`CameraBackend`] / [`CameraDevice`]; raw
//! preview frames arrive as borrowed [`FrameBuffer`]s and are copied into
//! [`FrameSnapshot`]s before leaving the hardware callback.

mod camera;
mod config;
mod frame;
mod mock;

pub use camera::{
    CameraBackend, CameraDevice, CameraError, DeviceInfo, FaultCallback, FrameCallback,
    HardwareFault, PreviewCallbacks,
};
pub use config::{
    CaptureConfiguration, ConfigError, Facing, FileConfig, FlashMode, MetricsConfig,
    OutputConfig, OutputMode, Size,
};
pub use frame::{FrameBuffer, FrameSnapshot, PixelFormat};
pub use mock::{FrameSource, MockBackend, MockControl, MockDevice, MockDeviceSpec};
