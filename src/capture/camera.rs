//! Camera hardware abstraction.
//!
//! The session drives hardware through these traits; the host platform's
//! camera service sits behind them. Frame and fault callbacks are invoked on
//! hardware threads and must not block.

use super::{Facing, FrameBuffer};
use crate::negotiation::{HardwareCapabilities, NegotiatedParameters};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// No camera matches the request.
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    /// The backend refused the open.
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    /// Another handle holds the camera.
    #[error("camera {0} is already in use")]
    Busy(u32),
    /// Negotiated parameters were rejected.
    #[error("failed to configure camera: {0}")]
    ConfigFailed(String),
    /// Streaming could not start.
    #[error("failed to start preview: {0}")]
    PreviewFailed(String),
    /// No camera is open.
    #[error("camera not initialized")]
    NotInitialized,
}

/// Asynchronous hardware failure reported through the error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareFault {
    /// Another client took the camera.
    Evicted,
    /// The platform camera service died.
    ServerDied,
    /// Unspecified error.
    Unknown,
    /// Vendor specific error code.
    Other(i32),
}

impl HardwareFault {
    /// Maps a platform error code.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => HardwareFault::Unknown,
            2 => HardwareFault::Evicted,
            100 => HardwareFault::ServerDied,
            other => HardwareFault::Other(other),
        }
    }

    /// Platform error code, the inverse of [`from_code`](Self::from_code).
    pub fn code(&self) -> i32 {
        match self {
            HardwareFault::Unknown => 1,
            HardwareFault::Evicted => 2,
            HardwareFault::ServerDied => 100,
            HardwareFault::Other(code) => *code,
        }
    }
}

impl fmt::Display for HardwareFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareFault::Evicted => write!(f, "camera evicted by another client"),
            HardwareFault::ServerDied => write!(f, "camera server died"),
            HardwareFault::Unknown => write!(f, "unknown camera error"),
            HardwareFault::Other(code) => write!(f, "camera error {}", code),
        }
    }
}

/// A camera as listed by the backend, before it is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Backend camera id.
    pub id: u32,
    /// Lens direction.
    pub facing: Facing,
    /// Clockwise sensor mount angle in degrees.
    pub mount_angle: u32,
}

/// Receives raw preview frames. The buffer is only valid during the call.
pub type FrameCallback = Arc<dyn Fn(FrameBuffer<'_>) + Send + Sync>;

/// Receives asynchronous hardware faults.
pub type FaultCallback = Arc<dyn Fn(HardwareFault) + Send + Sync>;

/// Callbacks attached to a device for the lifetime of one preview.
#[derive(Clone)]
pub struct PreviewCallbacks {
    /// Called for every preview frame.
    pub on_frame: FrameCallback,
    /// Called when the device fails asynchronously.
    pub on_error: FaultCallback,
}

impl PreviewCallbacks {
    /// Wraps a frame handler and a fault handler.
    pub fn new<F, E>(on_frame: F, on_error: E) -> Self
    where
        F: Fn(FrameBuffer<'_>) + Send + Sync + 'static,
        E: Fn(HardwareFault) + Send + Sync + 'static,
    {
        Self {
            on_frame: Arc::new(on_frame),
            on_error: Arc::new(on_error),
        }
    }
}

impl fmt::Debug for PreviewCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewCallbacks").finish_non_exhaustive()
    }
}

/// Entry point into the platform camera service.
///
/// `open` may block for a long time; the session only calls it from its
/// dedicated opener thread.
pub trait CameraBackend: Send + Sync + 'static {
    /// Open device handle type.
    type Device: CameraDevice;

    /// Lists the cameras present on the system.
    fn devices(&self) -> Result<Vec<DeviceInfo>, CameraError>;

    /// Opens a camera by id, acquiring the exclusive hardware handle.
    fn open(&self, id: u32) -> Result<Self::Device, CameraError>;
}

/// An open, exclusively held camera.
///
/// Dropping a device without calling [`release`](CameraDevice::release)
/// must still release the hardware.
pub trait CameraDevice: Send + 'static {
    /// Listing entry this device was opened from.
    fn info(&self) -> DeviceInfo;

    /// Reads the device's supported parameters.
    fn capabilities(&self) -> Result<HardwareCapabilities, CameraError>;

    /// Applies negotiated parameters. Called before `start_preview`.
    fn configure(&mut self, parameters: &NegotiatedParameters) -> Result<(), CameraError>;

    /// Attaches callbacks and starts streaming.
    fn start_preview(&mut self, callbacks: PreviewCallbacks) -> Result<(), CameraError>;

    /// Stops streaming and detaches callbacks. No callback fires after this
    /// returns.
    fn stop_preview(&mut self) -> Result<(), CameraError>;

    /// Releases the hardware handle.
    fn release(self);
}
