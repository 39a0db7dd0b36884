//! Errors reported to callers of session commands.

use crate::capture::{CameraError, ConfigError, HardwareFault};
use crate::output::{ResultPayload, SinkError};
use thiserror::Error;

/// Why a session command failed.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Rejected before any hardware access; the session is untouched.
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    /// No matching device, device busy, or no camera open.
    #[error("camera unavailable: {0}")]
    HardwareUnavailable(#[from] CameraError),

    /// The device failed while previewing and the one automatic restart
    /// failed too.
    #[error("camera fault ({fault}); restart failed: {source}")]
    HardwareFault {
        /// Fault reported by the device.
        fault: HardwareFault,
        /// Why the restart failed.
        #[source]
        source: Box<SessionError>,
    },

    /// A command needs a running `start_capture` stream.
    #[error("no capture in progress")]
    NoActiveCapture,

    /// The output cache could not be prepared.
    #[error("output error: {0}")]
    Io(#[from] SinkError),

    /// A session or worker thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        /// Thread name.
        name: &'static str,
        /// OS error.
        #[source]
        source: std::io::Error,
    },

    /// The coordination thread is gone.
    #[error("camera service has shut down")]
    ServiceClosed,
}

/// A failed command together with the session context at failure time.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct CommandFailure {
    /// What went wrong.
    #[source]
    pub error: SessionError,
    /// Options and preview state, with `message` set to the error text.
    pub context: ResultPayload,
}

impl CommandFailure {
    /// Pairs `error` with `context`, copying the error text into its message.
    pub fn new(error: SessionError, context: ResultPayload) -> Self {
        let context = ResultPayload {
            message: error.to_string(),
            ..context
        };
        Self { error, context }
    }
}
