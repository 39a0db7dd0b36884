//! Camera session lifecycle.
//!
//! A session moves through `Idle → Opening → Previewing → Stopping → Idle`,
//! with `Error` reached after a hardware fault whose single restart failed.
//! [`SessionMachine`] owns the transitions and the device handle;
//! [`CameraService`] runs it on a coordination thread and serializes host
//! commands, hardware faults and processed frames through one queue.
//!
//! Each preview belongs to a generation. Every open and every stop starts a
//! new one, and frames or faults tagged with an older generation are
//! discarded.

mod error;
mod machine;
mod opener;
mod pipeline;
mod service;
mod state;
mod workers;

pub use error::{CommandFailure, SessionError};
pub use machine::{FaultOutcome, SessionMachine};
pub use opener::DeviceOpener;
pub use pipeline::{
    CallbackFactory, FrameError, FramePipeline, PipelineStats, ProcessedFrame,
};
pub use service::{CameraService, CaptureStream, ServiceStatus};
pub use state::SessionState;
pub use workers::{PoolHandle, WorkerPool};
