//! Prometheus metrics for camera session monitoring.
//!
//! # Metrics Exposed
//!
//! ## Session
//! - `canvas_camera_session_state` - Current state code (0=idle .. 4=error)
//! - `canvas_camera_previewing` - 1 while a preview is running
//! - `canvas_camera_restarts_total` - Restarts attempted after hardware faults
//! - `canvas_camera_failed_restarts_total` - Fault restarts that failed
//!
//! ## Frames
//! - `canvas_camera_frames_received_total` - Frames handed over by the camera
//! - `canvas_camera_frames_delivered_total` - Results delivered to the host
//! - `canvas_camera_frames_dropped_total` - Frames that produced no result
//!
//! ## Output
//! - `canvas_camera_artifacts_written_total` - Full-size and thumbnail images
//! - `canvas_camera_write_failures_total` - Images that could not be written
//!
//! The HTTP exporter is behind the `metrics` feature.
//!
//! # Example
//!
//! ```no_run
//! use canvas_camera::metrics::{MetricsRegistry, MetricsSnapshot};
//! use canvas_camera::session::PipelineStats;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! let stats = PipelineStats::new();
//!
//! registry.update(&MetricsSnapshot::from_stats(&stats));
//! println!("{}", registry.encode().unwrap());
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
