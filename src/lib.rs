//! Canvas Camera Library
//!
//! Camera session management and preview frame processing for camera
//! plugins hosted in a web view. Raw preview frames are compressed to JPEG,
//! scaled and rotated to the host canvas, and delivered either inline as
//! base64 data URIs or as files in a small rotating cache.
//!
//! # Architecture
//!
//! ```text
//!  host command ──► session ──► negotiation ──► capture (device)
//!                      ▲                            │ raw frames
//!                      │ results                    ▼
//!                   output ◄── transform ◄──── codec (YUV → JPEG)
//! ```
//!
//! - [`capture`]: device abstraction, options parsing, frame buffers
//! - [`codec`]: YUV to JPEG compression
//! - [`transform`]: scaling, mirroring and rotation of JPEG images
//! - [`negotiation`]: preview size, frame rate, focus and flash selection
//! - [`output`]: data URIs, the file ring and result payloads
//! - [`session`]: state machine and the coordination thread
//! - [`metrics`]: Prometheus counters
//!
//! # Example
//!
//! ```no_run
//! use canvas_camera::{CameraService, MockBackend, OutputConfig};
//! use serde_json::json;
//!
//! let backend = MockBackend::new();
//! let control = backend.control();
//! let service = CameraService::new(backend, &OutputConfig::default()).unwrap();
//!
//! let stream = service
//!     .start_capture(&json!({ "width": 352, "height": 288, "hasThumbnail": true }))
//!     .unwrap();
//!
//! control.emit_frame();
//! let result = stream.recv().unwrap();
//! println!("{}", result.to_json());
//!
//! service.stop_capture().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod codec;
pub mod metrics;
pub mod negotiation;
pub mod output;
pub mod session;
pub mod transform;

// Re-export commonly used types at crate root
pub use capture::{
    CameraBackend, CameraDevice, CaptureConfiguration, Facing, FileConfig, FrameBuffer,
    MockBackend, OutputConfig, OutputMode, PixelFormat,
};
pub use codec::CropRegion;
pub use negotiation::{negotiate, DeviceOrientation, DisplayRotation, NegotiatedParameters};
pub use output::{OutputSink, ResultPayload};
pub use session::{CameraService, CaptureStream, CommandFailure, SessionError, SessionState};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
