//! Per-frame processing: encode, transform, emit.

use crate::capture::{CaptureConfiguration, Facing, FrameSnapshot, PreviewCallbacks};
use crate::codec::{self, CodecError, CropRegion};
use crate::negotiation::{DeviceOrientation, NegotiatedParameters};
use crate::output::{
    ArtifactKind, ArtifactMeta, ImagesPayload, OutputArtifact, OutputSink, SinkError,
};
use crate::transform::{self, TransformError};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

use super::SessionState;

/// Why a frame produced no result.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The buffer held no bytes.
    #[error("empty frame")]
    Empty,
    /// Encoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Scaling or rotation failed.
    #[error(transparent)]
    Transform(#[from] TransformError),
    /// The artifact could not be emitted.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Counters shared by the session, the workers and the metrics exporter.
#[derive(Debug, Default)]
pub struct PipelineStats {
    state: AtomicU8,
    frames_received: AtomicU64,
    frames_delivered: AtomicU64,
    frames_dropped: AtomicU64,
    artifacts_written: AtomicU64,
    write_failures: AtomicU64,
    restarts: AtomicU64,
    failed_restarts: AtomicU64,
}

macro_rules! counter {
    ($get:ident, $inc:ident, $field:ident) => {
        #[doc = concat!("Current `", stringify!($field), "` count.")]
        #[inline]
        pub fn $get(&self) -> u64 {
            self.$field.load(Ordering::Relaxed)
        }

        #[doc = concat!("Adds one to `", stringify!($field), "`.")]
        #[inline]
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl PipelineStats {
    /// All counters at zero, state `Idle`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last published session state.
    pub fn state(&self) -> SessionState {
        SessionState::from_code(self.state.load(Ordering::Relaxed))
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.store(state.code(), Ordering::Relaxed);
    }

    counter!(frames_received, record_received, frames_received);
    counter!(frames_delivered, record_delivered, frames_delivered);
    counter!(frames_dropped, record_dropped, frames_dropped);
    counter!(artifacts_written, record_artifact, artifacts_written);
    counter!(write_failures, record_write_failure, write_failures);
    counter!(restarts, record_restart, restarts);
    counter!(failed_restarts, record_failed_restart, failed_restarts);
}

/// Artifacts of one processed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFrame {
    /// Id shared by the frame's artifacts.
    pub frame_id: u64,
    /// Full size artifact.
    pub fullsize: OutputArtifact,
    /// Thumbnail, when enabled.
    pub thumbnail: Option<OutputArtifact>,
}

impl ProcessedFrame {
    /// Images section of the frame's result.
    pub fn images(&self) -> ImagesPayload {
        ImagesPayload {
            fullsize: Some(self.fullsize.to_payload()),
            thumbnail: self.thumbnail.as_ref().map(OutputArtifact::to_payload),
            orientation: None,
        }
    }
}

/// Immutable processing context of one session generation.
#[derive(Debug)]
pub struct FramePipeline {
    generation: u64,
    config: CaptureConfiguration,
    parameters: NegotiatedParameters,
    orientation: DeviceOrientation,
    sink: Arc<OutputSink>,
    stats: Arc<PipelineStats>,
}

/// Builds the hardware callbacks for a new preview.
pub type CallbackFactory = Arc<dyn Fn(Arc<FramePipeline>) -> PreviewCallbacks + Send + Sync>;

impl FramePipeline {
    /// Context for frames of `generation`.
    pub fn new(
        generation: u64,
        config: CaptureConfiguration,
        parameters: NegotiatedParameters,
        orientation: DeviceOrientation,
        sink: Arc<OutputSink>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            generation,
            config,
            parameters,
            orientation,
            sink,
            stats,
        }
    }

    /// Session generation the frames belong to.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Capture options of the session.
    #[inline]
    pub fn config(&self) -> &CaptureConfiguration {
        &self.config
    }

    /// Negotiated device parameters.
    #[inline]
    pub fn parameters(&self) -> &NegotiatedParameters {
        &self.parameters
    }

    /// Shared counters.
    #[inline]
    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    /// Turns one raw frame into its full-size and optional thumbnail
    /// artifacts.
    ///
    /// A failed thumbnail is logged and omitted; any other failure drops the
    /// frame.
    pub fn process(&self, snapshot: &FrameSnapshot) -> Result<ProcessedFrame, FrameError> {
        let started = Instant::now();
        let frame = snapshot.as_buffer();
        if frame.is_empty() {
            return Err(FrameError::Empty);
        }
        codec::check_format(&frame, self.parameters.preview_format)?;

        let jpeg = codec::encode(&frame, CropRegion::full(frame.width(), frame.height()))?;
        let fullsize_jpeg = transform::resize(
            &jpeg,
            clamp_target(self.config.canvas.width),
            clamp_target(self.config.canvas.height),
            self.parameters.display_orientation,
            self.config.camera_facing == Facing::Front,
        )?;

        let frame_id = self.sink.next_frame_id();
        let meta = ArtifactMeta {
            rotation: self.parameters.display_orientation,
            orientation: self.orientation,
            timestamp: snapshot.captured_at_ms(),
        };

        let fullsize = self
            .sink
            .emit(ArtifactKind::Fullsize, frame_id, &fullsize_jpeg, meta)
            .inspect_err(|_| self.stats.record_write_failure())?;
        self.stats.record_artifact();

        let thumbnail = if self.config.has_thumbnail {
            self.thumbnail(frame_id, &fullsize_jpeg, meta)
        } else {
            None
        };

        debug!(
            generation = self.generation,
            frame_id,
            elapsed_us = started.elapsed().as_micros() as u64,
            "Frame processed"
        );

        Ok(ProcessedFrame {
            frame_id,
            fullsize,
            thumbnail,
        })
    }

    fn thumbnail(&self, frame_id: u64, source: &[u8], meta: ArtifactMeta) -> Option<OutputArtifact> {
        let bytes = match transform::resize_by_ratio(source, self.config.thumbnail_ratio) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(frame_id, error = %e, "Thumbnail transform failed");
                return None;
            }
        };

        match self.sink.emit(ArtifactKind::Thumbnail, frame_id, &bytes, meta) {
            Ok(artifact) => {
                self.stats.record_artifact();
                Some(artifact)
            }
            Err(e) => {
                self.stats.record_write_failure();
                warn!(frame_id, error = %e, "Thumbnail artifact failed");
                None
            }
        }
    }
}

fn clamp_target(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
