//! Metrics collection and registry.

use crate::session::{PipelineStats, SessionState};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of session counters for a metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Current session state.
    pub state: SessionState,
    /// Frames handed over by the camera.
    pub frames_received: u64,
    /// Frames delivered to the host stream.
    pub frames_delivered: u64,
    /// Frames dropped by a full pool, a bad buffer or a stale session.
    pub frames_dropped: u64,
    /// Full-size and thumbnail artifacts produced.
    pub artifacts_written: u64,
    /// Artifacts that could not be written.
    pub write_failures: u64,
    /// Restarts attempted after hardware faults.
    pub restarts: u64,
    /// Fault restarts that failed.
    pub failed_restarts: u64,
}

impl MetricsSnapshot {
    /// Reads the current counters.
    pub fn from_stats(stats: &PipelineStats) -> Self {
        Self {
            state: stats.state(),
            frames_received: stats.frames_received(),
            frames_delivered: stats.frames_delivered(),
            frames_dropped: stats.frames_dropped(),
            artifacts_written: stats.artifacts_written(),
            write_failures: stats.write_failures(),
            restarts: stats.restarts(),
            failed_restarts: stats.failed_restarts(),
        }
    }
}

/// Prometheus registry for camera session monitoring.
pub struct MetricsRegistry {
    registry: Registry,

    session_state: IntGauge,
    previewing: IntGauge,

    frames_received: IntCounter,
    frames_delivered: IntCounter,
    frames_dropped: IntCounter,

    artifacts_written: IntCounter,
    write_failures: IntCounter,

    restarts: IntCounter,
    failed_restarts: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, MetricsError> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, MetricsError> {
    let gauge = IntGauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// Raises `counter` to `total`. Counters never go down.
fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

impl MetricsRegistry {
    /// Creates a registry with every session metric registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let session_state = gauge(
            &registry,
            "canvas_camera_session_state",
            "Session state (0=idle, 1=opening, 2=previewing, 3=stopping, 4=error)",
        )?;
        let previewing = gauge(
            &registry,
            "canvas_camera_previewing",
            "Whether a preview is running (1) or not (0)",
        )?;
        let frames_received = counter(
            &registry,
            "canvas_camera_frames_received_total",
            "Preview frames received from the camera",
        )?;
        let frames_delivered = counter(
            &registry,
            "canvas_camera_frames_delivered_total",
            "Frame results delivered to the host",
        )?;
        let frames_dropped = counter(
            &registry,
            "canvas_camera_frames_dropped_total",
            "Preview frames dropped before delivery",
        )?;
        let artifacts_written = counter(
            &registry,
            "canvas_camera_artifacts_written_total",
            "Full-size and thumbnail images produced",
        )?;
        let write_failures = counter(
            &registry,
            "canvas_camera_write_failures_total",
            "Images that could not be written",
        )?;
        let restarts = counter(
            &registry,
            "canvas_camera_restarts_total",
            "Restarts attempted after a hardware fault",
        )?;
        let failed_restarts = counter(
            &registry,
            "canvas_camera_failed_restarts_total",
            "Hardware fault restarts that failed",
        )?;

        Ok(Self {
            registry,
            session_state,
            previewing,
            frames_received,
            frames_delivered,
            frames_dropped,
            artifacts_written,
            write_failures,
            restarts,
            failed_restarts,
        })
    }

    /// Updates all metrics from a snapshot.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.session_state.set(i64::from(snapshot.state.code()));
        self.previewing
            .set(i64::from(snapshot.state == SessionState::Previewing));

        advance(&self.frames_received, snapshot.frames_received);
        advance(&self.frames_delivered, snapshot.frames_delivered);
        advance(&self.frames_dropped, snapshot.frames_dropped);
        advance(&self.artifacts_written, snapshot.artifacts_written);
        advance(&self.write_failures, snapshot.write_failures);
        advance(&self.restarts, snapshot.restarts);
        advance(&self.failed_restarts, snapshot.failed_restarts);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
