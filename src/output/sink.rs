//! Emission of encoded frames as data URIs or cached files.

use super::files::FileRing;
use super::payload::ImagePayload;
use super::SinkError;
use crate::capture::OutputMode;
use crate::negotiation::DeviceOrientation;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Which variant of a frame an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Image at capture size.
    Fullsize,
    /// Image scaled by the thumbnail ratio.
    Thumbnail,
}

impl ArtifactKind {
    /// File name prefix.
    pub fn prefix(self) -> char {
        match self {
            ArtifactKind::Fullsize => 'f',
            ArtifactKind::Thumbnail => 't',
        }
    }
}

/// How an artifact reaches the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Emission {
    /// `data:image/jpeg;base64,...`
    Data(String),
    /// Path of a cached JPEG.
    File(PathBuf),
}

/// One emitted image variant.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputArtifact {
    /// Which variant this is.
    pub kind: ArtifactKind,
    /// Data URI or file path.
    pub emission: Emission,
    /// Clockwise rotation applied, in degrees.
    pub rotation: u32,
    /// Device orientation at capture.
    pub orientation: DeviceOrientation,
    /// Capture time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl OutputArtifact {
    /// Host facing form.
    pub fn to_payload(&self) -> ImagePayload {
        ImagePayload {
            emission: self.emission.clone(),
            rotation: self.rotation,
            orientation: self.orientation.label(),
            timestamp: self.timestamp,
        }
    }
}

/// Placement metadata stamped on every artifact of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactMeta {
    /// Clockwise rotation applied, in degrees.
    pub rotation: u32,
    /// Device orientation at capture.
    pub orientation: DeviceOrientation,
    /// Capture time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Emits artifacts in exactly one [`OutputMode`]. Shared by all workers.
#[derive(Debug)]
pub struct OutputSink {
    mode: OutputMode,
    ring: Mutex<FileRing>,
}

impl OutputSink {
    /// Creates a sink whose file ring lives in `cache_dir` and keeps `fps`
    /// frames.
    pub fn new(mode: OutputMode, cache_dir: impl Into<PathBuf>, fps: u32) -> Result<Self, SinkError> {
        Ok(Self {
            mode,
            ring: Mutex::new(FileRing::new(cache_dir, fps)?),
        })
    }

    fn ring(&self) -> MutexGuard<'_, FileRing> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserves the id shared by the artifacts of the next frame.
    pub fn next_frame_id(&self) -> u64 {
        self.ring().advance()
    }

    /// Emits one artifact of frame `frame_id`.
    pub fn emit(
        &self,
        kind: ArtifactKind,
        frame_id: u64,
        bytes: &[u8],
        meta: ArtifactMeta,
    ) -> Result<OutputArtifact, SinkError> {
        if bytes.is_empty() {
            return Err(SinkError::EmptyArtifact);
        }

        let emission = match self.mode {
            OutputMode::Data => Emission::Data(to_data_uri(bytes)),
            OutputMode::File => Emission::File(self.ring().write(kind, frame_id, bytes)?),
        };

        Ok(OutputArtifact {
            kind,
            emission,
            rotation: meta.rotation,
            orientation: meta.orientation,
            timestamp: meta.timestamp,
        })
    }
}

/// Base64 data URI of a JPEG.
pub fn to_data_uri(jpeg: &[u8]) -> String {
    let mut uri = String::with_capacity(DATA_URI_PREFIX.len() + jpeg.len().div_ceil(3) * 4);
    uri.push_str(DATA_URI_PREFIX);
    STANDARD.encode_string(jpeg, &mut uri);
    uri
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta() -> ArtifactMeta {
        ArtifactMeta {
            rotation: 90,
            orientation: DeviceOrientation::Portrait,
            timestamp: 42,
        }
    }

    #[test]
    fn test_data_uri() {
        assert_eq!(to_data_uri(&[0xFF, 0xD8, 0xFF]), "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn test_data_mode_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let sink = OutputSink::new(OutputMode::Data, dir.path(), 30).unwrap();

        let id = sink.next_frame_id();
        let artifact = sink.emit(ArtifactKind::Fullsize, id, b"jpeg", meta()).unwrap();

        assert!(matches!(artifact.emission, Emission::Data(ref uri) if uri.starts_with(DATA_URI_PREFIX)));
        assert_eq!(artifact.rotation, 90);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_file_mode_writes_ring_path() {
        let dir = TempDir::new().unwrap();
        let sink = OutputSink::new(OutputMode::File, dir.path(), 30).unwrap();

        let id = sink.next_frame_id();
        let full = sink.emit(ArtifactKind::Fullsize, id, b"full", meta()).unwrap();
        let thumb = sink.emit(ArtifactKind::Thumbnail, id, b"thumb", meta()).unwrap();

        assert_eq!(full.emission, Emission::File(dir.path().join("f1-canvascamera.jpg")));
        assert_eq!(thumb.emission, Emission::File(dir.path().join("t1-canvascamera.jpg")));
        assert_eq!(std::fs::read(dir.path().join("t1-canvascamera.jpg")).unwrap(), b"thumb");
    }

    #[test]
    fn test_frame_ids_count_from_one() {
        let dir = TempDir::new().unwrap();
        let sink = OutputSink::new(OutputMode::File, dir.path(), 30).unwrap();
        assert_eq!(sink.next_frame_id(), 1);
        assert_eq!(sink.next_frame_id(), 2);

        let fresh = OutputSink::new(OutputMode::File, dir.path(), 30).unwrap();
        assert_eq!(fresh.next_frame_id(), 1);
    }

    #[test]
    fn test_out_of_order_frames_do_not_leak() {
        let dir = TempDir::new().unwrap();
        let sink = OutputSink::new(OutputMode::File, dir.path(), 1).unwrap();

        let first = sink.next_frame_id();
        let second = sink.next_frame_id();
        sink.emit(ArtifactKind::Fullsize, second, b"2", meta()).unwrap();
        sink.emit(ArtifactKind::Fullsize, first, b"1", meta()).unwrap();

        for _ in 0..5 {
            let id = sink.next_frame_id();
            sink.emit(ArtifactKind::Fullsize, id, b"n", meta()).unwrap();
        }

        assert!(!dir.path().join("f1-canvascamera.jpg").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_empty_artifact_rejected() {
        let dir = TempDir::new().unwrap();
        let sink = OutputSink::new(OutputMode::Data, dir.path(), 30).unwrap();
        assert!(matches!(
            sink.emit(ArtifactKind::Thumbnail, 1, &[], meta()),
            Err(SinkError::EmptyArtifact)
        ));
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let sink = OutputSink::new(OutputMode::File, dir.path().join("cache"), 30).unwrap();
        std::fs::remove_dir(dir.path().join("cache")).unwrap();

        let result = sink.emit(ArtifactKind::Fullsize, 1, b"x", meta());
        assert!(matches!(result, Err(SinkError::Io { .. })));
    }
}
