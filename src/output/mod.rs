//! Delivery of encoded frames to the host.
//!
//! [`OutputSink`] turns JPEG bytes into data URIs or cached files,
//! [`FileRing`] bounds the on-disk cache, and the payload types shape the
//! JSON messages sent on result channels.

mod files;
mod payload;
mod sink;

pub use files::{FileRing, FILENAME_SUFFIX};
pub use payload::{
    CameraPayload, FpsPayload, ImagePayload, ImagesPayload, OptionsPayload, OutputPayload,
    PreviewPayload, ResultPayload, SizePayload,
};
pub use sink::{to_data_uri, ArtifactKind, ArtifactMeta, Emission, OutputArtifact, OutputSink};

use std::path::PathBuf;
use thiserror::Error;

/// Per-artifact output failures. Never fatal to a session.
#[derive(Debug, Error)]
pub enum SinkError {
    /// A cache file or directory operation failed.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// OS error.
        #[source]
        source: std::io::Error,
    },
    /// The encoder produced no bytes.
    #[error("refusing to emit an empty artifact")]
    EmptyArtifact,
}
