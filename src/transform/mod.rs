//! Encoded image resizing, mirroring and rotation.
//!
//! Works on JPEG bytes produced by the [`codec`](crate::codec) and always
//! re-encodes at the codec's quality.

mod dimensions;
mod resize;

pub use dimensions::{calculate_aspect_ratio, image_dimensions, sample_size};
pub use resize::{resize, resize_by_ratio};

use thiserror::Error;

/// Transform failures. The caller drops the affected artifact.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Only quarter turns are supported.
    #[error("unsupported rotation angle: {0}")]
    UnsupportedAngle(u32),
    /// Decoding the source or encoding the result failed.
    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
    /// Format sniffing failed.
    #[error("failed to read image header: {0}")]
    Io(#[from] std::io::Error),
}
