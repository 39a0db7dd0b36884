//! Raw preview frame to JPEG conversion.
//!
//! The codec is pure: it holds no state, touches no hardware and produces
//! byte-identical output for identical input.

mod jpeg;
mod yuv;

pub use jpeg::{encode, encode_with_quality, JPEG_QUALITY};

use crate::capture::{FrameBuffer, PixelFormat};
use thiserror::Error;

/// Errors produced while encoding a raw frame. None of them are fatal to a
/// session; the frame is dropped.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Dimensions, format or buffer length do not fit together.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The JPEG encoder failed.
    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Region of a raw frame to encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Columns to keep.
    pub width: u32,
    /// Rows to keep.
    pub height: u32,
}

impl CropRegion {
    /// Builds a region.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole frame.
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// True when the region is non-empty and lies inside `width` x `height`.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|r| r <= width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= height)
    }
}

/// Rejects frames whose format differs from the negotiated preview format.
pub fn check_format(frame: &FrameBuffer<'_>, expected: PixelFormat) -> Result<(), CodecError> {
    if frame.format() == expected {
        return Ok(());
    }
    Err(CodecError::InvalidInput(format!(
        "frame format {} does not match preview format {}",
        frame.format().label(),
        expected.label()
    )))
}
