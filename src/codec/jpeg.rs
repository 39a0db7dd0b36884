//! JPEG compression of raw frames.

use super::{yuv, CodecError, CropRegion};
use crate::capture::FrameBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

/// Compression quality used for every preview frame.
pub const JPEG_QUALITY: u8 = 100;

/// Encodes the cropped region of a raw frame as a JPEG at [`JPEG_QUALITY`].
///
/// An empty frame encodes to an empty buffer.
pub fn encode(frame: &FrameBuffer<'_>, crop: CropRegion) -> Result<Vec<u8>, CodecError> {
    encode_with_quality(frame, crop, JPEG_QUALITY)
}

/// Encodes the cropped region of a raw frame with an explicit quality.
///
/// # Errors
///
/// Returns [`CodecError::InvalidInput`] when the buffer length does not
/// match the frame's dimensions and format, or when the crop region does not
/// lie inside the frame.
pub fn encode_with_quality(
    frame: &FrameBuffer<'_>,
    crop: CropRegion,
    quality: u8,
) -> Result<Vec<u8>, CodecError> {
    if frame.is_empty() {
        return Ok(Vec::new());
    }

    let expected = frame.format().frame_len(frame.width(), frame.height());
    if expected != Some(frame.data().len()) {
        return Err(CodecError::InvalidInput(format!(
            "{} frame {}x{} expects {} bytes, got {}",
            frame.format().label(),
            frame.width(),
            frame.height(),
            expected.map_or_else(|| "an unrepresentable number of".to_string(), |n| n.to_string()),
            frame.data().len()
        )));
    }

    if !crop.fits(frame.width(), frame.height()) {
        return Err(CodecError::InvalidInput(format!(
            "crop {}x{}+{}+{} outside frame {}x{}",
            crop.width,
            crop.height,
            crop.x,
            crop.y,
            frame.width(),
            frame.height()
        )));
    }

    let rgb = yuv::to_rgb(frame, &crop);

    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    encoder.encode(&rgb, crop.width, crop.height, ExtendedColorType::Rgb8)?;

    Ok(buffer)
}
