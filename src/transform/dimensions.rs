//! Target size arithmetic.

use super::TransformError;
use image::ImageReader;
use std::io::Cursor;

/// Reads the width and height of an encoded image without decoding pixels.
pub fn image_dimensions(image: &[u8]) -> Result<(u32, u32), TransformError> {
    let dimensions = ImageReader::new(Cursor::new(image))
        .with_guessed_format()?
        .into_dimensions()?;
    Ok(dimensions)
}

/// Computes the output size of a resize so the source fits the target box
/// without cropping or letterboxing.
///
/// - both targets `<= 0`: the source size
/// - one target positive: the other follows the source aspect ratio
/// - both positive: the overflowing dimension shrinks; when the source is
///   wider than the target box the height follows the width, when it is
///   narrower the width follows the height
///
/// Results are truncated and never smaller than one pixel.
pub fn calculate_aspect_ratio(
    orig_width: u32,
    orig_height: u32,
    target_width: i32,
    target_height: i32,
) -> (u32, u32) {
    if orig_width == 0 || orig_height == 0 {
        return (orig_width, orig_height);
    }

    let ow = orig_width as i64;
    let oh = orig_height as i64;
    let mut width = target_width as i64;
    let mut height = target_height as i64;

    if width <= 0 && height <= 0 {
        width = ow;
        height = oh;
    } else if width > 0 && height <= 0 {
        height = (width as f64 / ow as f64 * oh as f64) as i64;
    } else if width <= 0 && height > 0 {
        width = (height as f64 / oh as f64 * ow as f64) as i64;
    } else {
        let target_ratio = width as f64 / height as f64;
        let orig_ratio = ow as f64 / oh as f64;

        if orig_ratio > target_ratio {
            height = width * oh / ow;
        } else if orig_ratio < target_ratio {
            width = height * ow / oh;
        }
    }

    (width.clamp(1, u32::MAX as i64) as u32, height.clamp(1, u32::MAX as i64) as u32)
}

/// Power-of-two reduction applied before the precise scale.
///
/// Doubles while halving the source still leaves at least the target size
/// in both axes.
pub fn sample_size(orig_width: u32, orig_height: u32, width: u32, height: u32) -> u32 {
    let mut sample = 1;
    if width == 0 || height == 0 {
        return sample;
    }

    if orig_height > height || orig_width > width {
        let half_height = orig_height / 2;
        let half_width = orig_width / 2;

        while half_height / sample >= height && half_width / sample >= width {
            sample *= 2;
        }
    }

    sample
}
