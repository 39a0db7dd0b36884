//! Decode, scale, orient and re-encode.

use super::dimensions::{calculate_aspect_ratio, image_dimensions, sample_size};
use super::TransformError;
use crate::codec::JPEG_QUALITY;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;
use tracing::trace;

/// Scales, mirrors and rotates an encoded image, returning a JPEG.
///
/// The output fits inside `target_width` x `target_height` with the source
/// aspect ratio preserved (see
/// [`calculate_aspect_ratio`](super::calculate_aspect_ratio)). Mirroring is
/// horizontal and applied before the clockwise rotation.
///
/// Empty input, or both targets `<= 0`, returns the input unchanged before
/// the angle is looked at.
///
/// # Errors
///
/// [`TransformError::UnsupportedAngle`] for angles that are not a multiple
/// of 90 once there is work to do, and decode/encode failures from the
/// image backend.
pub fn resize(
    image: &[u8],
    target_width: i32,
    target_height: i32,
    angle: u32,
    mirror: bool,
) -> Result<Vec<u8>, TransformError> {
    if image.is_empty() || (target_width <= 0 && target_height <= 0) {
        return Ok(image.to_vec());
    }

    let angle = normalize_angle(angle)?;

    let (orig_width, orig_height) = image_dimensions(image)?;
    let (width, height) =
        calculate_aspect_ratio(orig_width, orig_height, target_width, target_height);
    let sample = sample_size(orig_width, orig_height, width, height);

    trace!(
        from = %format!("{}x{}", orig_width, orig_height),
        to = %format!("{}x{}", width, height),
        sample,
        angle,
        mirror,
        "Resizing image"
    );

    let mut decoded = ImageReader::new(Cursor::new(image))
        .with_guessed_format()?
        .decode()?;

    if sample > 1 {
        decoded = decoded.thumbnail_exact(
            (orig_width / sample).max(1),
            (orig_height / sample).max(1),
        );
    }

    if decoded.width() != width || decoded.height() != height {
        decoded = decoded.resize_exact(width, height, FilterType::Triangle);
    }

    if mirror {
        decoded = decoded.fliph();
    }

    decoded = match angle {
        90 => decoded.rotate90(),
        180 => decoded.rotate180(),
        270 => decoded.rotate270(),
        _ => decoded,
    };

    encode_jpeg(&decoded)
}

/// Scales an encoded image by `ratio` in both axes, truncating each side.
///
/// Never mirrors or rotates. A ratio that would reduce either side to zero
/// returns the input unchanged.
pub fn resize_by_ratio(image: &[u8], ratio: f64) -> Result<Vec<u8>, TransformError> {
    if image.is_empty() {
        return Ok(Vec::new());
    }

    let (width, height) = image_dimensions(image)?;
    let target_width = (width as f64 * ratio) as i64;
    let target_height = (height as f64 * ratio) as i64;

    if target_width <= 0 || target_height <= 0 {
        return Ok(image.to_vec());
    }

    resize(
        image,
        target_width.min(i32::MAX as i64) as i32,
        target_height.min(i32::MAX as i64) as i32,
        0,
        false,
    )
}

fn normalize_angle(angle: u32) -> Result<u32, TransformError> {
    match angle % 360 {
        a @ (0 | 90 | 180 | 270) => Ok(a),
        _ => Err(TransformError::UnsupportedAngle(angle)),
    }
}

fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, TransformError> {
    let rgb = image.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY).encode_image(&rgb)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Left half red, right half blue.
    fn split_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        encode_jpeg(&DynamicImage::ImageRgb8(img)).unwrap()
    }

    fn decode(bytes: &[u8]) -> RgbImage {
        image::load_from_memory(bytes).unwrap().to_rgb8()
    }

    #[test]
    fn test_empty_input_is_identity() {
        assert!(resize(&[], 100, 100, 90, true).unwrap().is_empty());
        assert!(resize_by_ratio(&[], 0.5).unwrap().is_empty());
    }

    #[test]
    fn test_no_target_is_identity() {
        let src = split_jpeg(64, 48);
        assert_eq!(resize(&src, 0, 0, 0, false).unwrap(), src);
        assert_eq!(resize(&src, -1, 0, 0, true).unwrap(), src);
    }

    #[test]
    fn test_resize_fits_box() {
        let src = split_jpeg(640, 480);
        let out = resize(&src, 320, 320, 0, false).unwrap();
        assert_eq!(image_dimensions(&out).unwrap(), (320, 240));
    }

    #[test]
    fn test_large_downscale_uses_sampling() {
        let src = split_jpeg(1280, 960);
        let out = resize(&src, 160, 120, 0, false).unwrap();
        assert_eq!(image_dimensions(&out).unwrap(), (160, 120));
    }

    #[test]
    fn test_rotation_swaps_dimensions() {
        let src = split_jpeg(64, 48);
        let out = resize(&src, 64, 48, 90, false).unwrap();
        assert_eq!(image_dimensions(&out).unwrap(), (48, 64));

        let out = resize(&src, 64, 48, 180, false).unwrap();
        assert_eq!(image_dimensions(&out).unwrap(), (64, 48));
    }

    #[test]
    fn test_mirror_swaps_halves() {
        let src = split_jpeg(64, 48);
        let out = decode(&resize(&src, 64, 48, 0, true).unwrap());

        let left = out.get_pixel(4, 24);
        let right = out.get_pixel(60, 24);
        assert!(left[2] > 200 && left[0] < 60, "left should be blue: {:?}", left);
        assert!(right[0] > 200 && right[2] < 60, "right should be red: {:?}", right);
    }

    #[test]
    fn test_mirror_applies_before_rotation() {
        let src = split_jpeg(64, 48);
        // Mirrored: blue left. Rotated 90 clockwise: left edge becomes top.
        let out = decode(&resize(&src, 64, 48, 90, true).unwrap());
        let top = out.get_pixel(24, 4);
        let bottom = out.get_pixel(24, 60);
        assert!(top[2] > 200, "top should be blue: {:?}", top);
        assert!(bottom[0] > 200, "bottom should be red: {:?}", bottom);
    }

    #[test]
    fn test_unsupported_angle() {
        let src = split_jpeg(16, 16);
        assert!(matches!(
            resize(&src, 8, 8, 45, false),
            Err(TransformError::UnsupportedAngle(45))
        ));
        assert!(resize(&src, 8, 8, 450, false).is_ok());
    }

    #[test]
    fn test_identity_ignores_unsupported_angle() {
        assert_eq!(resize(&[], 100, 100, 45, false).unwrap(), Vec::<u8>::new());

        let src = split_jpeg(16, 16);
        assert_eq!(resize(&src, 0, 0, 45, false).unwrap(), src);
        assert_eq!(resize(&src, -5, 0, 135, true).unwrap(), src);
    }

    #[test]
    fn test_resize_by_ratio_truncates() {
        let src = split_jpeg(352, 288);
        let out = resize_by_ratio(&src, 0.5).unwrap();
        assert_eq!(image_dimensions(&out).unwrap(), (176, 144));

        // 58x48 box, height follows width: 58 * 288 / 352 = 47.
        let out = resize_by_ratio(&src, 1.0 / 6.0).unwrap();
        assert_eq!(image_dimensions(&out).unwrap(), (58, 47));
    }

    #[test]
    fn test_resize_by_tiny_ratio_is_identity() {
        let src = split_jpeg(16, 16);
        assert_eq!(resize_by_ratio(&src, 0.01).unwrap(), src);
    }
}
