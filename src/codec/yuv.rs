//! Raw sensor layouts to packed RGB.
//!
//! All YUV layouts use BT.601 full-range coefficients, the same YCbCr
//! definition JPEG uses, so a frame round-trips through the encoder without
//! a range shift.

use super::CropRegion;
use crate::capture::{FrameBuffer, PixelFormat};

/// Converts the cropped region of `frame` to packed RGB (3 bytes per pixel).
///
/// The caller must have validated the buffer length and the crop bounds.
pub(crate) fn to_rgb(frame: &FrameBuffer<'_>, crop: &CropRegion) -> Vec<u8> {
    let data = frame.data();
    let w = frame.width() as usize;
    let h = frame.height() as usize;
    let cw = w.div_ceil(2);
    let ch = h.div_ceil(2);

    let mut rgb = Vec::with_capacity(crop.width as usize * crop.height as usize * 3);

    for y in crop.y as usize..(crop.y + crop.height) as usize {
        for x in crop.x as usize..(crop.x + crop.width) as usize {
            let pixel = match frame.format() {
                PixelFormat::Nv21 => {
                    let idx = w * h + (y / 2) * cw * 2 + (x / 2) * 2;
                    ycbcr_to_rgb(data[y * w + x], data[idx + 1], data[idx])
                }
                PixelFormat::Nv16 => {
                    let idx = w * h + y * cw * 2 + (x / 2) * 2;
                    ycbcr_to_rgb(data[y * w + x], data[idx], data[idx + 1])
                }
                PixelFormat::Yv12 => {
                    let idx = (y / 2) * cw + x / 2;
                    let v = data[w * h + idx];
                    let u = data[w * h + cw * ch + idx];
                    ycbcr_to_rgb(data[y * w + x], u, v)
                }
                PixelFormat::Yuy2 => {
                    let base = y * w * 2 + (x / 2) * 4;
                    let luma = data[base + (x % 2) * 2];
                    ycbcr_to_rgb(luma, data[base + 1], data[base + 3])
                }
                PixelFormat::Rgb24 => {
                    let base = (y * w + x) * 3;
                    [data[base], data[base + 1], data[base + 2]]
                }
            };
            rgb.extend_from_slice(&pixel);
        }
    }

    rgb
}

#[inline]
fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = (y + 1.402 * v).round().clamp(0.0, 255.0) as u8;
    let g = (y - 0.344_136 * u - 0.714_136 * v).round().clamp(0.0, 255.0) as u8;
    let b = (y + 1.772 * u).round().clamp(0.0, 255.0) as u8;

    [r, g, b]
}
