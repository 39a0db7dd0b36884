//! Raw preview frames delivered by the camera hardware.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Pixel layout of a raw preview frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    /// Y plane followed by interleaved V/U at quarter resolution.
    #[default]
    Nv21,
    /// Y plane followed by interleaved U/V at half horizontal resolution.
    Nv16,
    /// Y plane, then a V plane and a U plane, both at quarter resolution.
    Yv12,
    /// Packed 4:2:2, `Y0 U Y1 V`.
    Yuy2,
    /// Packed 8-bit RGB.
    Rgb24,
}

impl PixelFormat {
    /// Expected buffer length for a tightly packed frame, or `None` when the
    /// dimensions are not representable in this format.
    pub fn frame_len(self, width: u32, height: u32) -> Option<usize> {
        if width == 0 || height == 0 {
            return None;
        }
        let w = width as usize;
        let h = height as usize;
        let cw = w.div_ceil(2);
        let ch = h.div_ceil(2);

        match self {
            PixelFormat::Nv21 | PixelFormat::Yv12 => Some(w * h + 2 * cw * ch),
            PixelFormat::Nv16 => Some(w * h + 2 * cw * h),
            PixelFormat::Yuy2 => {
                if w % 2 != 0 {
                    return None;
                }
                Some(w * h * 2)
            }
            PixelFormat::Rgb24 => Some(w * h * 3),
        }
    }

    /// Name reported to the host in `preview.format`.
    pub fn label(self) -> &'static str {
        match self {
            PixelFormat::Nv21 => "NV21",
            PixelFormat::Nv16 => "NV16",
            PixelFormat::Yv12 => "YV12",
            PixelFormat::Yuy2 => "YUY2",
            PixelFormat::Rgb24 => "FLEX_RGB_888",
        }
    }
}

/// A raw frame borrowed from the hardware for one callback invocation.
///
/// The backing memory belongs to the camera and may be recycled as soon as
/// the callback returns. Use [`FrameBuffer::snapshot`] to hand the frame to
/// another thread.
#[derive(Clone, Copy)]
pub struct FrameBuffer<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl<'a> FrameBuffer<'a> {
    /// Wraps a borrowed buffer.
    pub fn new(data: &'a [u8], width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
        }
    }

    /// Returns the raw bytes.
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the pixel format tag.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Returns true when no bytes were delivered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Validates that the buffer size matches dimensions and format.
    pub fn is_valid(&self) -> bool {
        self.format.frame_len(self.width, self.height) == Some(self.data.len())
    }

    /// Copies the frame into an owned, read-only snapshot stamped with the
    /// current wall-clock time.
    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            data: self.data.to_vec(),
            width: self.width,
            height: self.height,
            format: self.format,
            captured_at_ms: Utc::now().timestamp_millis(),
        }
    }
}

impl std::fmt::Debug for FrameBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Owned copy of a preview frame, processed by exactly one worker and
/// dropped when processing ends.
#[derive(Clone)]
pub struct FrameSnapshot {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
    captured_at_ms: i64,
}

impl FrameSnapshot {
    /// Borrows the snapshot as a frame buffer.
    pub fn as_buffer(&self) -> FrameBuffer<'_> {
        FrameBuffer::new(&self.data, self.width, self.height, self.format)
    }

    /// Capture time in milliseconds since the Unix epoch.
    #[inline]
    pub fn captured_at_ms(&self) -> i64 {
        self.captured_at_ms
    }
}

impl std::fmt::Debug for FrameSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSnapshot")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .field("captured_at_ms", &self.captured_at_ms)
            .finish()
    }
}
