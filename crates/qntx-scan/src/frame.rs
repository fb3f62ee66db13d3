//! Borrowed camera frames
//!
//! A [`RawFrame`] is a view into a buffer owned by the frame source. It lives
//! for one callback and carries a [`FrameLease`]; releasing the lease hands
//! the buffer back to the source's pool.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::Rotation;

/// Pixel formats a frame source may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUV 4:2:0, planar or semi-planar. Luminance in plane 0.
    Yuv420,
    /// Grayscale 8-bit
    Gray8,
    /// RGBA with 8 bits per channel (32 bits per pixel)
    Rgba8,
    /// BGRA with 8 bits per channel (common on mobile surfaces)
    Bgra8,
    /// RGB with 8 bits per channel (24 bits per pixel)
    Rgb8,
    /// BGR with 8 bits per channel (OpenCV default)
    Bgr8,
    /// Vendor-specific format, identified by its fourcc/platform code
    Other(u32),
}

/// Packed pixel formats the cloner can extract luminance from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackedFormat {
    Rgba,
    Bgra,
    Rgb,
    Bgr,
}

impl PackedFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba | Self::Bgra => 4,
            Self::Rgb | Self::Bgr => 3,
        }
    }

    /// Byte offsets of (red, green, blue) within one pixel
    pub fn rgb_offsets(self) -> (usize, usize, usize) {
        match self {
            Self::Rgba | Self::Rgb => (0, 1, 2),
            Self::Bgra | Self::Bgr => (2, 1, 0),
        }
    }
}

/// Memory layout of a frame, resolved once per frame from its declared
/// format and strides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLayout {
    /// Luminance rows are tightly packed (row stride == width, pixel stride == 1)
    Contiguous,
    /// Luminance with row padding and/or interleaved samples
    Strided { row_stride: usize, pixel_stride: usize },
    /// Packed color pixels in a single plane
    Packed { format: PackedFormat, row_stride: usize },
    /// Unrecognized format; plane 0 is read as luminance on a best-effort basis
    Unknown { row_stride: usize, pixel_stride: usize },
}

/// One plane of pixel data
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    /// Bytes between the starts of consecutive rows
    pub row_stride: usize,
    /// Bytes between consecutive samples in a row
    pub pixel_stride: usize,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /// Minimum number of bytes needed to read `width` x `height` samples,
    /// or `None` if the strides overflow.
    pub fn required_len(&self, width: usize, height: usize) -> Option<usize> {
        if width == 0 || height == 0 {
            return Some(0);
        }
        (height - 1)
            .checked_mul(self.row_stride)?
            .checked_add((width - 1).checked_mul(self.pixel_stride)?)?
            .checked_add(1)
    }
}

/// Access token for a source-owned buffer.
///
/// The source may attach a release hook (returning the buffer to its pool)
/// and a revocation flag it sets if it recycles the buffer early. Dropping the
/// lease releases it.
#[derive(Default)]
pub struct FrameLease<'a> {
    on_release: Option<Box<dyn FnOnce() + Send + 'a>>,
    revoked: Option<&'a AtomicBool>,
    released: bool,
}

impl<'a> FrameLease<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` when the lease is released
    pub fn on_release(mut self, hook: impl FnOnce() + Send + 'a) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    /// Treat the buffer as unreadable once `flag` is set
    pub fn revocable(mut self, flag: &'a AtomicBool) -> Self {
        self.revoked = Some(flag);
        self
    }

    pub fn is_readable(&self) -> bool {
        !self.released && !self.revoked.is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Release the buffer back to the source. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

impl Drop for FrameLease<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for FrameLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameLease")
            .field("readable", &self.is_readable())
            .field("released", &self.released)
            .finish()
    }
}

/// A frame delivered by the camera, borrowed for the span of one callback.
#[derive(Debug)]
pub struct RawFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Luminance plane, or the single plane of a packed format
    pub luma: Plane<'a>,
    /// Optional chroma planes (U, V); never read, luminance is sufficient
    pub chroma: [Option<Plane<'a>>; 2],
    /// Rotation reported by the camera, in degrees
    pub rotation_degrees: i32,
    lease: FrameLease<'a>,
}

impl<'a> RawFrame<'a> {
    /// A grayscale frame with the given row stride
    pub fn gray(data: &'a [u8], width: u32, height: u32, row_stride: usize) -> Self {
        Self::new(PixelFormat::Gray8, Plane::new(data, row_stride, 1), width, height)
    }

    /// A YUV 4:2:0 frame; chroma planes are optional
    pub fn yuv420(
        y: Plane<'a>,
        u: Option<Plane<'a>>,
        v: Option<Plane<'a>>,
        width: u32,
        height: u32,
    ) -> Self {
        let mut frame = Self::new(PixelFormat::Yuv420, y, width, height);
        frame.chroma = [u, v];
        frame
    }

    /// A packed color frame. `format` must be one of the packed formats.
    pub fn packed(
        data: &'a [u8],
        width: u32,
        height: u32,
        row_stride: usize,
        format: PixelFormat,
    ) -> Self {
        let pixel_stride = match format {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            _ => 1,
        };
        Self::new(format, Plane::new(data, row_stride, pixel_stride), width, height)
    }

    pub fn new(format: PixelFormat, luma: Plane<'a>, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format,
            luma,
            chroma: [None, None],
            rotation_degrees: 0,
            lease: FrameLease::new(),
        }
    }

    pub fn with_rotation(mut self, degrees: i32) -> Self {
        self.rotation_degrees = degrees;
        self
    }

    pub fn with_lease(mut self, lease: FrameLease<'a>) -> Self {
        self.lease = lease;
        self
    }

    /// Declared rotation, if it is a multiple of 90 degrees
    pub fn rotation(&self) -> Option<Rotation> {
        Rotation::from_degrees(self.rotation_degrees)
    }

    pub fn lease(&self) -> &FrameLease<'a> {
        &self.lease
    }

    /// Hand the buffer back to the source. Pixel data must not be read
    /// afterwards; the cloner reports `SourceUnavailable` if it is.
    pub fn release(&mut self) {
        self.lease.release();
    }

    /// Resolve the memory layout for this frame.
    pub fn layout(&self) -> FrameLayout {
        let Plane {
            row_stride,
            pixel_stride,
            ..
        } = self.luma;

        let packed = |format| FrameLayout::Packed { format, row_stride };
        match self.format {
            PixelFormat::Yuv420 | PixelFormat::Gray8 => {
                if pixel_stride == 1 && row_stride == self.width as usize {
                    FrameLayout::Contiguous
                } else {
                    FrameLayout::Strided {
                        row_stride,
                        pixel_stride,
                    }
                }
            }
            PixelFormat::Rgba8 => packed(PackedFormat::Rgba),
            PixelFormat::Bgra8 => packed(PackedFormat::Bgra),
            PixelFormat::Rgb8 => packed(PackedFormat::Rgb),
            PixelFormat::Bgr8 => packed(PackedFormat::Bgr),
            PixelFormat::Other(_) => FrameLayout::Unknown {
                row_stride,
                pixel_stride: pixel_stride.max(1),
            },
        }
    }
}
