//! Copy luminance out of a source-owned frame
//!
//! The cloner exists so the frame source can get its buffer back before the
//! detector runs. Output is always contiguous luminance (stride == width);
//! rotation is not applied.

use tracing::{trace, warn};

use crate::error::{FrameError, Result};
use crate::frame::{FrameLayout, PackedFormat, Plane, RawFrame};
use crate::image::OwnedImage;
use crate::scratch::{Scratch, ScratchPolicy};

/// Bytes of a packed pixel holding color; alpha may be cut off in the last column.
const PACKED_COLOR_BYTES: usize = 3;

/// Extracts an [`OwnedImage`] from a [`RawFrame`], recycling its output
/// buffer across frames.
#[derive(Debug)]
pub struct FrameBufferCloner {
    output: Scratch<u8>,
}

impl Default for FrameBufferCloner {
    fn default() -> Self {
        Self::new(ScratchPolicy::Reuse)
    }
}

impl FrameBufferCloner {
    pub fn new(policy: ScratchPolicy) -> Self {
        Self {
            output: Scratch::new(policy),
        }
    }

    /// Copy the frame's luminance into an owned image.
    ///
    /// Fails with `SourceUnavailable` if the lease is no longer readable, the
    /// pixel stride is zero, the strides overflow, or the plane is shorter
    /// than its declared geometry. Unrecognized formats
    /// are read best-effort as luminance and logged, not rejected.
    pub fn clone_frame(&mut self, frame: &RawFrame<'_>) -> Result<OwnedImage> {
        if !frame.lease().is_readable() {
            return Err(FrameError::SourceUnavailable(
                "frame lease already released".to_string(),
            ));
        }

        let (width, height) = (frame.width as usize, frame.height as usize);
        if width == 0 || height == 0 {
            return Err(FrameError::SourceUnavailable(format!(
                "empty frame {}x{}",
                frame.width, frame.height
            )));
        }

        let layout = frame.layout();
        let plane = effective_plane(&frame.luma, layout);
        if plane.pixel_stride == 0 {
            return Err(FrameError::SourceUnavailable(format!(
                "zero pixel stride for {:?} frame",
                frame.format
            )));
        }

        let mut required = plane.required_len(width, height);
        if matches!(layout, FrameLayout::Packed { .. }) {
            // The last pixel needs its color bytes, not just the first one.
            required = required.and_then(|len| len.checked_add(PACKED_COLOR_BYTES - 1));
        }
        let Some(required) = required else {
            return Err(FrameError::SourceUnavailable(format!(
                "strides {}/{} overflow for {}x{}",
                plane.row_stride, plane.pixel_stride, width, height
            )));
        };
        if plane.data.len() < required {
            return Err(FrameError::SourceUnavailable(format!(
                "plane holds {} bytes, {}x{} needs {}",
                plane.data.len(),
                width,
                height,
                required
            )));
        }

        let out = self.output.acquire(width * height)?;
        match layout {
            FrameLayout::Contiguous => {
                out.extend_from_slice(&plane.data[..width * height]);
            }
            FrameLayout::Strided { .. } => copy_strided(&plane, width, height, out),
            FrameLayout::Packed { format, .. } => {
                copy_packed_luma(&plane, format, width, height, out)
            }
            FrameLayout::Unknown { .. } => {
                warn!(
                    format = ?frame.format,
                    width,
                    height,
                    "{}",
                    FrameError::UnsupportedFormat(format!(
                        "{:?}, reading plane 0 as luminance",
                        frame.format
                    ))
                );
                copy_strided(&plane, width, height, out);
            }
        }

        trace!(?layout, width, height, "Cloned frame luminance");
        Ok(OwnedImage::luma_unchecked(
            frame.width,
            frame.height,
            self.output.share(),
        ))
    }

    /// Current capacity of the recycled output buffer, in bytes
    pub fn capacity(&self) -> usize {
        self.output.capacity()
    }

    /// Number of output buffers allocated so far
    pub fn allocations(&self) -> u64 {
        self.output.allocations()
    }

    pub fn clear(&mut self) {
        self.output.clear();
    }
}

fn effective_plane<'a>(plane: &Plane<'a>, layout: FrameLayout) -> Plane<'a> {
    match layout {
        FrameLayout::Packed { format, row_stride } => {
            Plane::new(plane.data, row_stride, format.bytes_per_pixel())
        }
        FrameLayout::Unknown {
            row_stride,
            pixel_stride,
        } => Plane::new(plane.data, row_stride, pixel_stride),
        _ => *plane,
    }
}

/// Generic path: correct for any row and pixel stride.
fn copy_strided(plane: &Plane<'_>, width: usize, height: usize, out: &mut Vec<u8>) {
    for y in 0..height {
        let row = &plane.data[y * plane.row_stride..];
        if plane.pixel_stride == 1 {
            out.extend_from_slice(&row[..width]);
        } else {
            out.extend(row.iter().step_by(plane.pixel_stride).take(width).copied());
        }
    }
}

/// Integer BT.601 luma from packed color pixels.
fn copy_packed_luma(
    plane: &Plane<'_>,
    format: PackedFormat,
    width: usize,
    height: usize,
    out: &mut Vec<u8>,
) {
    let bpp = format.bytes_per_pixel();
    let (r, g, b) = format.rgb_offsets();
    for y in 0..height {
        let start = y * plane.row_stride;
        let row = &plane.data[start..start + (width - 1) * bpp + PACKED_COLOR_BYTES];
        out.extend(
            row.chunks(bpp)
                .take(width)
                .map(|px| luma_bt601(px[r], px[g], px[b])),
        );
    }
}

#[inline]
fn luma_bt601(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32 + 128) >> 8) as u8
}
