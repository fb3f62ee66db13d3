//! Tone inversion and packing with reusable scratch buffers
//!
//! After warm-up, neither operation allocates unless a frame is larger than
//! any seen before or the detector still holds the previous output.

use crate::error::Result;
use crate::image::OwnedImage;
use crate::scratch::{Scratch, ScratchPolicy};

/// The inverted-luminance and packed-output buffers owned by one engine.
#[derive(Debug)]
pub struct ScratchBuffers {
    inverted: Scratch<u8>,
    packed: Scratch<u32>,
}

impl ScratchBuffers {
    pub fn new(policy: ScratchPolicy) -> Self {
        Self {
            inverted: Scratch::new(policy),
            packed: Scratch::new(policy),
        }
    }

    /// Capacity of the inverted-luminance buffer, in bytes
    pub fn inverted_capacity(&self) -> usize {
        self.inverted.capacity()
    }

    /// Capacity of the packed-output buffer, in words
    pub fn packed_capacity(&self) -> usize {
        self.packed.capacity()
    }

    /// Number of allocations made so far, across both buffers
    pub fn allocations(&self) -> u64 {
        self.inverted.allocations() + self.packed.allocations()
    }

    /// Drop contents, keeping capacity
    pub fn clear(&mut self) {
        self.inverted.clear();
        self.packed.clear();
    }
}

impl Default for ScratchBuffers {
    fn default() -> Self {
        Self::new(ScratchPolicy::Reuse)
    }
}

/// Produces tone-inverted and packed variants of an image.
#[derive(Debug, Default)]
pub struct LuminanceInverter {
    scratch: ScratchBuffers,
}

impl LuminanceInverter {
    pub fn new(policy: ScratchPolicy) -> Self {
        Self {
            scratch: ScratchBuffers::new(policy),
        }
    }

    /// Replace every luminance value `v` with `255 - v`.
    ///
    /// The source is never modified. Packed sources are read through their
    /// luminance; the result is always `Luma8`.
    pub fn invert(&mut self, src: &OwnedImage) -> Result<OwnedImage> {
        let out = self.scratch.inverted.acquire(src.pixel_count())?;
        match src.luma() {
            Some(luma) => out.extend(luma.iter().map(|&v| 255 - v)),
            None => {
                let argb = src.argb().unwrap_or_default();
                out.extend(argb.iter().map(|&px| 255 - (px & 0xff) as u8));
            }
        }

        Ok(OwnedImage::luma_unchecked(
            src.width(),
            src.height(),
            self.scratch.inverted.share(),
        ))
    }

    /// Pack luminance into opaque gray `0xFFvvvvvv` words.
    pub fn pack_argb(&mut self, src: &OwnedImage) -> Result<OwnedImage> {
        let out = self.scratch.packed.acquire(src.pixel_count())?;
        match src.luma() {
            Some(luma) => out.extend(luma.iter().map(|&v| pack_gray(v))),
            None => out.extend_from_slice(src.argb().unwrap_or_default()),
        }

        Ok(OwnedImage::argb_unchecked(
            src.width(),
            src.height(),
            self.scratch.packed.share(),
        ))
    }

    /// Luminance copy of a packed image, written to the inverted-luminance
    /// buffer. `Luma8` sources are shared, not copied.
    pub fn to_luma(&mut self, src: &OwnedImage) -> Result<OwnedImage> {
        let Some(argb) = src.argb() else {
            return Ok(src.share());
        };

        let out = self.scratch.inverted.acquire(src.pixel_count())?;
        out.extend(argb.iter().map(|&px| (px & 0xff) as u8));
        Ok(OwnedImage::luma_unchecked(
            src.width(),
            src.height(),
            self.scratch.inverted.share(),
        ))
    }

    pub fn scratch(&self) -> &ScratchBuffers {
        &self.scratch
    }

    #[cfg(test)]
    pub(crate) fn limit_scratch(&mut self, limit: Option<usize>) {
        self.scratch.inverted.set_limit(limit);
        self.scratch.packed.set_limit(limit);
    }

    pub fn clear(&mut self) {
        self.scratch.clear();
    }
}

#[inline]
fn pack_gray(v: u8) -> u32 {
    let v = v as u32;
    0xff00_0000 | (v << 16) | (v << 8) | v
}
