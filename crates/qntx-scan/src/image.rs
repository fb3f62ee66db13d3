//! Owned, contiguous images handed to the detector
//!
//! Pixel storage is reference counted. A detector that reads asynchronously
//! can keep an image alive past its call with [`OwnedImage::share`]; the
//! scratch pools see the extra reference and stop recycling that buffer.

use std::sync::Arc;

use crate::error::{FrameError, Result};

/// Pixel layout of an [`OwnedImage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelLayout {
    /// One luminance byte per pixel
    #[default]
    Luma8,
    /// One `0xAARRGGBB` word per pixel
    Argb32,
}

#[derive(Debug, Clone)]
pub(crate) enum Pixels {
    Luma(Arc<Vec<u8>>),
    Argb(Arc<Vec<u32>>),
}

/// An independently owned image with stride equal to width.
#[derive(Debug, Clone)]
pub struct OwnedImage {
    width: u32,
    height: u32,
    pixels: Pixels,
}

impl OwnedImage {
    /// Wrap an existing luminance buffer. `data.len()` must equal `width * height`.
    pub fn from_luma(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        check_len(width, height, data.len())?;
        Ok(Self::luma_unchecked(width, height, Arc::new(data)))
    }

    /// Wrap an existing packed ARGB buffer. `data.len()` must equal `width * height`.
    pub fn from_argb(width: u32, height: u32, data: Vec<u32>) -> Result<Self> {
        check_len(width, height, data.len())?;
        Ok(Self {
            width,
            height,
            pixels: Pixels::Argb(Arc::new(data)),
        })
    }

    pub(crate) fn luma_unchecked(width: u32, height: u32, data: Arc<Vec<u8>>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self {
            width,
            height,
            pixels: Pixels::Luma(data),
        }
    }

    pub(crate) fn argb_unchecked(width: u32, height: u32, data: Arc<Vec<u32>>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self {
            width,
            height,
            pixels: Pixels::Argb(data),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn layout(&self) -> PixelLayout {
        match self.pixels {
            Pixels::Luma(_) => PixelLayout::Luma8,
            Pixels::Argb(_) => PixelLayout::Argb32,
        }
    }

    /// Luminance bytes, for `Luma8` images
    pub fn luma(&self) -> Option<&[u8]> {
        match &self.pixels {
            Pixels::Luma(data) => Some(data.as_slice()),
            Pixels::Argb(_) => None,
        }
    }

    /// Packed words, for `Argb32` images
    pub fn argb(&self) -> Option<&[u32]> {
        match &self.pixels {
            Pixels::Argb(data) => Some(data.as_slice()),
            Pixels::Luma(_) => None,
        }
    }

    /// Luminance at (x, y) regardless of layout. Packed images are assumed
    /// gray, so the blue channel is returned.
    ///
    /// # Panics
    ///
    /// Panics if `x` or `y` is outside the image.
    pub fn luma_at(&self, x: u32, y: u32) -> u8 {
        let idx = y as usize * self.width as usize + x as usize;
        match &self.pixels {
            Pixels::Luma(data) => data[idx],
            Pixels::Argb(data) => (data[idx] & 0xff) as u8,
        }
    }

    /// Another handle to the same pixels. Use this to keep the buffer alive
    /// beyond a detector call; the owning pool will not recycle it meanwhile.
    pub fn share(&self) -> OwnedImage {
        self.clone()
    }

    /// True while more than one handle references these pixels
    pub fn is_shared(&self) -> bool {
        match &self.pixels {
            Pixels::Luma(data) => Arc::strong_count(data) > 1,
            Pixels::Argb(data) => Arc::strong_count(data) > 1,
        }
    }
}

fn check_len(width: u32, height: u32, len: usize) -> Result<()> {
    let expected = width as usize * height as usize;
    if len != expected {
        return Err(FrameError::UnsupportedFormat(format!(
            "buffer of {} pixels does not match {}x{}",
            len, width, height
        )));
    }
    Ok(())
}
