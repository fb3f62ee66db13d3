//! Detector boundary
//!
//! The detector is an external capability: synchronous, single-frame, with
//! latency in the tens to hundreds of milliseconds. The engine never calls a
//! detector concurrently and never reuses an image buffer the detector may
//! still be reading.

use std::panic::{self, AssertUnwindSafe};

use crate::error::DetectorError;
use crate::image::{OwnedImage, PixelLayout};
use crate::types::{DetectionBatch, Rotation, Symbology};

/// How long a detector reads the image it is given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferConsumption {
    /// All reads complete before `detect` returns; buffers may be recycled
    /// as soon as the call is over.
    #[default]
    UntilReturn,
    /// The detector may keep reading after return (it holds a clone from
    /// [`OwnedImage::share`]). Buffers are never recycled under it.
    Deferred,
}

/// Setup record passed to detector constructors.
///
/// The allow-list is opaque to the engine; only detectors interpret it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorSetup {
    pub formats: Vec<Symbology>,
}

impl DetectorSetup {
    pub fn new(formats: Vec<Symbology>) -> Self {
        Self { formats }
    }

    /// True if `symbology` may be reported. An empty list allows everything.
    pub fn allows(&self, symbology: Symbology) -> bool {
        self.formats.is_empty() || self.formats.contains(&symbology)
    }
}

/// An external single-frame pattern detector.
pub trait Detector: Send {
    /// Detect patterns in `image`, whose content must be turned by
    /// `rotation` (clockwise) to appear upright.
    ///
    /// An empty batch is a normal outcome; errors are reserved for detector
    /// failures.
    fn detect(
        &mut self,
        image: &OwnedImage,
        rotation: Rotation,
    ) -> Result<DetectionBatch, DetectorError>;

    fn consumption(&self) -> BufferConsumption {
        BufferConsumption::UntilReturn
    }

    /// Pixel layout this detector consumes
    fn input_layout(&self) -> PixelLayout {
        PixelLayout::Luma8
    }

    fn name(&self) -> &str {
        "detector"
    }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(
        &mut self,
        image: &OwnedImage,
        rotation: Rotation,
    ) -> Result<DetectionBatch, DetectorError> {
        (**self).detect(image, rotation)
    }

    fn consumption(&self) -> BufferConsumption {
        (**self).consumption()
    }

    fn input_layout(&self) -> PixelLayout {
        (**self).input_layout()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Call the detector, turning a panic into a `DetectorError`.
pub(crate) fn detect_guarded<D: Detector + ?Sized>(
    detector: &mut D,
    image: &OwnedImage,
    rotation: Rotation,
) -> Result<DetectionBatch, DetectorError> {
    match panic::catch_unwind(AssertUnwindSafe(|| detector.detect(image, rotation))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(DetectorError::Panicked(message))
        }
    }
}

/// Map a point from buffer coordinates to upright coordinates, given the
/// clockwise rotation that makes the buffer upright.
pub fn to_upright(x: f32, y: f32, width: f32, height: f32, rotation: Rotation) -> (f32, f32) {
    match rotation {
        Rotation::Deg0 => (x, y),
        Rotation::Deg90 => (height - y, x),
        Rotation::Deg180 => (width - x, height - y),
        Rotation::Deg270 => (y, width - x),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Panicking;

    impl Detector for Panicking {
        fn detect(&mut self, _: &OwnedImage, _: Rotation) -> Result<DetectionBatch, DetectorError> {
            panic!("decoder blew up");
        }
    }

    #[test]
    fn test_setup_allow_list() {
        assert!(DetectorSetup::default().allows(Symbology::Aztec));
        let setup = DetectorSetup::new(vec![Symbology::QrCode]);
        assert!(setup.allows(Symbology::QrCode));
        assert!(!setup.allows(Symbology::Aztec));
    }

    #[test]
    fn test_panic_becomes_detector_error() {
        let image = OwnedImage::from_luma(1, 1, vec![0]).unwrap();
        let result = detect_guarded(&mut Panicking, &image, Rotation::Deg0);
        match result {
            Err(DetectorError::Panicked(msg)) => assert_eq!(msg, "decoder blew up"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_boxed_detector_forwards() {
        let mut boxed: Box<dyn Detector> = Box::new(Panicking);
        assert_eq!(boxed.name(), "detector");
        assert_eq!(boxed.consumption(), BufferConsumption::UntilReturn);
        let image = OwnedImage::from_luma(1, 1, vec![0]).unwrap();
        assert!(detect_guarded(&mut boxed, &image, Rotation::Deg0).is_err());
    }

    #[test]
    fn test_to_upright() {
        // 4x2 buffer; the top-right corner of the buffer
        assert_eq!(to_upright(4.0, 0.0, 4.0, 2.0, Rotation::Deg0), (4.0, 0.0));
        assert_eq!(to_upright(4.0, 0.0, 4.0, 2.0, Rotation::Deg90), (2.0, 4.0));
        assert_eq!(to_upright(4.0, 0.0, 4.0, 2.0, Rotation::Deg180), (0.0, 2.0));
        assert_eq!(to_upright(4.0, 0.0, 4.0, 2.0, Rotation::Deg270), (0.0, 0.0));
    }
}
