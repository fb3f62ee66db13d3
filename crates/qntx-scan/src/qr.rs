//! Built-in QR detector backed by rqrr
//!
//! rqrr finds grids in any orientation, so `rotation` is only used to map
//! corner positions into upright coordinates.

use tracing::debug;

use crate::detector::{to_upright, Detector, DetectorSetup};
use crate::error::DetectorError;
use crate::image::OwnedImage;
use crate::types::{Detection, DetectionBatch, Geometry, Point, Rotation, Symbology};

/// QR code detector over `Luma8` images
#[derive(Debug, Default)]
pub struct QrDetector {
    decoded: Vec<u8>,
}

impl QrDetector {
    /// Fails if the allow-list is non-empty and excludes QR codes.
    pub fn new(setup: &DetectorSetup) -> Result<Self, DetectorError> {
        if !setup.allows(Symbology::QrCode) {
            return Err(DetectorError::InvalidInput(format!(
                "allow-list {:?} excludes qr_code",
                setup.formats
            )));
        }
        Ok(Self::default())
    }
}

impl Detector for QrDetector {
    fn detect(
        &mut self,
        image: &OwnedImage,
        rotation: Rotation,
    ) -> Result<DetectionBatch, DetectorError> {
        let luma = image
            .luma()
            .ok_or_else(|| DetectorError::InvalidInput("expected Luma8 image".to_string()))?;

        let (width, height) = (image.width() as usize, image.height() as usize);
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| luma[y * width + x]);

        let (w, h) = (width as f32, height as f32);
        let mut batch = Vec::new();
        for grid in prepared.detect_grids() {
            self.decoded.clear();
            if let Err(e) = grid.decode_to(&mut self.decoded) {
                debug!(error = %e, "QR grid found but not decoded");
                continue;
            }

            let corners = grid.bounds.map(|p| {
                let (x, y) = to_upright(p.x as f32, p.y as f32, w, h, rotation);
                Point::new(x, y)
            });
            batch.push(Detection::from_bytes(
                Symbology::QrCode,
                self.decoded.clone(),
                Geometry::from_corners(corners),
            ));
        }

        Ok(batch)
    }

    fn name(&self) -> &str {
        "rqrr"
    }
}
