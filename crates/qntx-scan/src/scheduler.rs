//! Variant retry state machine
//!
//! Walks a [`VariantPlan`] in order and stops at the first non-empty batch.
//! Detector errors count as empty for that variant. Derived images
//! (inverted, packed) are computed lazily, once per polarity per frame.

use std::time::Instant;

use tracing::{debug, error, trace};

use crate::detector::{detect_guarded, Detector};
use crate::error::{FrameError, Result};
use crate::image::{OwnedImage, PixelLayout};
use crate::inverter::LuminanceInverter;
use crate::plan::VariantPlan;
use crate::scratch::ScratchPolicy;
use crate::types::{DetectionBatch, Polarity, ProcessingStats, Variant};

/// Scheduler state for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Start,
    /// Calling the detector with the plan entry at this index
    TryingVariant(usize),
    /// The plan entry at this index returned detections
    Succeeded(usize),
    Exhausted,
}

/// Result of walking one frame's plan
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub detections: DetectionBatch,
    /// Variant that produced the detections
    pub variant: Option<Variant>,
    /// Detector calls made
    pub tried: u32,
    /// Detector calls that failed
    pub errors: u32,
}

impl ScanOutcome {
    pub fn is_success(&self) -> bool {
        self.variant.is_some()
    }
}

/// Drives detector calls for one frame at a time.
#[derive(Debug, Default)]
pub struct VariantScheduler {
    inverter: LuminanceInverter,
}

impl VariantScheduler {
    pub fn new(policy: ScratchPolicy) -> Self {
        Self {
            inverter: LuminanceInverter::new(policy),
        }
    }

    /// Walk `plan` against `detector` for `image`.
    ///
    /// Returns `Err` only when a derived image cannot be allocated; detector
    /// failures are logged and skipped.
    pub fn run<D: Detector + ?Sized>(
        &mut self,
        detector: &mut D,
        image: &OwnedImage,
        plan: &VariantPlan,
        stats: &mut ProcessingStats,
    ) -> Result<ScanOutcome> {
        let layout = detector.input_layout();
        let mut derived = DerivedImages::new(image, layout);
        let mut outcome = ScanOutcome::default();
        let mut state = ScanState::Start;

        loop {
            state = match state {
                ScanState::Start => ScanState::TryingVariant(0),
                ScanState::TryingVariant(i) => {
                    let Some(variant) = plan.get(i) else {
                        break;
                    };

                    let transform_start = Instant::now();
                    let input = derived.get(&mut self.inverter, variant.polarity)?;
                    stats.transform_us += transform_start.elapsed().as_micros() as u64;

                    let detect_start = Instant::now();
                    let result = detect_guarded(detector, input, variant.rotation);
                    stats.detect_us += detect_start.elapsed().as_micros() as u64;
                    outcome.tried += 1;

                    match result {
                        Ok(batch) if !batch.is_empty() => {
                            outcome.detections = batch;
                            ScanState::Succeeded(i)
                        }
                        Ok(_) => {
                            trace!(%variant, "No detections");
                            advance(i, plan)
                        }
                        Err(e) => {
                            outcome.errors += 1;
                            error!(
                                detector = detector.name(),
                                %variant,
                                "{}",
                                FrameError::Detector { variant, source: e }
                            );
                            advance(i, plan)
                        }
                    }
                }
                ScanState::Succeeded(i) => {
                    outcome.variant = plan.get(i);
                    debug!(
                        variant = %plan[i],
                        count = outcome.detections.len(),
                        tried = outcome.tried,
                        "Detected"
                    );
                    break;
                }
                ScanState::Exhausted => {
                    trace!(tried = outcome.tried, errors = outcome.errors, "Plan exhausted");
                    break;
                }
            };
        }

        Ok(outcome)
    }

    pub fn inverter(&self) -> &LuminanceInverter {
        &self.inverter
    }

    pub fn clear(&mut self) {
        self.inverter.clear();
    }

    #[cfg(test)]
    pub(crate) fn limit_scratch(&mut self, limit: Option<usize>) {
        self.inverter.limit_scratch(limit);
    }
}

fn advance(i: usize, plan: &VariantPlan) -> ScanState {
    if i + 1 < plan.len() {
        ScanState::TryingVariant(i + 1)
    } else {
        ScanState::Exhausted
    }
}

/// Images derived from the cloned frame, computed on first use.
///
/// At most one derived image is held at a time. Plans try every normal
/// variant before any inverted one, so each is still computed only once,
/// and the previous one is released before its scratch buffer is needed.
struct DerivedImages<'a> {
    source: &'a OwnedImage,
    layout: PixelLayout,
    current: Option<(Polarity, OwnedImage)>,
}

impl<'a> DerivedImages<'a> {
    fn new(source: &'a OwnedImage, layout: PixelLayout) -> Self {
        Self {
            source,
            layout,
            current: None,
        }
    }

    fn get(&mut self, inverter: &mut LuminanceInverter, polarity: Polarity) -> Result<&OwnedImage> {
        if polarity == Polarity::Normal && self.source.layout() == self.layout {
            return Ok(self.source);
        }

        let cached = matches!(&self.current, Some((p, _)) if *p == polarity);
        if !cached {
            self.current = None;
            let image = match (polarity, self.layout) {
                (Polarity::Normal, PixelLayout::Argb32) => inverter.pack_argb(self.source)?,
                (Polarity::Normal, PixelLayout::Luma8) => inverter.to_luma(self.source)?,
                (Polarity::Inverted, PixelLayout::Luma8) => inverter.invert(self.source)?,
                (Polarity::Inverted, PixelLayout::Argb32) => {
                    let inverted = inverter.invert(self.source)?;
                    inverter.pack_argb(&inverted)?
                }
            };
            self.current = Some((polarity, image));
        }

        match &self.current {
            Some((_, image)) => Ok(image),
            None => Ok(self.source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanOptions;
    use crate::error::DetectorError;
    use crate::types::{Detection, Geometry, Rotation, Symbology};

    /// Returns a detection for one specific variant, records every call.
    struct FindsAt {
        target: Option<Variant>,
        calls: Vec<Variant>,
        layout: PixelLayout,
        first_pixels: Vec<u8>,
    }

    impl FindsAt {
        fn new(target: Option<Variant>) -> Self {
            Self {
                target,
                calls: Vec::new(),
                layout: PixelLayout::Luma8,
                first_pixels: Vec::new(),
            }
        }
    }

    impl Detector for FindsAt {
        fn detect(
            &mut self,
            image: &OwnedImage,
            rotation: Rotation,
        ) -> std::result::Result<DetectionBatch, DetectorError> {
            let polarity = if image.luma_at(0, 0) == 255 {
                Polarity::Inverted
            } else {
                Polarity::Normal
            };
            let variant = Variant::new(rotation, polarity);
            self.calls.push(variant);
            self.first_pixels.push(image.luma_at(0, 0));
            assert_eq!(image.layout(), self.layout);

            if Some(variant) == self.target {
                Ok(vec![Detection::new(Symbology::QrCode, "hit", Geometry::default())])
            } else {
                Ok(Vec::new())
            }
        }

        fn input_layout(&self) -> PixelLayout {
            self.layout
        }
    }

    fn black(size: u32) -> OwnedImage {
        OwnedImage::from_luma(size, size, vec![0; (size * size) as usize]).unwrap()
    }

    #[test]
    fn test_first_variant_wins() {
        let mut detector = FindsAt::new(Some(Variant::new(Rotation::Deg0, Polarity::Normal)));
        let plan = VariantPlan::new(Rotation::Deg0, ScanOptions::all());
        let mut stats = ProcessingStats::default();

        let outcome = VariantScheduler::default()
            .run(&mut detector, &black(4), &plan, &mut stats)
            .unwrap();

        assert_eq!(outcome.tried, 1);
        assert_eq!(detector.calls.len(), 1);
        assert_eq!(outcome.variant, Some(plan[0]));
        assert_eq!(outcome.detections.len(), 1);
    }

    #[test]
    fn test_stops_at_inverted_base() {
        let target = Variant::new(Rotation::Deg90, Polarity::Inverted);
        let mut detector = FindsAt::new(Some(target));
        let plan = VariantPlan::new(Rotation::Deg90, ScanOptions::all());
        let mut stats = ProcessingStats::default();

        let outcome = VariantScheduler::default()
            .run(&mut detector, &black(4), &plan, &mut stats)
            .unwrap();

        assert_eq!(detector.calls, plan.as_slice()[..3].to_vec());
        assert_eq!(outcome.variant, Some(target));
    }

    #[test]
    fn test_exhausted_plan_calls_each_variant_once() {
        let mut detector = FindsAt::new(None);
        let plan = VariantPlan::new(Rotation::Deg180, ScanOptions::all());
        let mut stats = ProcessingStats::default();

        let outcome = VariantScheduler::default()
            .run(&mut detector, &black(4), &plan, &mut stats)
            .unwrap();

        assert!(!outcome.is_success());
        assert!(outcome.detections.is_empty());
        assert_eq!(outcome.tried, 4);
        assert_eq!(detector.calls, plan.as_slice().to_vec());
    }

    #[test]
    fn test_inverted_image_computed_once() {
        let mut detector = FindsAt::new(None);
        let plan = VariantPlan::new(Rotation::Deg0, ScanOptions::all());
        let mut scheduler = VariantScheduler::default();
        let mut stats = ProcessingStats::default();

        scheduler.run(&mut detector, &black(16), &plan, &mut stats).unwrap();
        // One allocation for the inverted buffer, none for the second inverted variant
        assert_eq!(scheduler.inverter().scratch().allocations(), 1);
        assert_eq!(detector.first_pixels, vec![0, 0, 255, 255]);
    }

    #[test]
    fn test_packed_layout_detector_gets_packed_images() {
        let mut detector = FindsAt::new(Some(Variant::new(Rotation::Deg0, Polarity::Inverted)));
        detector.layout = PixelLayout::Argb32;
        let plan = VariantPlan::new(Rotation::Deg0, ScanOptions::new(false, true));
        let mut stats = ProcessingStats::default();

        let outcome = VariantScheduler::default()
            .run(&mut detector, &black(4), &plan, &mut stats)
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(detector.first_pixels, vec![0, 255]);
    }

    struct Failing {
        calls: u32,
    }

    impl Detector for Failing {
        fn detect(
            &mut self,
            _: &OwnedImage,
            _: Rotation,
        ) -> std::result::Result<DetectionBatch, DetectorError> {
            self.calls += 1;
            Err(DetectorError::Failed("model crashed".to_string()))
        }
    }

    #[test]
    fn test_failed_inverted_allocation_aborts_after_normal_variants() {
        let mut detector = FindsAt::new(None);
        let plan = VariantPlan::new(Rotation::Deg0, ScanOptions::all());
        let mut scheduler = VariantScheduler::default();
        scheduler.limit_scratch(Some(4));
        let mut stats = ProcessingStats::default();

        let err = scheduler
            .run(&mut detector, &black(4), &plan, &mut stats)
            .unwrap_err();

        assert!(matches!(err, FrameError::ScratchAllocation { requested: 16 }));
        assert_eq!(detector.calls, plan.as_slice()[..2].to_vec());
    }

    #[test]
    fn test_errors_continue_plan() {
        let mut detector = Failing { calls: 0 };
        let plan = VariantPlan::new(Rotation::Deg0, ScanOptions::all());
        let mut stats = ProcessingStats::default();

        let outcome = VariantScheduler::default()
            .run(&mut detector, &black(2), &plan, &mut stats)
            .unwrap();

        assert_eq!(detector.calls, 4);
        assert_eq!(outcome.errors, 4);
        assert!(outcome.detections.is_empty());
    }
}
