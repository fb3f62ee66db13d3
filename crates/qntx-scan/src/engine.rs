//! Scan engine
//!
//! Per-frame entry point. Admits at most one frame at a time, copies the
//! frame's luminance, hands the source buffer back, then walks the variant
//! plan against the detector. Nothing escapes `process_frame`: errors and
//! panics are logged and reported as an empty result.

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::cloner::FrameBufferCloner;
use crate::config::{ScanConfig, ScanOptions};
use crate::detector::{BufferConsumption, Detector};
use crate::error::{ConfigError, FrameError, Result};
use crate::frame::RawFrame;
use crate::gate::ConcurrencyGate;
use crate::plan::VariantPlan;
use crate::scheduler::{ScanOutcome, VariantScheduler};
use crate::scratch::ScratchPolicy;
use crate::tracing::prefix;
use crate::types::{DetectionBatch, ProcessingStats, Rotation, Variant};

/// How a frame left the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStatus {
    /// The plan ran; detections may still be empty
    Completed,
    /// Another frame was in flight
    Dropped,
    /// Processing stopped on an error before or during the plan
    Aborted,
}

/// Result of one `process_frame` call
#[derive(Debug, Clone, Serialize)]
pub struct FrameResult {
    pub status: FrameStatus,
    pub detections: DetectionBatch,
    /// Variant that produced the detections
    pub variant: Option<Variant>,
    pub stats: ProcessingStats,
}

impl FrameResult {
    fn empty(status: FrameStatus, stats: ProcessingStats) -> Self {
        Self {
            status,
            detections: Vec::new(),
            variant: None,
            stats,
        }
    }

    pub fn is_dropped(&self) -> bool {
        self.status == FrameStatus::Dropped
    }
}

/// Current scratch footprint of an engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScratchUsage {
    /// Cloned luminance buffer, bytes
    pub cloned: usize,
    /// Inverted luminance buffer, bytes
    pub inverted: usize,
    /// Packed output buffer, words
    pub packed: usize,
    /// Allocations made so far across all buffers
    pub allocations: u64,
}

/// State reachable only through the gate
struct EngineState<D> {
    detector: D,
    cloner: FrameBufferCloner,
    scheduler: VariantScheduler,
    frame_count: u64,
}

impl<D> EngineState<D> {
    fn usage(&self) -> ScratchUsage {
        let scratch = self.scheduler.inverter().scratch();
        ScratchUsage {
            cloned: self.cloner.capacity(),
            inverted: scratch.inverted_capacity(),
            packed: scratch.packed_capacity(),
            allocations: self.cloner.allocations() + scratch.allocations(),
        }
    }

    fn clear(&mut self) {
        self.cloner.clear();
        self.scheduler.clear();
    }
}

/// Thread-safe frame scanning engine.
///
/// `process_frame` may be called from any number of threads; frames arriving
/// while another is in flight are dropped.
pub struct ScanEngine<D: Detector> {
    config: ScanConfig,
    policy: ScratchPolicy,
    gate: ConcurrencyGate<EngineState<D>>,
}

impl<D: Detector> ScanEngine<D> {
    /// Create an engine around `detector`.
    ///
    /// Without an explicit `scratch_policy`, buffers are recycled for
    /// detectors that finish reading on return and allocated per call for
    /// deferred ones.
    pub fn new(config: ScanConfig, detector: D) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let consumption = detector.consumption();
        let policy = config.scratch_policy.unwrap_or(match consumption {
            BufferConsumption::UntilReturn => ScratchPolicy::Reuse,
            BufferConsumption::Deferred => ScratchPolicy::FreshPerCall,
        });

        info!(
            detector = detector.name(),
            ?consumption,
            ?policy,
            alternate_rotation = config.alternate_rotation,
            inverted_polarity = config.inverted_polarity,
            "{} Scan engine ready",
            prefix::PULSE_OPEN
        );

        Ok(Self {
            gate: ConcurrencyGate::new(EngineState {
                detector,
                cloner: FrameBufferCloner::new(policy),
                scheduler: VariantScheduler::new(policy),
                frame_count: 0,
            }),
            config,
            policy,
        })
    }

    /// Process one frame with the configured options
    pub fn scan(&self, frame: RawFrame<'_>) -> FrameResult {
        self.process_frame(frame, self.config.options())
    }

    /// Process one frame.
    ///
    /// The frame's lease is always released before this returns, and before
    /// the first detector call when the frame is admitted.
    pub fn process_frame(&self, mut frame: RawFrame<'_>, options: ScanOptions) -> FrameResult {
        let total_start = Instant::now();
        let mut stats = ProcessingStats {
            frame_width: frame.width,
            frame_height: frame.height,
            ..Default::default()
        };

        let Some(mut pass) = self.gate.try_enter() else {
            frame.release();
            trace!(
                width = frame.width,
                height = frame.height,
                "Frame dropped, previous frame in flight"
            );
            return FrameResult::empty(FrameStatus::Dropped, stats);
        };

        pass.frame_count += 1;
        let frame_id = pass.frame_count;

        let state = &mut *pass;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_admitted(state, &mut frame, options, &mut stats)
        }));
        frame.release();
        pass.exit();

        stats.total_us = total_start.elapsed().as_micros() as u64;
        match result {
            Ok(Ok(outcome)) => {
                debug!(
                    frame = frame_id,
                    found = outcome.detections.len(),
                    tried = outcome.tried,
                    total_us = stats.total_us,
                    "{} Frame scanned",
                    prefix::SCAN
                );
                FrameResult {
                    status: FrameStatus::Completed,
                    detections: outcome.detections,
                    variant: outcome.variant,
                    stats,
                }
            }
            Ok(Err(e)) => {
                match &e {
                    FrameError::SourceUnavailable(_)
                    | FrameError::UnsupportedFormat(_)
                    | FrameError::TooLarge { .. } => warn!(frame = frame_id, "{}", e),
                    FrameError::Detector { .. } | FrameError::ScratchAllocation { .. } => {
                        error!(frame = frame_id, "{}", e)
                    }
                }
                FrameResult::empty(FrameStatus::Aborted, stats)
            }
            Err(_) => {
                error!(frame = frame_id, "Frame processing panicked");
                FrameResult::empty(FrameStatus::Aborted, stats)
            }
        }
    }

    fn run_admitted(
        &self,
        state: &mut EngineState<D>,
        frame: &mut RawFrame<'_>,
        options: ScanOptions,
        stats: &mut ProcessingStats,
    ) -> Result<ScanOutcome> {
        let pixels = frame.width as u64 * frame.height as u64;
        if pixels > self.config.max_frame_pixels {
            return Err(FrameError::TooLarge {
                pixels,
                limit: self.config.max_frame_pixels,
            });
        }

        let clone_start = Instant::now();
        let image = state.cloner.clone_frame(frame)?;
        frame.release();
        stats.clone_us = clone_start.elapsed().as_micros() as u64;

        let base = frame.rotation().unwrap_or_else(|| {
            warn!(
                degrees = frame.rotation_degrees,
                "Rotation is not a multiple of 90, assuming 0°"
            );
            Rotation::Deg0
        });

        let plan = VariantPlan::new(base, options);
        stats.variants_planned = plan.len() as u32;

        let EngineState {
            detector,
            scheduler,
            ..
        } = state;
        let outcome = scheduler.run(detector, &image, &plan, stats)?;
        stats.variants_tried = outcome.tried;
        stats.detector_errors = outcome.errors;
        Ok(outcome)
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scratch policy in effect
    pub fn scratch_policy(&self) -> ScratchPolicy {
        self.policy
    }

    /// Frames admitted so far
    pub fn admitted(&self) -> u64 {
        self.gate.admitted()
    }

    /// Frames dropped because another was in flight
    pub fn dropped(&self) -> u64 {
        self.gate.dropped()
    }

    /// True while a frame is being processed
    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    pub fn scratch_usage(&mut self) -> ScratchUsage {
        self.gate.get_mut().usage()
    }

    /// Drop scratch contents, keeping capacity
    pub fn clear_scratch(&mut self) {
        self.gate.get_mut().clear();
    }

    pub fn detector(&mut self) -> &mut D {
        &mut self.gate.get_mut().detector
    }
}

impl<D: Detector> Drop for ScanEngine<D> {
    fn drop(&mut self) {
        let dropped = self.gate.dropped();
        let state = self.gate.get_mut();
        state.clear();
        info!(
            frames = state.frame_count,
            dropped,
            "{} Scan engine closed",
            prefix::PULSE_CLOSE
        );
    }
}

#[cfg(feature = "qr")]
impl ScanEngine<crate::qr::QrDetector> {
    /// Engine with the built-in QR detector
    pub fn qr(config: ScanConfig) -> std::result::Result<Self, ConfigError> {
        let detector = crate::qr::QrDetector::new(&config.detector_setup())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Self::new(config, detector)
    }
}
