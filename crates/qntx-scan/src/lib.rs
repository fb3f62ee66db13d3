//! QNTX Frame Scanning Library
//!
//! Feeds camera frames to a slow, single-frame pattern detector (QR codes,
//! barcodes, text) without stalling the camera or piling up work.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────┐   ┌────────┐   ┌───────────┐   ┌──────────┐
//! │ RawFrame │──▶│ Gate │──▶│ Cloner │──▶│ Scheduler │──▶│ Detector │
//! │ (leased) │   └──────┘   └────────┘   └───────────┘   └──────────┘
//! └──────────┘      │           │              │
//!               drop busy   release      ≤ 4 variants,
//!                 frames    lease        inverter on demand
//! ```
//!
//! - One frame in flight per engine; frames arriving meanwhile are dropped.
//! - The source buffer is released right after its luminance is copied,
//!   before the first detector call.
//! - Each frame tries up to four (rotation, polarity) variants in a fixed
//!   order and stops at the first non-empty result.
//! - Scratch buffers grow to the largest frame seen and are recycled only
//!   when no detector still holds them.
//!
//! ## Usage
//!
//! ```no_run
//! use qntx_scan::{RawFrame, ScanConfig, ScanEngine};
//!
//! let engine = ScanEngine::qr(ScanConfig::default()).unwrap();
//! let pixels = vec![0u8; 640 * 480];
//! let result = engine.scan(RawFrame::gray(&pixels, 640, 480, 640).with_rotation(90));
//! for detection in &result.detections {
//!     println!("{:?}", detection.text);
//! }
//! ```

pub mod cloner;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod frame;
pub mod gate;
pub mod image;
pub mod inverter;
pub mod plan;
#[cfg(feature = "qr")]
pub mod qr;
pub mod scheduler;
mod scratch;
pub mod tracing;
pub mod types;

// Re-export main types
pub use cloner::FrameBufferCloner;
pub use config::{ScanConfig, ScanOptions, MAX_FRAME_PIXELS};
pub use detector::{to_upright, BufferConsumption, Detector, DetectorSetup};
pub use engine::{FrameResult, FrameStatus, ScanEngine, ScratchUsage};
pub use error::{ConfigError, DetectorError, FrameError, Result};
pub use frame::{FrameLayout, FrameLease, PackedFormat, PixelFormat, Plane, RawFrame};
pub use gate::{ConcurrencyGate, GatePass};
pub use image::{OwnedImage, PixelLayout};
pub use inverter::{LuminanceInverter, ScratchBuffers};
pub use plan::{VariantPlan, MAX_VARIANTS};
#[cfg(feature = "qr")]
pub use qr::QrDetector;
pub use scheduler::{ScanOutcome, ScanState, VariantScheduler};
pub use scratch::ScratchPolicy;
pub use types::{
    Detection, DetectionBatch, Geometry, PayloadKind, Point, Polarity, ProcessingStats, Rotation,
    Symbology, Variant,
};
