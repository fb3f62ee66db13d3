//! Shared test helpers: a scripted detector with a call log

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use qntx_scan::{
    BufferConsumption, Detection, DetectionBatch, Detector, DetectorError, Geometry, OwnedImage,
    PixelLayout, Rotation, Symbology,
};

/// What the detector does on one call
#[derive(Debug, Clone)]
pub enum Response {
    Empty,
    Hit(&'static str),
    Fail,
    Panic,
}

/// One recorded detector call
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub rotation: Rotation,
    pub layout: PixelLayout,
    pub first_pixel: u8,
    pub width: u32,
    pub height: u32,
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// Detector that replays scripted responses and logs every call.
///
/// Once the script runs out, every further call returns an empty batch.
pub struct ScriptedDetector {
    script: VecDeque<Response>,
    log: CallLog,
    layout: PixelLayout,
    consumption: BufferConsumption,
    on_call: Option<Box<dyn FnMut() + Send>>,
    held: Arc<Mutex<Vec<OwnedImage>>>,
}

impl ScriptedDetector {
    pub fn new(script: impl IntoIterator<Item = Response>) -> (Self, CallLog) {
        let log = CallLog::default();
        let detector = Self {
            script: script.into_iter().collect(),
            log: Arc::clone(&log),
            layout: PixelLayout::Luma8,
            consumption: BufferConsumption::UntilReturn,
            on_call: None,
            held: Arc::default(),
        };
        (detector, log)
    }

    /// Always empty
    pub fn empty() -> (Self, CallLog) {
        Self::new([])
    }

    pub fn with_layout(mut self, layout: PixelLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Keep a handle to every image received, like a detector that
    /// finishes reading on another thread.
    pub fn deferred(mut self) -> (Self, Arc<Mutex<Vec<OwnedImage>>>) {
        self.consumption = BufferConsumption::Deferred;
        let held = Arc::clone(&self.held);
        (self, held)
    }

    /// Run `hook` at the start of every call
    pub fn on_call(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_call = Some(Box::new(hook));
        self
    }
}

impl Detector for ScriptedDetector {
    fn detect(
        &mut self,
        image: &OwnedImage,
        rotation: Rotation,
    ) -> Result<DetectionBatch, DetectorError> {
        if let Some(hook) = self.on_call.as_mut() {
            hook();
        }

        self.log.lock().push(Call {
            rotation,
            layout: image.layout(),
            first_pixel: image.luma_at(0, 0),
            width: image.width(),
            height: image.height(),
        });
        if self.consumption == BufferConsumption::Deferred {
            self.held.lock().push(image.share());
        }

        match self.script.pop_front().unwrap_or(Response::Empty) {
            Response::Empty => Ok(Vec::new()),
            Response::Hit(text) => Ok(vec![Detection::new(
                Symbology::QrCode,
                text,
                Geometry::from_rect(0.0, 0.0, 10.0, 10.0),
            )]),
            Response::Fail => Err(DetectorError::Failed("scripted failure".to_string())),
            Response::Panic => panic!("scripted panic"),
        }
    }

    fn consumption(&self) -> BufferConsumption {
        self.consumption
    }

    fn input_layout(&self) -> PixelLayout {
        self.layout
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Rotations of every logged call, in order
pub fn rotations(log: &CallLog) -> Vec<Rotation> {
    log.lock().iter().map(|c| c.rotation).collect()
}

/// First-pixel luminance of every logged call, in order
pub fn first_pixels(log: &CallLog) -> Vec<u8> {
    log.lock().iter().map(|c| c.first_pixel).collect()
}

/// Gray frame data filled with `value`, with `padding` extra bytes per row
pub fn gray_data(width: usize, height: usize, padding: usize, value: u8) -> Vec<u8> {
    vec![value; (width + padding) * height]
}
