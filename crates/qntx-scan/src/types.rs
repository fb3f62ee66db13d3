//! Core types for frame scanning
//!
//! Variants, detections and per-frame statistics shared by the cloner,
//! scheduler and detector boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Orientation of the pixel content relative to upright, in quarter turns.
///
/// Rotation is carried as metadata next to an image. No component rotates
/// pixels; the detector receives the rotation and interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    #[serde(rename = "0")]
    Deg0,
    #[serde(rename = "90")]
    Deg90,
    #[serde(rename = "180")]
    Deg180,
    #[serde(rename = "270")]
    Deg270,
}

impl Rotation {
    /// Parse a rotation in degrees. Negative and out-of-range multiples of 90
    /// are normalized; anything else is rejected.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// The rotation one quarter turn further (`+90 mod 360`).
    pub fn quarter_turn(self) -> Self {
        match self {
            Self::Deg0 => Self::Deg90,
            Self::Deg90 => Self::Deg180,
            Self::Deg180 => Self::Deg270,
            Self::Deg270 => Self::Deg0,
        }
    }

    /// True when upright width and height are swapped relative to the buffer.
    pub fn is_transposed(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Whether luminance is used as delivered or tone-inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    #[default]
    Normal,
    Inverted,
}

/// One detector attempt for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
    pub rotation: Rotation,
    pub polarity: Polarity,
}

impl Variant {
    pub const fn new(rotation: Rotation, polarity: Polarity) -> Self {
        Self { rotation, polarity }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let polarity = match self.polarity {
            Polarity::Normal => "normal",
            Polarity::Inverted => "inverted",
        };
        write!(f, "{}/{}", self.rotation, polarity)
    }
}

/// A point in upright frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Location of a detection.
///
/// Always carries the axis-aligned center and extent; detectors that report
/// a corner polygon also fill `corners` (clockwise from top-left).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub center: Point,
    pub width: f32,
    pub height: f32,
    pub corners: Option<[Point; 4]>,
}

impl Geometry {
    /// Geometry from a top-left corner and size
    pub fn from_rect(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            center: Point::new(x + width / 2.0, y + height / 2.0),
            width,
            height,
            corners: None,
        }
    }

    /// Geometry from a corner polygon; extent is the polygon's bounding box.
    pub fn from_corners(corners: [Point; 4]) -> Self {
        let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
        let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
        for p in &corners {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        Self {
            corners: Some(corners),
            ..Self::from_rect(min_x, min_y, max_x - min_x, max_y - min_y)
        }
    }
}

/// Pattern categories a detector may be restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbology {
    QrCode,
    Aztec,
    DataMatrix,
    Pdf417,
    Ean13,
    Ean8,
    UpcA,
    UpcE,
    Code39,
    Code93,
    Code128,
    Codabar,
    Itf,
    /// Recognized text (OCR)
    Text,
}

/// Type tag for a payload.
///
/// Only classifies; expanding structured payloads into fields is left to the
/// host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    #[default]
    Text,
    Url,
    Wifi,
    Contact,
    Calendar,
    Email,
    Phone,
    Sms,
    Geo,
}

const PAYLOAD_PREFIXES: &[(&str, PayloadKind)] = &[
    ("WIFI:", PayloadKind::Wifi),
    ("BEGIN:VCARD", PayloadKind::Contact),
    ("MECARD:", PayloadKind::Contact),
    ("BEGIN:VEVENT", PayloadKind::Calendar),
    ("BEGIN:VCALENDAR", PayloadKind::Calendar),
    ("MAILTO:", PayloadKind::Email),
    ("MATMSG:", PayloadKind::Email),
    ("TEL:", PayloadKind::Phone),
    ("SMSTO:", PayloadKind::Sms),
    ("SMS:", PayloadKind::Sms),
    ("GEO:", PayloadKind::Geo),
    ("HTTP://", PayloadKind::Url),
    ("HTTPS://", PayloadKind::Url),
];

impl PayloadKind {
    /// Classify a decoded payload by its well-known prefix (case-insensitive).
    pub fn classify(text: &str) -> Self {
        let head = text.trim_start();
        PAYLOAD_PREFIXES
            .iter()
            .find(|(prefix, _)| {
                head.len() >= prefix.len()
                    && head.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
            })
            .map(|(_, kind)| *kind)
            .unwrap_or(Self::Text)
    }

    pub fn is_structured(self) -> bool {
        self != Self::Text
    }
}

/// A single detection result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Raw payload bytes as decoded
    pub payload: Vec<u8>,
    /// Payload as text, if it is valid UTF-8
    pub text: Option<String>,
    pub kind: PayloadKind,
    pub symbology: Symbology,
    pub geometry: Geometry,
}

impl Detection {
    pub fn new(symbology: Symbology, text: impl Into<String>, geometry: Geometry) -> Self {
        let text = text.into();
        Self {
            payload: text.as_bytes().to_vec(),
            kind: PayloadKind::classify(&text),
            text: Some(text),
            symbology,
            geometry,
        }
    }

    /// Build from raw bytes; `text` is filled only for valid UTF-8.
    pub fn from_bytes(symbology: Symbology, payload: Vec<u8>, geometry: Geometry) -> Self {
        let text = String::from_utf8(payload.clone()).ok();
        let kind = text.as_deref().map(PayloadKind::classify).unwrap_or_default();
        Self {
            payload,
            text,
            kind,
            symbology,
            geometry,
        }
    }
}

/// Detections returned by one detector call; empty means "try the next variant".
pub type DetectionBatch = Vec<Detection>;

/// Processing statistics for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    /// Time spent copying pixels out of the source buffer (microseconds)
    pub clone_us: u64,
    /// Time spent computing inverted/packed variants (microseconds)
    pub transform_us: u64,
    /// Time spent inside the detector (microseconds)
    pub detect_us: u64,
    /// Total processing time (microseconds)
    pub total_us: u64,
    /// Frame width processed
    pub frame_width: u32,
    /// Frame height processed
    pub frame_height: u32,
    /// Variants in this frame's plan
    pub variants_planned: u32,
    /// Detector calls actually made
    pub variants_tried: u32,
    /// Detector calls that reported an error
    pub detector_errors: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(0), Some(Rotation::Deg0));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(45), None);
    }

    #[test]
    fn test_quarter_turn_wraps() {
        assert_eq!(Rotation::Deg270.quarter_turn(), Rotation::Deg0);
        assert_eq!(Rotation::Deg0.quarter_turn().degrees(), 90);
    }

    #[test]
    fn test_payload_classification() {
        assert_eq!(PayloadKind::classify("WIFI:S:home;T:WPA;P:x;;"), PayloadKind::Wifi);
        assert_eq!(PayloadKind::classify("https://example.com"), PayloadKind::Url);
        assert_eq!(PayloadKind::classify("begin:vcard\nFN:A"), PayloadKind::Contact);
        assert_eq!(PayloadKind::classify("hello"), PayloadKind::Text);
        assert_eq!(PayloadKind::classify("WI"), PayloadKind::Text);
        assert!(!PayloadKind::Text.is_structured());
    }

    #[test]
    fn test_geometry_from_corners() {
        let g = Geometry::from_corners([
            Point::new(10.0, 10.0),
            Point::new(30.0, 10.0),
            Point::new(30.0, 50.0),
            Point::new(10.0, 50.0),
        ]);
        assert_eq!(g.center, Point::new(20.0, 30.0));
        assert_eq!((g.width, g.height), (20.0, 40.0));
        assert!(g.corners.is_some());
    }

    #[test]
    fn test_detection_from_non_utf8_bytes() {
        let d = Detection::from_bytes(Symbology::QrCode, vec![0xff, 0xfe], Geometry::default());
        assert!(d.text.is_none());
        assert_eq!(d.kind, PayloadKind::Text);
    }

    #[test]
    fn test_variant_display() {
        let v = Variant::new(Rotation::Deg90, Polarity::Inverted);
        assert_eq!(v.to_string(), "90°/inverted");
    }
}
