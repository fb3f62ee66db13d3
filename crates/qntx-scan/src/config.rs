//! Scan configuration
//!
//! Hosts usually receive configuration as JSON; missing fields take the
//! defaults below.

use serde::{Deserialize, Serialize};

use crate::detector::DetectorSetup;
use crate::error::ConfigError;
use crate::scratch::ScratchPolicy;
use crate::types::Symbology;

/// Safety limit on frame size, in pixels
pub const MAX_FRAME_PIXELS: u64 = 100_000_000;

/// Per-frame policy flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Also try one quarter turn past the reported rotation
    #[serde(default)]
    pub alternate_rotation: bool,
    /// Also try tone-inverted luminance once normal polarity fails
    #[serde(default)]
    pub inverted_polarity: bool,
}

impl ScanOptions {
    pub const fn new(alternate_rotation: bool, inverted_polarity: bool) -> Self {
        Self {
            alternate_rotation,
            inverted_polarity,
        }
    }

    /// Every variant enabled
    pub const fn all() -> Self {
        Self::new(true, true)
    }
}

/// Configuration for a scan engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_alternate_rotation")]
    pub alternate_rotation: bool,
    #[serde(default)]
    pub inverted_polarity: bool,
    /// Pattern categories to recognize (empty = all). Passed through to the
    /// detector, not interpreted here.
    #[serde(default)]
    pub formats: Vec<Symbology>,
    /// Frames larger than this are rejected before any copy
    #[serde(default = "default_max_frame_pixels")]
    pub max_frame_pixels: u64,
    /// Scratch reuse policy. When unset it follows the detector: buffers are
    /// recycled for detectors that finish reading on return, and allocated
    /// per call for detectors that read later.
    #[serde(default)]
    pub scratch_policy: Option<ScratchPolicy>,
}

fn default_alternate_rotation() -> bool {
    true
}
fn default_max_frame_pixels() -> u64 {
    MAX_FRAME_PIXELS
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            alternate_rotation: default_alternate_rotation(),
            inverted_polarity: false,
            formats: Vec::new(),
            max_frame_pixels: default_max_frame_pixels(),
            scratch_policy: None,
        }
    }
}

impl ScanConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frame_pixels == 0 {
            return Err(ConfigError::Invalid(
                "max_frame_pixels must be greater than 0".to_string(),
            ));
        }
        if self.max_frame_pixels > MAX_FRAME_PIXELS {
            return Err(ConfigError::Invalid(format!(
                "max_frame_pixels must not exceed {}",
                MAX_FRAME_PIXELS
            )));
        }
        for (i, format) in self.formats.iter().enumerate() {
            if self.formats[..i].contains(format) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate format in allow-list: {:?}",
                    format
                )));
            }
        }
        Ok(())
    }

    /// Per-frame options derived from this configuration
    pub fn options(&self) -> ScanOptions {
        ScanOptions::new(self.alternate_rotation, self.inverted_polarity)
    }

    /// Setup record for constructing a detector
    pub fn detector_setup(&self) -> DetectorSetup {
        DetectorSetup::new(self.formats.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_json() {
        let config = ScanConfig::from_json("{}").unwrap();
        assert_eq!(config, ScanConfig::default());
        assert_eq!(config.options(), ScanOptions::new(true, false));
    }

    #[test]
    fn test_full_json() {
        let config = ScanConfig::from_json(
            r#"{
                "alternate_rotation": false,
                "inverted_polarity": true,
                "formats": ["qr_code", "ean13"],
                "max_frame_pixels": 2073600,
                "scratch_policy": "fresh_per_call"
            }"#,
        )
        .unwrap();

        assert_eq!(config.options(), ScanOptions::new(false, true));
        assert_eq!(config.formats, vec![Symbology::QrCode, Symbology::Ean13]);
        assert_eq!(config.scratch_policy, Some(ScratchPolicy::FreshPerCall));
        assert!(config.detector_setup().allows(Symbology::QrCode));
        assert!(!config.detector_setup().allows(Symbology::Code128));
    }

    #[test]
    fn test_invalid_limits() {
        let mut config = ScanConfig::default();
        config.max_frame_pixels = 0;
        assert!(config.validate().is_err());

        config.max_frame_pixels = MAX_FRAME_PIXELS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_formats_rejected() {
        let result = ScanConfig::from_json(r#"{"formats": ["qr_code", "qr_code"]}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_json() {
        let result = ScanConfig::from_json(r#"{"formats": "qr_code""#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
