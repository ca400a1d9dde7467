use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_VISIBLE_AREA: f64 = 30.0;
pub const DEFAULT_CONFIDENCE: f32 = 0.4;
pub const MIN_CONFIDENCE: f32 = 0.1;
pub const MAX_CONFIDENCE: f32 = 1.0;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("confidence_threshold {0} outside [0.1, 1.0]")]
    Confidence(f32),
}

/// Per-run measurement parameters. Fixed for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SessionConfig {
    /// Ground area covered by the camera, in m².
    #[serde(default = "default_visible_area")]
    pub visible_area: f64,
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,
}

fn default_visible_area() -> f64 {
    DEFAULT_VISIBLE_AREA
}

fn default_confidence() -> f32 {
    DEFAULT_CONFIDENCE
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            visible_area: DEFAULT_VISIBLE_AREA,
            confidence_threshold: DEFAULT_CONFIDENCE,
        }
    }
}

impl SessionConfig {
    /// Rejects out-of-range confidence. A non-positive area is accepted:
    /// density degrades to 0, see [`crate::doctor::check_session`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = self.confidence_threshold;
        if !(MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&c) {
            return Err(ConfigError::Confidence(c));
        }
        Ok(())
    }

    pub fn area_is_usable(&self) -> bool {
        self.visible_area > 0.0
    }
}
