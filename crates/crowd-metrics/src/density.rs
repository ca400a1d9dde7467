use serde::{Deserialize, Serialize};
use std::fmt;

/// Qualitative crowd density classification.
///
/// Thresholds are persons per square meter, inclusive lower bound:
/// `< 1` low, `< 2` medium, `< 3` high, anything above very high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl Tier {
    pub fn from_density(density: f64) -> Self {
        if density < 1.0 {
            Tier::Low
        } else if density < 2.0 {
            Tier::Medium
        } else if density < 3.0 {
            Tier::High
        } else {
            Tier::VeryHigh
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Low => "LOW",
            Tier::Medium => "MEDIUM",
            Tier::High => "HIGH",
            Tier::VeryHigh => "VERY_HIGH",
        }
    }

    /// Dashboard label used at the carnival deployments.
    pub fn label_es(&self) -> &'static str {
        match self {
            Tier::Low => "BAJA",
            Tier::Medium => "MEDIA",
            Tier::High => "ALTA",
            Tier::VeryHigh => "¡MUY ALTA!",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub density: f64,
    pub tier: Tier,
}

/// Persons per square meter for one frame.
///
/// Total: a non-positive (or NaN) area yields density 0 instead of failing.
pub fn estimate(person_count: usize, visible_area: f64) -> Estimate {
    let density = if visible_area > 0.0 {
        person_count as f64 / visible_area
    } else {
        0.0
    };
    Estimate { density, tier: Tier::from_density(density) }
}
