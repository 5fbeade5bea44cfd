//! Mapping raw readings onto named intensity bands.
//!
//! Rules, applied in order:
//! 1. The first band (in table order) whose inclusive `[min, max]` contains the value wins,
//!    so at a boundary shared by two bands the lower band is chosen.
//! 2. A value inside the table's overall span that falls in a gap between two bands
//!    (e.g. `200.5` between `[0, 200]` and `[201, 400]`) belongs to the lower neighbour.
//! 3. Values outside the span follow the table's [`OutOfRangePolicy`].

use serde::{Deserialize, Serialize};

use crate::error::{GaugeError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A named band of readings.
pub struct IntensityLevel {
    /// Inclusive lower bound
    pub min: f64,
    /// Inclusive upper bound
    pub max: f64,
    /// Display label
    pub label: String,
    /// Opaque asset identifier handed to the presentation layer
    pub asset: String,
}

impl IntensityLevel {
    pub fn new(min: f64, max: f64, label: impl Into<String>, asset: impl Into<String>) -> Self {
        IntensityLevel {
            min,
            max,
            label: label.into(),
            asset: asset.into(),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// What to do with readings below the first band or above the last one.
pub enum OutOfRangePolicy {
    /// Snap to the nearest end band
    #[default]
    Clamp,
    /// Report [`Classification::Unclassified`]
    Unclassified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Result of classifying one reading.
pub enum Classification {
    /// Index into the table's levels
    Level(usize),
    Unclassified,
}

/// An ordered, validated set of bands.
#[derive(Debug, Clone)]
pub struct LevelTable {
    levels: Vec<IntensityLevel>,
    policy: OutOfRangePolicy,
}

impl LevelTable {
    /// Build a table. Bands must be non-empty, finite, have `min <= max` and be sorted by `min`.
    pub fn new(levels: Vec<IntensityLevel>, policy: OutOfRangePolicy) -> Result<Self> {
        validate_levels(&levels)?;
        Ok(LevelTable { levels, policy })
    }

    pub fn levels(&self) -> &[IntensityLevel] {
        &self.levels
    }

    pub fn policy(&self) -> OutOfRangePolicy {
        self.policy
    }

    pub fn get(&self, classification: Classification) -> Option<&IntensityLevel> {
        match classification {
            Classification::Level(idx) => self.levels.get(idx),
            Classification::Unclassified => None,
        }
    }

    /// Classify a reading. Pure: equal inputs always give equal outputs.
    pub fn classify(&self, value: f64) -> Classification {
        if value.is_nan() {
            return Classification::Unclassified;
        }
        if let Some(idx) = self.levels.iter().position(|l| l.contains(value)) {
            return Classification::Level(idx);
        }

        let last = self.levels.len() - 1;
        if value < self.levels[0].min {
            return match self.policy {
                OutOfRangePolicy::Clamp => Classification::Level(0),
                OutOfRangePolicy::Unclassified => Classification::Unclassified,
            };
        }
        if value > self.span_max() {
            return match self.policy {
                OutOfRangePolicy::Clamp => Classification::Level(last),
                OutOfRangePolicy::Unclassified => Classification::Unclassified,
            };
        }

        // In a gap: the last band starting at or below the value
        let idx = self
            .levels
            .iter()
            .rposition(|l| l.min <= value)
            .unwrap_or(0);
        Classification::Level(idx)
    }

    fn span_max(&self) -> f64 {
        self.levels
            .iter()
            .map(|l| l.max)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

pub(crate) fn validate_levels(levels: &[IntensityLevel]) -> Result<()> {
    if levels.is_empty() {
        return Err(GaugeError::Config("at least one level is required".to_string()));
    }
    for level in levels {
        if !level.min.is_finite() || !level.max.is_finite() {
            return Err(GaugeError::Config(format!(
                "level {:?} has non-finite bounds",
                level.label
            )));
        }
        if level.min > level.max {
            return Err(GaugeError::Config(format!(
                "level {:?} has min {} greater than max {}",
                level.label, level.min, level.max
            )));
        }
    }
    if levels.windows(2).any(|w| w[0].min > w[1].min) {
        return Err(GaugeError::Config(
            "levels must be ordered by increasing min".to_string(),
        ));
    }
    Ok(())
}
