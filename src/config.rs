//! Static configuration: serial settings, device-matching tokens and level bands.
//!
//! Every field has a default, so a config file only needs the values it changes:
//!
//! ```toml
//! discovery_interval_ms = 1000
//! out_of_range = "unclassified"
//!
//! [matcher]
//! manufacturer_tokens = ["MicroPython"]
//!
//! [[levels]]
//! min = 0
//! max = 500
//! label = "Soft"
//! asset = "soft.png"
//!
//! [[levels]]
//! min = 501
//! max = 1023
//! label = "Hard"
//! asset = "hard.png"
//! ```

use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{GaugeError, Result};
use crate::level::{IntensityLevel, LevelTable, OutOfRangePolicy, validate_levels};

/// Baud rate the gauge firmware writes at.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Per-read timeout; also bounds how long a stop request waits while connected.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;

/// Fixed pause between discovery attempts while the device is absent.
pub const DEFAULT_DISCOVERY_INTERVAL_MS: u64 = 2_000;

/// Pause after a read that returned no data.
pub const DEFAULT_IDLE_YIELD_MS: u64 = 10;

/// Longest accepted protocol line. The firmware sends at most 4 digits.
pub const DEFAULT_MAX_LINE_LEN: usize = 64;

/// Queued notifications at which new samples start being dropped.
pub const DEFAULT_MAX_PENDING_SAMPLES: usize = 1_024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Tokens used to pick the gauge out of the attached serial ports.
pub struct MatcherConfig {
    /// Matched case-insensitively against the USB manufacturer string
    pub manufacturer_tokens: Vec<String>,
    /// Matched case-insensitively against the USB product description
    pub description_tokens: Vec<String>,
    /// Matched as substrings of the device path
    pub path_patterns: Vec<String>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig {
            manufacturer_tokens: vec!["MicroPython".to_string()],
            description_tokens: vec!["Board in FS mode".to_string(), "Pico".to_string()],
            path_patterns: vec!["usbmodem".to_string(), "ttyACM".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Everything the reader needs to find, read and classify the gauge.
pub struct GaugeConfig {
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub discovery_interval_ms: u64,
    pub idle_yield_ms: u64,
    pub max_line_len: usize,
    pub max_pending_samples: usize,
    pub matcher: MatcherConfig,
    pub levels: Vec<IntensityLevel>,
    pub out_of_range: OutOfRangePolicy,
}

impl Default for GaugeConfig {
    fn default() -> Self {
        GaugeConfig {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            discovery_interval_ms: DEFAULT_DISCOVERY_INTERVAL_MS,
            idle_yield_ms: DEFAULT_IDLE_YIELD_MS,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            max_pending_samples: DEFAULT_MAX_PENDING_SAMPLES,
            matcher: MatcherConfig::default(),
            levels: default_levels(),
            out_of_range: OutOfRangePolicy::default(),
        }
    }
}

/// The stress-ball bands the stock firmware's 0..=1023 scale was tuned for.
pub fn default_levels() -> Vec<IntensityLevel> {
    vec![
        IntensityLevel::new(0.0, 200.0, "Relaxed", "level0.png"),
        IntensityLevel::new(201.0, 400.0, "Light Pressure", "level1.png"),
        IntensityLevel::new(401.0, 600.0, "Medium Pressure", "level2.png"),
        IntensityLevel::new(601.0, 700.0, "Heavy Pressure", "level3.png"),
        IntensityLevel::new(701.0, 1000.0, "Maximum Squeeze!", "level4.png"),
    ]
}

impl GaugeConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: GaugeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GaugeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded gauge configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(GaugeError::Config("baud_rate must be non-zero".to_string()));
        }
        if self.discovery_interval_ms == 0 {
            return Err(GaugeError::Config(
                "discovery_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.max_line_len == 0 {
            return Err(GaugeError::Config("max_line_len must be non-zero".to_string()));
        }
        if self.max_pending_samples == 0 {
            return Err(GaugeError::Config(
                "max_pending_samples must be non-zero".to_string(),
            ));
        }
        validate_levels(&self.levels)
    }

    pub fn level_table(&self) -> Result<LevelTable> {
        LevelTable::new(self.levels.clone(), self.out_of_range)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    pub fn idle_yield(&self) -> Duration {
        Duration::from_millis(self.idle_yield_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = GaugeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.levels.len(), 5);
        assert_eq!(config.levels[4].label, "Maximum Squeeze!");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = GaugeConfig::from_toml_str(
            r#"
            discovery_interval_ms = 500
            out_of_range = "unclassified"

            [matcher]
            path_patterns = ["ttyUSB"]
            "#,
        )
        .unwrap();
        assert_eq!(config.discovery_interval(), Duration::from_millis(500));
        assert_eq!(config.out_of_range, OutOfRangePolicy::Unclassified);
        assert_eq!(config.matcher.path_patterns, vec!["ttyUSB".to_string()]);
        assert_eq!(config.matcher.manufacturer_tokens, vec!["MicroPython".to_string()]);
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.levels, default_levels());
    }

    #[test]
    fn test_levels_from_toml() {
        let config = GaugeConfig::from_toml_str(
            r#"
            [[levels]]
            min = 0
            max = 500
            label = "Soft"
            asset = "soft.png"

            [[levels]]
            min = 501
            max = 1023
            label = "Hard"
            asset = "hard.png"
            "#,
        )
        .unwrap();
        let table = config.level_table().unwrap();
        assert_eq!(table.levels().len(), 2);
        assert_eq!(table.levels()[1].max, 1023.0);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            GaugeConfig::from_toml_str("baud_rate = 0"),
            Err(GaugeError::Config(_))
        ));
        assert!(matches!(
            GaugeConfig::from_toml_str("max_pending_samples = 0"),
            Err(GaugeError::Config(_))
        ));
        assert!(matches!(
            GaugeConfig::from_toml_str("levels = []"),
            Err(GaugeError::Config(_))
        ));
        assert!(matches!(
            GaugeConfig::from_toml_str("baud_rate = \"fast\""),
            Err(GaugeError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "idle_yield_ms = 5").unwrap();
        let config = GaugeConfig::load(file.path()).unwrap();
        assert_eq!(config.idle_yield(), Duration::from_millis(5));

        assert!(GaugeConfig::load("/nonexistent/gauge.toml").is_err());
    }
}
