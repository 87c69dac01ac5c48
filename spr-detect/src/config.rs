//! Tunable parameters of a counting run.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image_proc::{CorrelationMethod, FilterChain};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Integration window must be at least 1")]
    ZeroWindow,
    #[error("Threshold must be a finite non-zero value, got {0}")]
    InvalidThreshold(f64),
    #[error("Occupancy fraction must lie in [0, 1), got {0}")]
    InvalidOccupancy(f64),
    #[error("Adaptive exponent must be finite, got {0}")]
    InvalidExponent(f64),
    #[error("Config file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Order in which overlapping candidates are arbitrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArbitrationOrder {
    /// Strongest peak first; independent of label numbering
    #[default]
    PeakMagnitude,
    /// Label order with the legacy blacklist/minor tie-breaks
    LabelScan,
}

/// Detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Integration window `k`: frames averaged before differencing
    pub integration_window: usize,
    /// Signed threshold as a fraction of the autocorrelation peak;
    /// positive searches adsorption, negative searches desorption
    pub threshold: f64,
    /// Exponent applied to the per-frame noise ratio when levelling the threshold
    pub adaptive_exponent: f64,
    /// Minimum separation `d` between distinct events (pixels and frames)
    pub min_distance: usize,
    /// First frame of the counting range
    pub start_frame: usize,
    /// End of the counting range (exclusive); `None` runs to the last frame
    pub stop_frame: Option<usize>,
    /// Fraction of full scale a differenced sample must exceed to seed a candidate
    pub occupancy_fraction: f64,
    /// Candidate arbitration policy
    pub arbitration: ArbitrationOrder,
    /// Correlation evaluation strategy
    pub correlation_method: CorrelationMethod,
    /// Filters applied to differenced frames before correlation and occupancy
    pub filters: FilterChain,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            integration_window: 2,
            threshold: 0.5,
            adaptive_exponent: 0.0,
            min_distance: 3,
            start_frame: 0,
            stop_frame: None,
            occupancy_fraction: 0.1,
            arbitration: ArbitrationOrder::PeakMagnitude,
            correlation_method: CorrelationMethod::Auto,
            filters: FilterChain::empty(),
        }
    }
}

impl DetectionConfig {
    /// Reject values no run could use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.integration_window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if !self.threshold.is_finite() || self.threshold == 0.0 {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }
        if !(0.0..1.0).contains(&self.occupancy_fraction) {
            return Err(ConfigError::InvalidOccupancy(self.occupancy_fraction));
        }
        if !self.adaptive_exponent.is_finite() {
            return Err(ConfigError::InvalidExponent(self.adaptive_exponent));
        }
        Ok(())
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file and validate
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        config.validate()?;
        Ok(config)
    }
}
