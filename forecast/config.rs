//! Run configuration, read from an optional TOML file.
//!
//! Every field has a default so a config file only needs the keys it changes.
//! Command-line flags override whatever the file provides.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::estimate::DEFAULT_ALPHA;
use crate::rollout::{DEFAULT_YEARS_AHEAD, MAX_YEARS_AHEAD, YearlyChangeBounds};

/// What the feature loader does with a blank feature cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFeaturePolicy {
    /// Record a validation violation for the cell.
    #[default]
    Reject,
    /// Substitute zero, log a warning, and flag the field on the vector.
    FillZero,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    pub scores_path: PathBuf,
    pub features_path: PathBuf,
    pub model_path: PathBuf,
    /// Ridge penalty applied to every coefficient except the intercept.
    pub alpha: f64,
    pub missing_features: MissingFeaturePolicy,
    pub default_years_ahead: u32,
    pub max_years_ahead: u32,
    /// Per-step limits on forecast movement. Unlimited when absent.
    pub yearly_change_bounds: Option<YearlyChangeBounds>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            scores_path: PathBuf::from("data/igs_tracts.csv"),
            features_path: PathBuf::from("data/acs_tracts.csv"),
            model_path: PathBuf::from("model.toml"),
            alpha: DEFAULT_ALPHA,
            missing_features: MissingFeaturePolicy::Reject,
            default_years_ahead: DEFAULT_YEARS_AHEAD,
            max_years_ahead: MAX_YEARS_AHEAD,
            yearly_change_bounds: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML config file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("alpha must be a finite positive number, got {0}")]
    InvalidAlpha(f64),
    #[error(
        "default_years_ahead ({default}) must lie between 1 and max_years_ahead ({max}), and max_years_ahead may not exceed 15"
    )]
    InvalidHorizon { default: u32, max: u32 },
    #[error("yearly_change_bounds must be finite with min <= 0 <= max, got [{min}, {max}]")]
    InvalidChangeBounds { min: f64, max: f64 },
}

impl ForecastConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: ForecastConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(ConfigError::InvalidAlpha(self.alpha));
        }
        if self.default_years_ahead == 0
            || self.default_years_ahead > self.max_years_ahead
            || self.max_years_ahead > MAX_YEARS_AHEAD
        {
            return Err(ConfigError::InvalidHorizon {
                default: self.default_years_ahead,
                max: self.max_years_ahead,
            });
        }
        if let Some(bounds) = self.yearly_change_bounds {
            if !bounds.is_valid() {
                return Err(ConfigError::InvalidChangeBounds {
                    min: bounds.min,
                    max: bounds.max,
                });
            }
        }
        Ok(())
    }
}
