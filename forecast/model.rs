use crate::types::{FEATURE_COUNT, FeatureName};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

// --- Public Data Structures ---
// These structs define the public, human-readable format of the trained model
// when serialized to a TOML file.

/// Bumped whenever the on-disk layout changes incompatibly.
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Number of regression inputs: year, the features, and the current score.
pub const INPUT_WIDTH: usize = FEATURE_COUNT + 2;

/// Fitted coefficients, keyed by input name rather than position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCoefficients {
    pub intercept: f64,
    pub year: f64,
    pub current_score: f64,
    /// One coefficient per feature, keyed by its snake_case name.
    pub features: BTreeMap<String, f64>,
}

/// In-sample diagnostics recorded at fit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub n_examples: usize,
    pub n_tracts: usize,
    pub first_year: i32,
    pub last_year: i32,
    pub rmse: f64,
    /// Absent when every target was identical.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r_squared: Option<f64>,
}

/// The top-level, self-contained, trained model artifact.
/// This is the structure that gets saved to and loaded from a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub format_version: u32,
    /// Ridge penalty the coefficients were fitted with.
    pub alpha: f64,
    /// Feature columns in the order they were laid out at fit time.
    pub feature_names: Vec<String>,
    pub coefficients: ModelCoefficients,
    pub fit_summary: FitSummary,
}

/// Custom error type for model loading, saving, and prediction.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write model file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML model file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Model file has format version {found}, but this build reads version {expected}.")]
    UnsupportedFormatVersion { found: u32, expected: u32 },
    #[error("Model file names an unknown feature '{0}'.")]
    UnknownFeature(String),
    #[error("Model file lists feature '{0}' more than once.")]
    DuplicateFeature(String),
    #[error("Model file has no coefficient for feature '{0}'.")]
    MissingCoefficient(String),
    #[error("Coefficient '{0}' is not finite.")]
    NonFiniteCoefficient(String),
}

/// The coefficient vector laid out in design-row order, ready for dot products.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearWeights {
    pub intercept: f64,
    pub weights: Array1<f64>,
}

impl LinearWeights {
    pub fn predict(&self, row: ArrayView1<f64>) -> f64 {
        self.intercept + self.weights.dot(&row)
    }
}

/// Lays out one regression input: `[year, features..., current_score]`.
///
/// This order is the contract between fitting and inference.
pub fn design_row(year: f64, features: &[f64; FEATURE_COUNT], current_score: f64) -> Array1<f64> {
    let mut row = Array1::zeros(INPUT_WIDTH);
    row[0] = year;
    for (slot, &value) in row.iter_mut().skip(1).zip(features.iter()) {
        *slot = value;
    }
    row[INPUT_WIDTH - 1] = current_score;
    row
}

impl TrainedModel {
    /// Wraps a coefficient vector laid out like [`design_row`].
    pub fn from_fit(
        alpha: f64,
        intercept: f64,
        beta: ArrayView1<f64>,
        fit_summary: FitSummary,
    ) -> Self {
        let features = FeatureName::ALL
            .iter()
            .map(|name| (name.as_str().to_string(), beta[name.index() + 1]))
            .collect();
        Self {
            format_version: MODEL_FORMAT_VERSION,
            alpha,
            feature_names: FeatureName::ALL
                .iter()
                .map(|name| name.as_str().to_string())
                .collect(),
            coefficients: ModelCoefficients {
                intercept,
                year: beta[0],
                current_score: beta[INPUT_WIDTH - 1],
                features,
            },
            fit_summary,
        }
    }

    /// Checks that the artifact can reproduce inference exactly.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.format_version != MODEL_FORMAT_VERSION {
            return Err(ModelError::UnsupportedFormatVersion {
                found: self.format_version,
                expected: MODEL_FORMAT_VERSION,
            });
        }

        let mut seen = HashSet::new();
        for name in &self.feature_names {
            name.parse::<FeatureName>()
                .map_err(ModelError::UnknownFeature)?;
            if !seen.insert(name.as_str()) {
                return Err(ModelError::DuplicateFeature(name.clone()));
            }
        }
        for name in self.coefficients.features.keys() {
            name.parse::<FeatureName>()
                .map_err(ModelError::UnknownFeature)?;
        }
        for name in FeatureName::ALL {
            if !seen.contains(name.as_str()) {
                return Err(ModelError::MissingCoefficient(name.as_str().to_string()));
            }
        }

        let coefficients = &self.coefficients;
        let scalars = [
            ("intercept", coefficients.intercept),
            ("year", coefficients.year),
            ("current_score", coefficients.current_score),
        ];
        for (name, value) in scalars {
            if !value.is_finite() {
                return Err(ModelError::NonFiniteCoefficient(name.to_string()));
            }
        }
        for name in FeatureName::ALL {
            match coefficients.features.get(name.as_str()) {
                None => return Err(ModelError::MissingCoefficient(name.as_str().to_string())),
                Some(value) if !value.is_finite() => {
                    return Err(ModelError::NonFiniteCoefficient(name.as_str().to_string()));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Resolves the named coefficients into [`design_row`] order.
    ///
    /// Alignment goes through the feature names, so a reordered
    /// `feature_names` list produces the same weights.
    pub fn weights(&self) -> Result<LinearWeights, ModelError> {
        self.validate()?;
        let mut weights = Array1::zeros(INPUT_WIDTH);
        weights[0] = self.coefficients.year;
        for name in FeatureName::ALL {
            weights[name.index() + 1] = self.coefficients.features[name.as_str()];
        }
        weights[INPUT_WIDTH - 1] = self.coefficients.current_score;
        Ok(LinearWeights {
            intercept: self.coefficients.intercept,
            weights,
        })
    }

    /// Raw linear prediction of next year's score, without clamping.
    pub fn predict_next(
        &self,
        year: i32,
        features: &[f64; FEATURE_COUNT],
        current_score: f64,
    ) -> Result<f64, ModelError> {
        let row = design_row(f64::from(year), features, current_score);
        Ok(self.weights()?.predict(row.view()))
    }

    /// Saves the trained model to a file in a human-readable TOML format.
    ///
    /// The file is replaced atomically, so a concurrent reader never sees a
    /// partially written model.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        crate::io::write_atomically(path, |file| file.write_all(toml_string.as_bytes()))?;
        Ok(())
    }

    /// Loads a trained model from a TOML file and validates it.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let model: TrainedModel = toml::from_str(&toml_string)?;
        model.validate()?;
        Ok(model)
    }
}
