//! # Multi-step Forecasting
//!
//! Rolls the one-step model forward: each prediction becomes the next step's
//! current score while the (possibly perturbed) feature vector stays fixed.
//! Errors compound across steps, so later years carry less confidence.

use crate::intervention::{InterventionSet, apply_interventions};
use crate::model::{ModelError, TrainedModel, design_row};
use crate::transitions::TractIndex;
use crate::transitions::ExclusionReason;
use crate::types::{FEATURE_COUNT, SCORE_RANGE, ScoreTractId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const MIN_YEARS_AHEAD: u32 = 1;
pub const MAX_YEARS_AHEAD: u32 = 15;
pub const DEFAULT_YEARS_AHEAD: u32 = 5;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Tract '{0}' is not present in the feature table.")]
    UnknownTract(String),
    #[error("Tract '{tract}' aligns with several feature rows ({}) and cannot be forecast.", .rows.join(", "))]
    AmbiguousTract { tract: String, rows: Vec<String> },
    #[error("Tract '{0}' has no observed score to start a forecast from.")]
    NoObservedScore(String),
    #[error("years_ahead must be between {min} and {max}, got {requested}.")]
    InvalidHorizon { requested: u32, min: u32, max: u32 },
    #[error("The model cannot be applied: {0}")]
    Model(#[from] ModelError),
}

/// Where a rollout begins: the most recent observation for a tract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartingState {
    pub year: i32,
    pub score: f64,
}

/// Limits on how far one rollout step may move the score.
///
/// Applied to `prediction - current` before the score-range clamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YearlyChangeBounds {
    pub min: f64,
    pub max: f64,
}

impl YearlyChangeBounds {
    /// Observed extremes of year-over-year IGS movement.
    pub const OBSERVED: YearlyChangeBounds = YearlyChangeBounds {
        min: -2.0,
        max: 3.5,
    };

    /// `min <= 0 <= max`, both finite.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= 0.0 && 0.0 <= self.max
    }

    fn limit(&self, current: f64, predicted: f64) -> f64 {
        current + (predicted - current).clamp(self.min, self.max)
    }
}

/// Predicted scores for consecutive future years.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    /// Offsets `1..=years_ahead` from the starting year.
    pub years: Vec<u32>,
    pub predictions: Vec<f64>,
}

/// Checks a horizon against `[MIN_YEARS_AHEAD, max]`.
pub fn check_horizon(years_ahead: u32, max: u32) -> Result<(), ForecastError> {
    if (MIN_YEARS_AHEAD..=max).contains(&years_ahead) {
        Ok(())
    } else {
        Err(ForecastError::InvalidHorizon {
            requested: years_ahead,
            min: MIN_YEARS_AHEAD,
            max,
        })
    }
}

/// Runs the autoregressive rollout from `start` for `years_ahead` steps.
///
/// Step `i` feeds `[start.year + i, features, current]` to the model and
/// clamps the result to the score range before it becomes `current`.
pub fn roll_forward(
    model: &TrainedModel,
    features: &[f64; FEATURE_COUNT],
    start: StartingState,
    years_ahead: u32,
) -> Result<Forecast, ForecastError> {
    roll_forward_bounded(model, features, start, years_ahead, None)
}

/// [`roll_forward`] with an optional per-step change limit.
pub fn roll_forward_bounded(
    model: &TrainedModel,
    features: &[f64; FEATURE_COUNT],
    start: StartingState,
    years_ahead: u32,
    bounds: Option<YearlyChangeBounds>,
) -> Result<Forecast, ForecastError> {
    check_horizon(years_ahead, MAX_YEARS_AHEAD)?;
    let weights = model.weights()?;
    let (min_score, max_score) = SCORE_RANGE;

    let mut current = start.score;
    let mut predictions = Vec::with_capacity(years_ahead as usize);
    for step in 1..=years_ahead {
        let year = start.year + step as i32;
        let row = design_row(f64::from(year), features, current);
        let mut next = weights.predict(row.view());
        if let Some(bounds) = bounds {
            next = bounds.limit(current, next);
        }
        let next = next.clamp(min_score, max_score);
        log::debug!("Step {step} (year {year}): {current:.4} -> {next:.4}");
        predictions.push(next);
        current = next;
    }

    Ok(Forecast {
        years: (1..=years_ahead).collect(),
        predictions,
    })
}

/// Forecasts one tract from its last observed score, with interventions applied.
pub fn forecast_tract(
    model: &TrainedModel,
    index: &TractIndex,
    tract: &ScoreTractId,
    interventions: &InterventionSet,
    years_ahead: u32,
    bounds: Option<YearlyChangeBounds>,
) -> Result<Forecast, ForecastError> {
    let state = index.get(tract).ok_or_else(|| missing_tract(index, tract))?;
    let (year, score) = state
        .last_observed()
        .ok_or_else(|| ForecastError::NoObservedScore(tract.to_string()))?;
    let features = apply_interventions(&state.features, interventions);
    roll_forward_bounded(
        model,
        features.values(),
        StartingState { year, score },
        years_ahead,
        bounds,
    )
}

fn missing_tract(index: &TractIndex, tract: &ScoreTractId) -> ForecastError {
    match index.exclusion(tract).map(|exclusion| &exclusion.reason) {
        Some(ExclusionReason::AmbiguousFeatureRows(rows)) => ForecastError::AmbiguousTract {
            tract: tract.to_string(),
            rows: rows.clone(),
        },
        _ => ForecastError::UnknownTract(tract.to_string()),
    }
}

/// Baseline and every intervention combination for one tract.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioGrid {
    pub tract: String,
    pub years: Vec<u32>,
    pub baseline: Vec<f64>,
    /// Keyed by the alphabetically sorted, comma-joined intervention names;
    /// `""` is the baseline.
    pub scenarios: BTreeMap<String, Vec<f64>>,
}

pub fn scenario_grid(
    model: &TrainedModel,
    index: &TractIndex,
    tract: &ScoreTractId,
    years_ahead: u32,
    bounds: Option<YearlyChangeBounds>,
) -> Result<ScenarioGrid, ForecastError> {
    let mut scenarios = BTreeMap::new();
    let mut years = Vec::new();
    for subset in InterventionSet::all_subsets() {
        let forecast = forecast_tract(model, index, tract, &subset, years_ahead, bounds)?;
        years = forecast.years;
        scenarios.insert(subset.scenario_key(), forecast.predictions);
    }
    let baseline = scenarios.get("").cloned().unwrap_or_default();
    log::info!(
        "Computed {} scenarios for tract {tract} over {years_ahead} years.",
        scenarios.len()
    );
    Ok(ScenarioGrid {
        tract: tract.to_string(),
        years,
        baseline,
        scenarios,
    })
}
