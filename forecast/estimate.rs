// forecast/estimate.rs

//! # Ridge Regression Training
//!
//! Fits the one-step transition model
//!
//! ```text
//! next_score = intercept + w · [year, features..., current_score]
//! ```
//!
//! by minimizing the squared residuals plus `alpha * ||w||²`. The intercept is
//! not penalized: inputs and targets are centered before the solve and the
//! intercept is recovered from the means afterwards. Inputs are used on their
//! raw scale, so the persisted coefficients apply to raw feature values and no
//! scaler needs to be stored alongside them.

use crate::model::{FitSummary, INPUT_WIDTH, TrainedModel, design_row};
use crate::types::TrainingExample;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::Solve;
use std::collections::BTreeSet;
use thiserror::Error;

/// Penalty used when the caller does not choose one.
pub const DEFAULT_ALPHA: f64 = 1.0;

/// Fewest examples that can support `INPUT_WIDTH` coefficients plus an intercept.
pub const MIN_EXAMPLES: usize = INPUT_WIDTH + 1;

/// A comprehensive error type for the model estimation process.
#[derive(Error, Debug)]
pub enum EstimationError {
    #[error(
        "Insufficient data: {found} training examples are available, but at least {required} are needed to fit {columns} input columns plus an intercept."
    )]
    InsufficientData {
        found: usize,
        required: usize,
        columns: usize,
    },

    #[error("The ridge penalty must be a finite positive number, got {0}.")]
    InvalidAlpha(f64),

    #[error("The training example for tract {tract} in {year} contains a non-finite value.")]
    NonFiniteInput { tract: String, year: i32 },

    #[error("A linear system solve failed. The penalized Gram matrix may be singular. Error: {0}")]
    LinearSystemSolveFailed(ndarray_linalg::error::LinalgError),

    #[error("The fitted coefficients contain non-finite values.")]
    NonFiniteCoefficients,
}

/// The main entry point for model training.
pub fn train_model(
    examples: &[TrainingExample],
    alpha: f64,
) -> Result<TrainedModel, EstimationError> {
    if !(alpha.is_finite() && alpha > 0.0) {
        return Err(EstimationError::InvalidAlpha(alpha));
    }
    if examples.len() < MIN_EXAMPLES {
        return Err(EstimationError::InsufficientData {
            found: examples.len(),
            required: MIN_EXAMPLES,
            columns: INPUT_WIDTH,
        });
    }

    log::info!(
        "Starting ridge fit on {} examples with alpha = {alpha}.",
        examples.len()
    );

    let (x, y) = internal::build_design(examples)?;
    let fit = internal::fit_ridge(x.view(), y.view(), alpha)?;
    let summary = internal::summarize(examples, x.view(), y.view(), &fit);

    match summary.r_squared {
        Some(r_squared) => log::info!(
            "Ridge fit complete: in-sample RMSE {:.4}, R² {:.4}.",
            summary.rmse,
            r_squared
        ),
        None => log::info!(
            "Ridge fit complete: in-sample RMSE {:.4} (targets are constant, R² undefined).",
            summary.rmse
        ),
    }

    Ok(TrainedModel::from_fit(
        alpha,
        fit.intercept,
        fit.beta.view(),
        summary,
    ))
}

/// Internal module for estimation-specific implementation details.
mod internal {
    use super::*;

    pub(super) struct RidgeFit {
        pub intercept: f64,
        pub beta: Array1<f64>,
    }

    /// Stacks the examples into the design matrix `X` and target vector `y`.
    pub(super) fn build_design(
        examples: &[TrainingExample],
    ) -> Result<(Array2<f64>, Array1<f64>), EstimationError> {
        let mut x = Array2::zeros((examples.len(), INPUT_WIDTH));
        let mut y = Array1::zeros(examples.len());
        for (i, example) in examples.iter().enumerate() {
            let row = design_row(
                f64::from(example.year),
                &example.features,
                example.current_score,
            );
            if !example.next_score.is_finite() || row.iter().any(|v| !v.is_finite()) {
                return Err(EstimationError::NonFiniteInput {
                    tract: example.tract_id.to_string(),
                    year: example.year,
                });
            }
            x.row_mut(i).assign(&row);
            y[i] = example.next_score;
        }
        Ok((x, y))
    }

    /// Solves `(XcᵀXc + αI) β = Xcᵀyc` on centered data.
    pub(super) fn fit_ridge(
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        alpha: f64,
    ) -> Result<RidgeFit, EstimationError> {
        let n = x.nrows() as f64;
        let x_mean = x.sum_axis(Axis(0)) / n;
        let y_mean = y.sum() / n;

        let xc = &x - &x_mean.view().insert_axis(Axis(0));
        let yc = y.mapv(|v| v - y_mean);

        let mut gram = xc.t().dot(&xc);
        gram.diag_mut().mapv_inplace(|d| d + alpha);
        let rhs = xc.t().dot(&yc);

        let beta = gram
            .solve_into(rhs)
            .map_err(EstimationError::LinearSystemSolveFailed)?;
        if beta.iter().any(|b| !b.is_finite()) {
            return Err(EstimationError::NonFiniteCoefficients);
        }
        let intercept = y_mean - x_mean.dot(&beta);
        if !intercept.is_finite() {
            return Err(EstimationError::NonFiniteCoefficients);
        }

        Ok(RidgeFit { intercept, beta })
    }

    pub(super) fn summarize(
        examples: &[TrainingExample],
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        fit: &RidgeFit,
    ) -> FitSummary {
        let fitted = x.dot(&fit.beta) + fit.intercept;
        let residuals = &y - &fitted;
        let n = y.len() as f64;
        let ss_res = residuals.dot(&residuals);
        let y_mean = y.sum() / n;
        let ss_tot = y.iter().map(|v| (v - y_mean).powi(2)).sum::<f64>();

        let tracts: BTreeSet<&str> = examples.iter().map(|e| e.tract_id.as_str()).collect();
        FitSummary {
            n_examples: examples.len(),
            n_tracts: tracts.len(),
            first_year: examples.iter().map(|e| e.year).min().unwrap_or_default(),
            last_year: examples.iter().map(|e| e.year).max().unwrap_or_default(),
            rmse: (ss_res / n).sqrt(),
            r_squared: (ss_tot > 0.0).then(|| 1.0 - ss_res / ss_tot),
        }
    }
}
