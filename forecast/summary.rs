//! Descriptive statistics for comparing tracts' observed score histories.

use crate::transitions::TractState;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Trend::Increasing => "increasing",
            Trend::Decreasing => "decreasing",
            Trend::Stable => "stable",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// The score in the most recent year.
    pub latest: f64,
    /// Direction from the earliest to the latest observation.
    pub trend: Trend,
}

/// Summarizes a `(year, score)` series. Returns `None` for an empty series.
pub fn summarize(history: &[(i32, f64)]) -> Option<TrendSummary> {
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|&(year, _)| year);
    let &(_, first) = sorted.first()?;
    let &(_, latest) = sorted.last()?;

    let scores = sorted.iter().map(|&(_, score)| score);
    let mean = scores.clone().sum::<f64>() / sorted.len() as f64;
    let min = scores.clone().fold(f64::INFINITY, f64::min);
    let max = scores.fold(f64::NEG_INFINITY, f64::max);

    let trend = if latest > first {
        Trend::Increasing
    } else if latest < first {
        Trend::Decreasing
    } else {
        Trend::Stable
    };

    Some(TrendSummary {
        mean,
        min,
        max,
        latest,
        trend,
    })
}

/// Latest score of `b` minus latest score of `a`, when both have observations.
pub fn score_gap(a: &TractState, b: &TractState) -> Option<f64> {
    let (_, latest_a) = a.last_observed()?;
    let (_, latest_b) = b.last_observed()?;
    Some(latest_b - latest_a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::sample_vector;
    use approx::assert_abs_diff_eq;

    #[test]
    fn summary_follows_year_order_not_input_order() {
        let summary = summarize(&[(2021, 26.0), (2017, 22.0), (2019, 30.0)]).unwrap();
        assert_abs_diff_eq!(summary.mean, 26.0, epsilon = 1e-12);
        assert_eq!(summary.min, 22.0);
        assert_eq!(summary.max, 30.0);
        assert_eq!(summary.latest, 26.0);
        assert_eq!(summary.trend, Trend::Increasing);
    }

    #[test]
    fn flat_and_falling_series() {
        assert_eq!(
            summarize(&[(2017, 40.0), (2018, 38.0), (2019, 40.0)])
                .unwrap()
                .trend,
            Trend::Stable
        );
        assert_eq!(
            summarize(&[(2017, 40.0), (2018, 35.0)]).unwrap().trend,
            Trend::Decreasing
        );
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn gap_is_latest_difference() {
        let a = TractState {
            features: sample_vector("01121010500"),
            history: vec![(2021, 23.0), (2022, 24.0)],
        };
        let b = TractState {
            features: sample_vector("01121011100"),
            history: vec![(2021, 70.0), (2022, 73.5)],
        };
        assert_eq!(score_gap(&a, &b), Some(49.5));
        let empty = TractState {
            features: sample_vector("01121011100"),
            history: Vec::new(),
        };
        assert_eq!(score_gap(&a, &empty), None);
    }
}
