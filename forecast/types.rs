//! # Domain Types
//!
//! Identifiers and records shared by every stage of the forecasting pipeline.
//!
//! The two source tables disagree on tract id width: the score table carries
//! 10-digit codes and the feature table carries 11-digit codes. The rule that
//! relates them lives on [`FeatureTractId::score_form`] and nowhere else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Width of a tract id in the score table's native form.
pub const SCORE_TRACT_ID_WIDTH: usize = 10;

/// Width of a tract id in the feature table's native form.
pub const FEATURE_TRACT_ID_WIDTH: usize = 11;

/// Number of demographic features in a [`TractFeatureVector`].
pub const FEATURE_COUNT: usize = 13;

/// Inclusive bounds of an Inclusive Growth Score.
pub const SCORE_RANGE: (f64, f64) = (0.0, 100.0);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("tract id '{value}' must be exactly {expected_width} ASCII digits")]
pub struct TractIdError {
    pub value: String,
    pub expected_width: usize,
}

fn validate_digits(raw: &str, width: usize) -> Result<String, TractIdError> {
    let trimmed = raw.trim();
    if trimmed.len() == width && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        Ok(trimmed.to_string())
    } else {
        Err(TractIdError {
            value: raw.to_string(),
            expected_width: width,
        })
    }
}

/// A 10-digit tract code as it appears in the score table.
///
/// Stored as text so leading zeros survive every round trip.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScoreTractId(String);

impl ScoreTractId {
    pub fn parse(raw: &str) -> Result<Self, TractIdError> {
        validate_digits(raw, SCORE_TRACT_ID_WIDTH).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An 11-digit tract code as it appears in the feature table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FeatureTractId(String);

impl FeatureTractId {
    pub fn parse(raw: &str) -> Result<Self, TractIdError> {
        validate_digits(raw, FEATURE_TRACT_ID_WIDTH).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Converts this id to the score table's form by dropping the leading digit.
    ///
    /// The score table stores the full FIPS code with the leading zero of the
    /// two-digit state code stripped, so `01121010500` becomes `1121010500`.
    pub fn score_form(&self) -> ScoreTractId {
        // Validated as ASCII digits, so byte slicing is on a char boundary.
        ScoreTractId(self.0[1..].to_string())
    }

    pub fn aligns_with(&self, score_id: &ScoreTractId) -> bool {
        self.0[1..] == score_id.0
    }
}

macro_rules! impl_id_conversions {
    ($ty:ident) => {
        impl FromStr for $ty {
            type Err = TractIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = TractIdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

impl_id_conversions!(ScoreTractId);
impl_id_conversions!(FeatureTractId);

/// The scale a feature is measured on, which fixes its valid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    /// Percentage points on a 0-100 scale.
    Percentage,
    /// A unit-interval index such as the Gini coefficient.
    Index,
    /// Non-negative dollar amounts.
    Currency,
}

impl FeatureKind {
    pub fn bounds(self) -> (f64, f64) {
        match self {
            FeatureKind::Percentage => (0.0, 100.0),
            FeatureKind::Index => (0.0, 1.0),
            FeatureKind::Currency => (0.0, f64::INFINITY),
        }
    }

    pub fn clamp(self, value: f64) -> f64 {
        let (min, max) = self.bounds();
        value.clamp(min, max)
    }
}

/// The thirteen ACS-derived features, in canonical column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureName {
    MedianHouseholdIncome,
    GiniIndex,
    PerCapitaIncome,
    PovertyRate,
    UnemploymentRate,
    LaborForceParticipationRate,
    HousingCostBurdenRate,
    BroadbandAccessRate,
    ComputerAccessRate,
    MedianHomeValue,
    WhiteAlonePct,
    BlackAlonePct,
    HispanicLatinoPct,
}

impl FeatureName {
    pub const ALL: [FeatureName; FEATURE_COUNT] = [
        FeatureName::MedianHouseholdIncome,
        FeatureName::GiniIndex,
        FeatureName::PerCapitaIncome,
        FeatureName::PovertyRate,
        FeatureName::UnemploymentRate,
        FeatureName::LaborForceParticipationRate,
        FeatureName::HousingCostBurdenRate,
        FeatureName::BroadbandAccessRate,
        FeatureName::ComputerAccessRate,
        FeatureName::MedianHomeValue,
        FeatureName::WhiteAlonePct,
        FeatureName::BlackAlonePct,
        FeatureName::HispanicLatinoPct,
    ];

    /// Position of this feature in [`FeatureName::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureName::MedianHouseholdIncome => "median_household_income",
            FeatureName::GiniIndex => "gini_index",
            FeatureName::PerCapitaIncome => "per_capita_income",
            FeatureName::PovertyRate => "poverty_rate",
            FeatureName::UnemploymentRate => "unemployment_rate",
            FeatureName::LaborForceParticipationRate => "labor_force_participation_rate",
            FeatureName::HousingCostBurdenRate => "housing_cost_burden_rate",
            FeatureName::BroadbandAccessRate => "broadband_access_rate",
            FeatureName::ComputerAccessRate => "computer_access_rate",
            FeatureName::MedianHomeValue => "median_home_value",
            FeatureName::WhiteAlonePct => "white_alone_pct",
            FeatureName::BlackAlonePct => "black_alone_pct",
            FeatureName::HispanicLatinoPct => "hispanic_latino_pct",
        }
    }

    pub fn kind(self) -> FeatureKind {
        match self {
            FeatureName::MedianHouseholdIncome
            | FeatureName::PerCapitaIncome
            | FeatureName::MedianHomeValue => FeatureKind::Currency,
            FeatureName::GiniIndex => FeatureKind::Index,
            _ => FeatureKind::Percentage,
        }
    }
}

impl FromStr for FeatureName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed Inclusive Growth Score for one tract in one year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TractYearScore {
    pub tract_id: ScoreTractId,
    pub year: i32,
    pub score: f64,
}

/// The ACS snapshot for one tract, treated as constant over time.
#[derive(Debug, Clone, PartialEq)]
pub struct TractFeatureVector {
    pub tract_id: FeatureTractId,
    values: [f64; FEATURE_COUNT],
    /// Features whose source cell was blank and were filled with zero.
    pub imputed: Vec<FeatureName>,
}

impl TractFeatureVector {
    pub fn new(tract_id: FeatureTractId, values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            tract_id,
            values,
            imputed: Vec::new(),
        }
    }

    pub fn get(&self, name: FeatureName) -> f64 {
        self.values[name.index()]
    }

    pub fn set(&mut self, name: FeatureName, value: f64) {
        self.values[name.index()] = value;
    }

    /// Feature values in [`FeatureName::ALL`] order.
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }
}

/// One supervised row: this year's state mapped to next year's score.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub tract_id: ScoreTractId,
    pub year: i32,
    pub features: [f64; FEATURE_COUNT],
    pub current_score: f64,
    pub next_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_ids_keep_leading_zeros_and_reject_wrong_widths() {
        let id = ScoreTractId::parse("0121010500").unwrap();
        assert_eq!(id.as_str(), "0121010500");
        assert!(ScoreTractId::parse("121010500").is_err());
        assert!(ScoreTractId::parse("11210105000").is_err());
        assert!(ScoreTractId::parse("11210105a0").is_err());
        assert_eq!(
            ScoreTractId::parse(" 1121010500 ").unwrap().as_str(),
            "1121010500"
        );
    }

    #[test]
    fn feature_id_alignment_drops_the_leading_digit() {
        let feature = FeatureTractId::parse("01121010500").unwrap();
        let score = ScoreTractId::parse("1121010500").unwrap();
        assert_eq!(feature.score_form(), score);
        assert!(feature.aligns_with(&score));

        let other = FeatureTractId::parse("11210105000").unwrap();
        assert!(!other.aligns_with(&score));
    }

    #[test]
    fn feature_names_follow_canonical_order() {
        for (position, name) in FeatureName::ALL.iter().enumerate() {
            assert_eq!(name.index(), position);
            assert_eq!(name.as_str().parse::<FeatureName>().unwrap(), *name);
        }
        assert!("not_a_feature".parse::<FeatureName>().is_err());
    }

    #[test]
    fn feature_kinds_fix_bounds() {
        assert_eq!(FeatureName::GiniIndex.kind().bounds(), (0.0, 1.0));
        assert_eq!(FeatureName::BroadbandAccessRate.kind().clamp(104.0), 100.0);
        assert_eq!(FeatureName::MedianHomeValue.kind().clamp(-3.0), 0.0);
        assert_eq!(FeatureName::MedianHomeValue.kind().clamp(1.0e7), 1.0e7);
    }
}
