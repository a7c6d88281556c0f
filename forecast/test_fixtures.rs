//! Shared fixtures for unit tests across modules.

use crate::data::SourceData;
use crate::model::{FitSummary, ModelCoefficients, MODEL_FORMAT_VERSION, TrainedModel};
use crate::types::{
    FEATURE_COUNT, FeatureName, FeatureTractId, ScoreTractId, TractFeatureVector, TractYearScore,
};

/// A plausible feature vector for a low-income rural tract.
pub fn sample_features() -> [f64; FEATURE_COUNT] {
    let mut values = [0.0; FEATURE_COUNT];
    let assignments = [
        (FeatureName::MedianHouseholdIncome, 38_000.0),
        (FeatureName::GiniIndex, 0.45),
        (FeatureName::PerCapitaIncome, 21_000.0),
        (FeatureName::PovertyRate, 22.5),
        (FeatureName::UnemploymentRate, 6.1),
        (FeatureName::LaborForceParticipationRate, 55.0),
        (FeatureName::HousingCostBurdenRate, 31.0),
        (FeatureName::BroadbandAccessRate, 70.0),
        (FeatureName::ComputerAccessRate, 80.0),
        (FeatureName::MedianHomeValue, 95_000.0),
        (FeatureName::WhiteAlonePct, 40.0),
        (FeatureName::BlackAlonePct, 55.0),
        (FeatureName::HispanicLatinoPct, 2.5),
    ];
    for (name, value) in assignments {
        values[name.index()] = value;
    }
    values
}

pub fn sample_vector(feature_id: &str) -> TractFeatureVector {
    TractFeatureVector::new(FeatureTractId::parse(feature_id).unwrap(), sample_features())
}

/// A hand-specified model: only year, current score, broadband and poverty carry weight.
pub fn fixed_model() -> TrainedModel {
    let features = FeatureName::ALL
        .iter()
        .map(|name| {
            let weight = match name {
                FeatureName::BroadbandAccessRate => 0.05,
                FeatureName::PovertyRate => -0.02,
                _ => 0.0,
            };
            (name.as_str().to_string(), weight)
        })
        .collect();
    TrainedModel {
        format_version: MODEL_FORMAT_VERSION,
        alpha: 1.0,
        feature_names: FeatureName::ALL
            .iter()
            .map(|name| name.as_str().to_string())
            .collect(),
        coefficients: ModelCoefficients {
            intercept: 2.0,
            year: 0.001,
            current_score: 0.9,
            features,
        },
        fit_summary: FitSummary {
            n_examples: 16,
            n_tracts: 2,
            first_year: 2017,
            last_year: 2024,
            rmse: 0.25,
            r_squared: Some(0.9),
        },
    }
}

/// Two joined tracts with a short score history each.
pub fn sample_sources() -> SourceData {
    let mut scores = Vec::new();
    for (tract, base) in [("1121010500", 23.0), ("1121011100", 45.0)] {
        for (offset, year) in (2019..=2022).enumerate() {
            scores.push(TractYearScore {
                tract_id: ScoreTractId::parse(tract).unwrap(),
                year,
                score: base + 0.5 * offset as f64,
            });
        }
    }
    let mut wealthier = sample_vector("01121011100");
    wealthier.set(FeatureName::MedianHouseholdIncome, 61_000.0);
    wealthier.set(FeatureName::BroadbandAccessRate, 97.0);
    SourceData {
        scores,
        features: vec![sample_vector("01121010500"), wealthier],
    }
}
