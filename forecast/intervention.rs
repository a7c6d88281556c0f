//! # Intervention Scenarios
//!
//! An intervention is a fixed, hypothetical shift to a handful of features.
//! The shifts are data: [`INTERVENTION_TABLE`] lists every intervention with
//! its deltas, and adding a row there is all a new intervention needs.
//!
//! Requested interventions are applied in the table's order no matter how the
//! caller listed them, and every touched feature is clamped to its valid range
//! once all deltas have been applied.

use crate::types::{FeatureName, TractFeatureVector};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The closed set of interventions. Declaration order is application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intervention {
    Digital,
    Housing,
    Entrepreneurship,
    Workforce,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeltaKind {
    /// Adds `magnitude` in the feature's own units (percentage points for rates).
    Points,
    /// Scales the feature by `1 + magnitude / 100`.
    Percent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureDelta {
    pub feature: FeatureName,
    pub kind: DeltaKind,
    pub magnitude: f64,
}

impl FeatureDelta {
    fn apply(&self, value: f64) -> f64 {
        match self.kind {
            DeltaKind::Points => value + self.magnitude,
            DeltaKind::Percent => value * (1.0 + self.magnitude / 100.0),
        }
    }
}

const fn delta(feature: FeatureName, kind: DeltaKind, magnitude: f64) -> FeatureDelta {
    FeatureDelta {
        feature,
        kind,
        magnitude,
    }
}

/// Every intervention and the deltas it applies, in application order.
pub const INTERVENTION_TABLE: [(Intervention, &[FeatureDelta]); 4] = [
    (
        Intervention::Digital,
        &[
            delta(FeatureName::BroadbandAccessRate, DeltaKind::Points, 6.0),
            delta(FeatureName::ComputerAccessRate, DeltaKind::Points, 5.0),
        ],
    ),
    (
        Intervention::Housing,
        &[
            delta(FeatureName::HousingCostBurdenRate, DeltaKind::Points, -5.0),
            delta(FeatureName::MedianHomeValue, DeltaKind::Points, 5.0),
        ],
    ),
    (
        Intervention::Entrepreneurship,
        &[
            delta(FeatureName::PerCapitaIncome, DeltaKind::Points, 7.0),
            delta(FeatureName::MedianHouseholdIncome, DeltaKind::Points, 5.0),
        ],
    ),
    (
        Intervention::Workforce,
        &[
            delta(FeatureName::LaborForceParticipationRate, DeltaKind::Points, 5.0),
            delta(FeatureName::UnemploymentRate, DeltaKind::Points, -3.0),
        ],
    ),
];

impl Intervention {
    pub const ALL: [Intervention; 4] = [
        Intervention::Digital,
        Intervention::Housing,
        Intervention::Entrepreneurship,
        Intervention::Workforce,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Intervention::Digital => "digital",
            Intervention::Housing => "housing",
            Intervention::Entrepreneurship => "entrepreneurship",
            Intervention::Workforce => "workforce",
        }
    }

    pub fn deltas(self) -> &'static [FeatureDelta] {
        INTERVENTION_TABLE
            .iter()
            .find(|(intervention, _)| *intervention == self)
            .map(|(_, deltas)| *deltas)
            .unwrap_or(&[])
    }
}

impl fmt::Display for Intervention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterventionError {
    #[error(
        "Unknown intervention(s): {}. Expected any of: digital, housing, entrepreneurship, workforce.",
        .0.join(", ")
    )]
    Unknown(Vec<String>),
}

impl FromStr for Intervention {
    type Err = InterventionError;

    /// Case-insensitive and whitespace-tolerant.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Intervention::ALL
            .iter()
            .copied()
            .find(|intervention| intervention.as_str() == normalized)
            .ok_or_else(|| InterventionError::Unknown(vec![s.to_string()]))
    }
}

/// A deduplicated set of interventions that iterates in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct InterventionSet(BTreeSet<Intervention>);

impl InterventionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses caller-supplied names, reporting every unknown name at once.
    pub fn parse<I, S>(names: I) -> Result<Self, InterventionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        let mut unknown = Vec::new();
        for name in names {
            match name.as_ref().parse::<Intervention>() {
                Ok(intervention) => {
                    set.insert(intervention);
                }
                Err(InterventionError::Unknown(rejected)) => unknown.extend(rejected),
            }
        }
        if unknown.is_empty() {
            Ok(Self(set))
        } else {
            Err(InterventionError::Unknown(unknown))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Members in application order.
    pub fn iter(&self) -> impl Iterator<Item = Intervention> + '_ {
        self.0.iter().copied()
    }

    pub fn names(&self) -> Vec<String> {
        self.iter().map(|i| i.as_str().to_string()).collect()
    }

    /// Comma-joined names in application order.
    pub fn label(&self) -> String {
        self.iter().map(Intervention::as_str).join(",")
    }

    /// Alphabetically sorted, comma-joined names. The baseline is `""`.
    ///
    /// Scenario exports are keyed this way so consumers can rebuild a key
    /// from any ordering of the same interventions.
    pub fn scenario_key(&self) -> String {
        self.iter().map(Intervention::as_str).sorted().join(",")
    }

    /// Every subset of the closed set, baseline first, then by size.
    pub fn all_subsets() -> Vec<InterventionSet> {
        Intervention::ALL
            .iter()
            .copied()
            .powerset()
            .map(|subset| InterventionSet(subset.into_iter().collect()))
            .collect()
    }
}

impl FromIterator<Intervention> for InterventionSet {
    fn from_iter<T: IntoIterator<Item = Intervention>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Returns a copy of `base` with every requested intervention applied.
pub fn apply_interventions(
    base: &TractFeatureVector,
    interventions: &InterventionSet,
) -> TractFeatureVector {
    let mut perturbed = base.clone();
    let mut touched = BTreeSet::new();
    for intervention in interventions.iter() {
        for delta in intervention.deltas() {
            let shifted = delta.apply(perturbed.get(delta.feature));
            perturbed.set(delta.feature, shifted);
            touched.insert(delta.feature);
        }
    }
    for feature in touched {
        let clamped = feature.kind().clamp(perturbed.get(feature));
        perturbed.set(feature, clamped);
    }
    perturbed
}
