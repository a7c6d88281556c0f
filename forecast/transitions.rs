//! Joins the two source tables and turns consecutive observations into
//! supervised examples.
//!
//! Each score-table tract is matched to exactly one feature row through
//! [`FeatureTractId::score_form`]. Tracts with no match, or with more than one,
//! are excluded with a warning rather than failing the run.

use crate::data::SourceData;
use crate::types::{ScoreTractId, TractFeatureVector, TractYearScore, TrainingExample};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ExclusionReason {
    /// No feature row aligns with the score-table id.
    NoFeatureRow,
    /// Several feature rows align with the same score-table id.
    AmbiguousFeatureRows(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinExclusion {
    pub tract: ScoreTractId,
    pub reason: ExclusionReason,
}

impl fmt::Display for JoinExclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            ExclusionReason::NoFeatureRow => {
                write!(f, "tract {} has no aligned feature row", self.tract)
            }
            ExclusionReason::AmbiguousFeatureRows(ids) => write!(
                f,
                "tract {} aligns with several feature rows: {}",
                self.tract,
                ids.join(", ")
            ),
        }
    }
}

/// Observed history and features for one tract that survived the join.
#[derive(Debug, Clone, PartialEq)]
pub struct TractState {
    pub features: TractFeatureVector,
    /// `(year, score)` pairs sorted by year. May be empty.
    pub history: Vec<(i32, f64)>,
}

impl TractState {
    /// The most recent observation, which seeds a forecast.
    pub fn last_observed(&self) -> Option<(i32, f64)> {
        self.history.last().copied()
    }
}

/// Lookup from score-table tract id to its joined state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TractIndex {
    tracts: BTreeMap<ScoreTractId, TractState>,
    /// Score-table ids that could not be joined.
    pub exclusions: Vec<JoinExclusion>,
}

impl TractIndex {
    /// Builds the index from validated sources.
    ///
    /// Feature rows whose score form is shared by another feature row are
    /// dropped entirely, so a lookup never silently picks one of them.
    pub fn build(sources: &SourceData) -> Self {
        let mut candidates: BTreeMap<ScoreTractId, Vec<&TractFeatureVector>> = BTreeMap::new();
        for vector in &sources.features {
            candidates
                .entry(vector.tract_id.score_form())
                .or_default()
                .push(vector);
        }

        let mut histories: BTreeMap<ScoreTractId, Vec<(i32, f64)>> = BTreeMap::new();
        for TractYearScore {
            tract_id,
            year,
            score,
        } in &sources.scores
        {
            histories
                .entry(tract_id.clone())
                .or_default()
                .push((*year, *score));
        }

        let mut tracts = BTreeMap::new();
        let mut exclusions = Vec::new();
        for (score_id, matches) in candidates {
            if let [vector] = matches.as_slice() {
                let mut history = histories.remove(&score_id).unwrap_or_default();
                history.sort_by_key(|&(year, _)| year);
                tracts.insert(
                    score_id,
                    TractState {
                        features: (*vector).clone(),
                        history,
                    },
                );
            } else {
                let ids = matches.iter().map(|v| v.tract_id.to_string()).collect();
                if histories.remove(&score_id).is_some() {
                    exclusions.push(JoinExclusion {
                        tract: score_id,
                        reason: ExclusionReason::AmbiguousFeatureRows(ids),
                    });
                }
            }
        }
        // Whatever is left in `histories` never found a feature row.
        for tract in histories.into_keys() {
            exclusions.push(JoinExclusion {
                tract,
                reason: ExclusionReason::NoFeatureRow,
            });
        }
        exclusions.sort_by(|a, b| a.tract.cmp(&b.tract));

        for exclusion in &exclusions {
            log::warn!("Excluding from training: {exclusion}");
        }

        Self { tracts, exclusions }
    }

    pub fn get(&self, tract: &ScoreTractId) -> Option<&TractState> {
        self.tracts.get(tract)
    }

    /// Why `tract` was left out of the join, if it was.
    pub fn exclusion(&self, tract: &ScoreTractId) -> Option<&JoinExclusion> {
        self.exclusions
            .iter()
            .find(|exclusion| &exclusion.tract == tract)
    }

    pub fn len(&self) -> usize {
        self.tracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracts.is_empty()
    }

    /// Joined tracts in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&ScoreTractId, &TractState)> {
        self.tracts.iter()
    }
}

/// Builds one example per pair of observations in consecutive calendar years.
///
/// Examples are ordered by tract id, then by year. A gap in a tract's years
/// produces no example across the gap.
pub fn build_training_examples(index: &TractIndex) -> Vec<TrainingExample> {
    let mut examples = Vec::new();
    for (tract_id, state) in index.iter() {
        for pair in state.history.windows(2) {
            let (year, current_score) = pair[0];
            let (next_year, next_score) = pair[1];
            if next_year != year + 1 {
                continue;
            }
            examples.push(TrainingExample {
                tract_id: tract_id.clone(),
                year,
                features: *state.features.values(),
                current_score,
                next_score,
            });
        }
    }
    log::info!(
        "Built {} training examples from {} joined tracts.",
        examples.len(),
        index.len()
    );
    examples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FEATURE_COUNT, FeatureTractId};

    fn vector(id: &str, fill: f64) -> TractFeatureVector {
        TractFeatureVector::new(FeatureTractId::parse(id).unwrap(), [fill; FEATURE_COUNT])
    }

    fn score(id: &str, year: i32, value: f64) -> TractYearScore {
        TractYearScore {
            tract_id: ScoreTractId::parse(id).unwrap(),
            year,
            score: value,
        }
    }

    #[test]
    fn consecutive_years_become_examples_and_gaps_do_not() {
        let sources = SourceData {
            scores: vec![
                score("1121010500", 2020, 24.0),
                score("1121010500", 2017, 22.0),
                score("1121010500", 2018, 23.0),
                score("1121010500", 2021, 25.0),
            ],
            features: vec![vector("01121010500", 1.0)],
        };
        let index = TractIndex::build(&sources);
        let examples = build_training_examples(&index);

        let pairs: Vec<(i32, f64, f64)> = examples
            .iter()
            .map(|e| (e.year, e.current_score, e.next_score))
            .collect();
        // 2018 -> 2020 skips a year and must not produce an example.
        assert_eq!(pairs, vec![(2017, 22.0, 23.0), (2020, 24.0, 25.0)]);
        assert!(examples.iter().all(|e| e.features == [1.0; FEATURE_COUNT]));
    }

    #[test]
    fn single_observation_contributes_nothing() {
        let sources = SourceData {
            scores: vec![score("1121010500", 2020, 24.0)],
            features: vec![vector("01121010500", 1.0)],
        };
        let index = TractIndex::build(&sources);
        assert!(build_training_examples(&index).is_empty());
        assert_eq!(
            index
                .get(&ScoreTractId::parse("1121010500").unwrap())
                .unwrap()
                .last_observed(),
            Some((2020, 24.0))
        );
    }

    #[test]
    fn unmatched_and_ambiguous_tracts_are_excluded() {
        let sources = SourceData {
            scores: vec![
                score("1121010500", 2019, 20.0),
                score("1121010500", 2020, 21.0),
                score("1121011100", 2019, 40.0),
                score("1121011100", 2020, 41.0),
                score("9999999999", 2019, 50.0),
                score("9999999999", 2020, 51.0),
            ],
            features: vec![
                vector("01121010500", 1.0),
                vector("01121011100", 2.0),
                vector("11121011100", 3.0),
            ],
        };
        let index = TractIndex::build(&sources);
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.exclusions,
            vec![
                JoinExclusion {
                    tract: ScoreTractId::parse("1121011100").unwrap(),
                    reason: ExclusionReason::AmbiguousFeatureRows(vec![
                        "01121011100".to_string(),
                        "11121011100".to_string(),
                    ]),
                },
                JoinExclusion {
                    tract: ScoreTractId::parse("9999999999").unwrap(),
                    reason: ExclusionReason::NoFeatureRow,
                },
            ]
        );
        let examples = build_training_examples(&index);
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].tract_id.as_str(), "1121010500");

        let ambiguous = ScoreTractId::parse("1121011100").unwrap();
        assert!(matches!(
            index.exclusion(&ambiguous).map(|e| &e.reason),
            Some(ExclusionReason::AmbiguousFeatureRows(_))
        ));
        assert!(index.exclusion(&ScoreTractId::parse("1121010500").unwrap()).is_none());
    }
}
