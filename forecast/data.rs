//! # Data Loading and Validation Module
//!
//! This module is the exclusive entry point for the two source tables: the
//! per-tract-per-year score table and the per-tract feature table. It reads
//! them with `polars`, validates every row against a strict schema, and
//! produces the typed collections the rest of the pipeline consumes.
//!
//! - Strict Schema: column names are fixed. The score table must carry
//!   `Census Tract FIPS code`, `Year` and `Inclusive Growth Score`; the feature
//!   table must carry `tract_fips` and the thirteen feature columns.
//! - Text First: schema inference is disabled so every cell arrives as text.
//!   Tract codes therefore keep their leading zeros, and numeric parsing
//!   happens here, where a failure can be attributed to a row and column.
//! - Batch Reporting: row-level problems are collected into a
//!   [`ValidationReport`] instead of stopping at the first one.

use crate::config::MissingFeaturePolicy;
use crate::types::{
    FEATURE_COUNT, FeatureName, FeatureTractId, SCORE_RANGE, ScoreTractId, TractFeatureVector,
    TractYearScore,
};
use polars::prelude::*;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

pub const SCORE_TRACT_COLUMN: &str = "Census Tract FIPS code";
pub const SCORE_YEAR_COLUMN: &str = "Year";
pub const SCORE_VALUE_COLUMN: &str = "Inclusive Growth Score";
pub const FEATURE_TRACT_COLUMN: &str = "tract_fips";

/// Years outside this inclusive window are treated as data-entry errors.
pub const PLAUSIBLE_YEARS: (i32, i32) = (2000, 2100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Scores,
    Features,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKind::Scores => f.write_str("score table"),
            TableKind::Features => f.write_str("feature table"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViolationKind {
    MalformedTractId { value: String, expected_width: usize },
    MissingValue,
    NotNumeric { value: String },
    NonFinite,
    OutOfRange { value: f64, min: f64, max: f64 },
    SuspiciousYear { year: i64 },
    DuplicateTractYear { tract: String, year: i32, first_row: usize },
    DuplicateTract { tract: String, first_row: usize },
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::MalformedTractId {
                value,
                expected_width,
            } => write!(
                f,
                "tract id '{value}' is not exactly {expected_width} digits"
            ),
            ViolationKind::MissingValue => f.write_str("value is missing"),
            ViolationKind::NotNumeric { value } => write!(f, "'{value}' is not a number"),
            ViolationKind::NonFinite => f.write_str("value is not finite"),
            ViolationKind::OutOfRange { value, min, max } => {
                write!(f, "{value} is outside [{min}, {max}]")
            }
            ViolationKind::SuspiciousYear { year } => write!(
                f,
                "year {year} is outside {}..={}",
                PLAUSIBLE_YEARS.0, PLAUSIBLE_YEARS.1
            ),
            ViolationKind::DuplicateTractYear {
                tract,
                year,
                first_row,
            } => write!(
                f,
                "tract {tract} already has a score for {year} (first seen on row {first_row})"
            ),
            ViolationKind::DuplicateTract { tract, first_row } => write!(
                f,
                "tract {tract} already appears on row {first_row}"
            ),
        }
    }
}

/// A single failed check, located by table, 1-based data row, and column.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub table: TableKind,
    pub row: usize,
    pub column: String,
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} row {}, column '{}': {}",
            self.table, self.row, self.column, self.kind
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation violation(s):", self.violations.len())?;
        for violation in &self.violations {
            write!(f, "\n  - {violation}")?;
        }
        Ok(())
    }
}

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{column}' was not found in the {table}. Please check spelling and case."
    )]
    ColumnNotFound { table: TableKind, column: String },
    #[error("{0}")]
    Validation(ValidationReport),
}

/// Both validated source tables.
#[derive(Debug, Clone)]
pub struct SourceData {
    pub scores: Vec<TractYearScore>,
    pub features: Vec<TractFeatureVector>,
}

/// Loads and validates the score table on its own.
pub fn load_scores(path: &Path) -> Result<Vec<TractYearScore>, DataError> {
    let (records, violations) = internal::read_scores(path)?;
    internal::finish(records, violations)
}

/// Loads and validates the feature table on its own.
pub fn load_features(
    path: &Path,
    policy: MissingFeaturePolicy,
) -> Result<Vec<TractFeatureVector>, DataError> {
    let (vectors, violations) = internal::read_features(path, policy)?;
    internal::finish(vectors, violations)
}

/// Loads both tables and reports the violations of both in a single report.
pub fn load_sources(
    scores_path: &Path,
    features_path: &Path,
    policy: MissingFeaturePolicy,
) -> Result<SourceData, DataError> {
    let (scores, mut violations) = internal::read_scores(scores_path)?;
    let (features, feature_violations) = internal::read_features(features_path, policy)?;
    violations.extend(feature_violations);

    let features = internal::finish(features, violations)?;
    log::info!(
        "Validated {} tract-year scores and {} feature vectors.",
        scores.len(),
        features.len()
    );
    Ok(SourceData { scores, features })
}

mod internal {
    use super::*;

    pub(super) fn finish<T>(values: Vec<T>, violations: Vec<Violation>) -> Result<Vec<T>, DataError> {
        if violations.is_empty() {
            Ok(values)
        } else {
            Err(DataError::Validation(ValidationReport { violations }))
        }
    }

    pub(super) fn read_scores(
        path: &Path,
    ) -> Result<(Vec<TractYearScore>, Vec<Violation>), DataError> {
        log::info!("Loading score table from '{}'", path.display());
        let df = read_table(path)?;
        let tracts = text_column(&df, TableKind::Scores, SCORE_TRACT_COLUMN)?;
        let years = text_column(&df, TableKind::Scores, SCORE_YEAR_COLUMN)?;
        let scores = text_column(&df, TableKind::Scores, SCORE_VALUE_COLUMN)?;

        let mut violations = Vec::new();
        let mut records = Vec::with_capacity(df.height());
        let mut first_seen: HashMap<(ScoreTractId, i32), usize> = HashMap::new();

        for (i, ((tract, year), score)) in tracts.iter().zip(&years).zip(&scores).enumerate() {
            let row = i + 1;
            let mut flag = |column: &str, outcome| {
                record(&mut violations, TableKind::Scores, row, column, outcome)
            };
            let tract_id = flag(SCORE_TRACT_COLUMN, parse_score_tract(tract.as_deref()));
            let year = flag(SCORE_YEAR_COLUMN, parse_year(year.as_deref()).map(Cell::Year));
            let score = flag(
                SCORE_VALUE_COLUMN,
                parse_bounded(score.as_deref(), SCORE_RANGE).map(Cell::Number),
            );

            let (Some(Cell::Tract(tract_id)), Some(Cell::Year(year)), Some(Cell::Number(score))) =
                (tract_id, year, score)
            else {
                continue;
            };

            match first_seen.entry((tract_id.clone(), year)) {
                Entry::Occupied(entry) => violations.push(Violation {
                    table: TableKind::Scores,
                    row,
                    column: SCORE_YEAR_COLUMN.to_string(),
                    kind: ViolationKind::DuplicateTractYear {
                        tract: tract_id.to_string(),
                        year,
                        first_row: *entry.get(),
                    },
                }),
                Entry::Vacant(entry) => {
                    entry.insert(row);
                    records.push(TractYearScore {
                        tract_id,
                        year,
                        score,
                    });
                }
            }
        }

        Ok((records, violations))
    }

    pub(super) fn read_features(
        path: &Path,
        policy: MissingFeaturePolicy,
    ) -> Result<(Vec<TractFeatureVector>, Vec<Violation>), DataError> {
        log::info!("Loading feature table from '{}'", path.display());
        let df = read_table(path)?;
        let tracts = text_column(&df, TableKind::Features, FEATURE_TRACT_COLUMN)?;
        let mut feature_columns = Vec::with_capacity(FEATURE_COUNT);
        for name in FeatureName::ALL {
            feature_columns.push(text_column(&df, TableKind::Features, name.as_str())?);
        }

        let mut violations = Vec::new();
        let mut vectors = Vec::with_capacity(df.height());
        let mut first_seen: HashMap<FeatureTractId, usize> = HashMap::new();

        for (i, tract) in tracts.iter().enumerate() {
            let row = i + 1;
            let tract_id = match parse_feature_tract(tract.as_deref()) {
                Ok(id) => Some(id),
                Err(kind) => {
                    violations.push(Violation {
                        table: TableKind::Features,
                        row,
                        column: FEATURE_TRACT_COLUMN.to_string(),
                        kind,
                    });
                    None
                }
            };

            let mut values = [0.0; FEATURE_COUNT];
            let mut imputed = Vec::new();
            let mut complete = true;
            for (name, column) in FeatureName::ALL.iter().zip(&feature_columns) {
                let cell = column[i].as_deref();
                if cell.is_none() && policy == MissingFeaturePolicy::FillZero {
                    imputed.push(*name);
                    continue;
                }
                match parse_bounded(cell, name.kind().bounds()) {
                    Ok(value) => values[name.index()] = value,
                    Err(kind) => {
                        complete = false;
                        violations.push(Violation {
                            table: TableKind::Features,
                            row,
                            column: name.as_str().to_string(),
                            kind,
                        });
                    }
                }
            }

            let Some(tract_id) = tract_id else {
                continue;
            };
            match first_seen.entry(tract_id.clone()) {
                Entry::Occupied(entry) => {
                    violations.push(Violation {
                        table: TableKind::Features,
                        row,
                        column: FEATURE_TRACT_COLUMN.to_string(),
                        kind: ViolationKind::DuplicateTract {
                            tract: tract_id.to_string(),
                            first_row: *entry.get(),
                        },
                    });
                    continue;
                }
                Entry::Vacant(entry) => {
                    entry.insert(row);
                }
            }
            if !complete {
                continue;
            }

            if !imputed.is_empty() {
                let fields: Vec<&str> = imputed.iter().map(|name| name.as_str()).collect();
                log::warn!(
                    "Feature table row {row} (tract {tract_id}): blank {} filled with 0.0",
                    fields.join(", ")
                );
            }
            let mut vector = TractFeatureVector::new(tract_id, values);
            vector.imputed = imputed;
            vectors.push(vector);
        }

        Ok((vectors, violations))
    }

    /// Parsed cell payloads, so a single closure can record any column's outcome.
    pub(super) enum Cell {
        Tract(ScoreTractId),
        Year(i32),
        Number(f64),
    }

    fn record(
        violations: &mut Vec<Violation>,
        table: TableKind,
        row: usize,
        column: &str,
        outcome: Result<Cell, ViolationKind>,
    ) -> Option<Cell> {
        match outcome {
            Ok(cell) => Some(cell),
            Err(kind) => {
                violations.push(Violation {
                    table,
                    row,
                    column: column.to_string(),
                    kind,
                });
                None
            }
        }
    }

    fn parse_score_tract(cell: Option<&str>) -> Result<Cell, ViolationKind> {
        let raw = cell.ok_or(ViolationKind::MissingValue)?;
        ScoreTractId::parse(raw)
            .map(Cell::Tract)
            .map_err(|e| ViolationKind::MalformedTractId {
                value: e.value,
                expected_width: e.expected_width,
            })
    }

    fn parse_feature_tract(cell: Option<&str>) -> Result<FeatureTractId, ViolationKind> {
        let raw = cell.ok_or(ViolationKind::MissingValue)?;
        FeatureTractId::parse(raw).map_err(|e| ViolationKind::MalformedTractId {
            value: e.value,
            expected_width: e.expected_width,
        })
    }

    /// Accepts `2019` as well as `2019.0`, which spreadsheet exports produce.
    fn parse_year(cell: Option<&str>) -> Result<i32, ViolationKind> {
        let raw = cell.ok_or(ViolationKind::MissingValue)?;
        let year = match raw.parse::<i64>() {
            Ok(year) => year,
            Err(_) => match raw.parse::<f64>() {
                Ok(value) if value.is_finite() && value.fract() == 0.0 => value as i64,
                _ => {
                    return Err(ViolationKind::NotNumeric {
                        value: raw.to_string(),
                    });
                }
            },
        };
        let (min, max) = PLAUSIBLE_YEARS;
        if year < i64::from(min) || year > i64::from(max) {
            return Err(ViolationKind::SuspiciousYear { year });
        }
        Ok(year as i32)
    }

    fn parse_bounded(cell: Option<&str>, (min, max): (f64, f64)) -> Result<f64, ViolationKind> {
        let raw = cell.ok_or(ViolationKind::MissingValue)?;
        let value = raw.parse::<f64>().map_err(|_| ViolationKind::NotNumeric {
            value: raw.to_string(),
        })?;
        if !value.is_finite() {
            return Err(ViolationKind::NonFinite);
        }
        if value < min || value > max {
            return Err(ViolationKind::OutOfRange { value, min, max });
        }
        Ok(value)
    }

    /// Reads a delimited table with every column typed as text.
    fn read_table(path: &Path) -> Result<DataFrame, DataError> {
        let separator = match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("tsv") | Some("tab") => b'\t',
            _ => b',',
        };
        let file = File::open(path)?;
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .map_parse_options(|options| options.with_separator(separator))
            .into_reader_with_file_handle(file)
            .finish()?;
        Ok(df)
    }

    /// Extracts a column as trimmed text; blank cells become `None`.
    fn text_column(
        df: &DataFrame,
        table: TableKind,
        name: &str,
    ) -> Result<Vec<Option<String>>, DataError> {
        let column = df.column(name).map_err(|_| DataError::ColumnNotFound {
            table,
            column: name.to_string(),
        })?;
        let series = column.as_materialized_series().cast(&DataType::String)?;
        let values = series.str()?;
        Ok(values
            .into_iter()
            .map(|cell| {
                cell.map(str::trim)
                    .filter(|text| !text.is_empty())
                    .map(str::to_string)
            })
            .collect())
    }
}
