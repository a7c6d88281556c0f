//! Writes validated tables back to disk in a normalized form.
//!
//! Every field is quoted so spreadsheet tools keep the leading zeros of tract
//! codes. Rows are sorted by tract, then year, and files are replaced
//! atomically. Imputed feature cells are written blank, so a reload sees the
//! same gaps the source had.

use crate::data::{
    FEATURE_TRACT_COLUMN, SCORE_TRACT_COLUMN, SCORE_VALUE_COLUMN, SCORE_YEAR_COLUMN,
};
use crate::io::write_atomically;
use crate::types::{FeatureName, TractFeatureVector, TractYearScore};
use csv::{QuoteStyle, WriterBuilder};
use std::io;
use std::path::Path;

pub fn write_cleaned_scores(path: &Path, scores: &[TractYearScore]) -> io::Result<()> {
    let mut sorted: Vec<&TractYearScore> = scores.iter().collect();
    sorted.sort_by(|a, b| (&a.tract_id, a.year).cmp(&(&b.tract_id, b.year)));

    write_atomically(path, |file| {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_writer(file);
        writer.write_record([SCORE_TRACT_COLUMN, SCORE_YEAR_COLUMN, SCORE_VALUE_COLUMN])?;
        for row in sorted {
            writer.write_record([
                row.tract_id.to_string(),
                row.year.to_string(),
                row.score.to_string(),
            ])?;
        }
        writer.flush()
    })?;
    log::info!("Wrote {} cleaned score rows to {}.", scores.len(), path.display());
    Ok(())
}

pub fn write_cleaned_features(path: &Path, features: &[TractFeatureVector]) -> io::Result<()> {
    let mut sorted: Vec<&TractFeatureVector> = features.iter().collect();
    sorted.sort_by(|a, b| a.tract_id.cmp(&b.tract_id));

    write_atomically(path, |file| {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_writer(file);
        let header = std::iter::once(FEATURE_TRACT_COLUMN)
            .chain(FeatureName::ALL.iter().map(|name| name.as_str()));
        writer.write_record(header)?;
        for vector in sorted {
            let record = std::iter::once(vector.tract_id.to_string()).chain(
                FeatureName::ALL
                    .iter()
                    .zip(vector.values())
                    .map(|(name, value)| {
                        if vector.imputed.contains(name) {
                            String::new()
                        } else {
                            value.to_string()
                        }
                    }),
            );
            writer.write_record(record)?;
        }
        writer.flush()
    })?;
    log::info!(
        "Wrote {} cleaned feature rows to {}.",
        features.len(),
        path.display()
    );
    Ok(())
}
