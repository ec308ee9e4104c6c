//! # Normalizer
//!
//! Forces the wide table into the model's input contract and rescales it.
//!
//! The output has exactly the artifact's feature columns, in order. Courses the model
//! was not trained on are dropped; feature columns absent from the input are treated
//! as entirely missing. Each column is then scaled independently relative to its
//! mean: `(value - mean) / mean`, with missing entries first imputed to the mean.
//!
//! Two situations have no usable mean: a column with no observed values (in batch
//! mode) and a column whose mean is exactly zero. Both produce a column of zeros
//! rather than an error or NaN, so one pathological course cannot sink a batch.

use crate::features::WideTable;
use ahash::AHashSet;
use itertools::Itertools;
use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Where the per-column mean comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeanSource<'a> {
    /// Re-derived from the non-missing values of the current batch.
    Batch,
    /// Training-time means, aligned with the feature columns.
    Reference(&'a [f64]),
}

/// What the normalizer did to one feature column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStats {
    pub name: String,
    /// The mean used for imputation and scaling. `None` when no mean was available.
    pub mean: Option<f64>,
    /// Number of students with a mark for this course.
    pub observed: usize,
    /// Number of students whose mark was imputed.
    pub imputed: usize,
}

/// The model-ready matrix: one row per student, one column per feature, no gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    values: Array2<f64>,
    stats: Vec<ColumnStats>,
}

impl FeatureMatrix {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Shape `[n_students, n_features]`.
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn stats(&self) -> &[ColumnStats] {
        &self.stats
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|j| self.values.column(j))
    }
}

/// Builds the feature matrix for `feature_columns` from the pivoted marks.
pub fn normalize(
    table: &WideTable,
    feature_columns: &[String],
    means: MeanSource<'_>,
) -> FeatureMatrix {
    if let MeanSource::Reference(reference) = means {
        debug_assert_eq!(reference.len(), feature_columns.len());
    }

    let n = table.n_students();
    let mut values = Array2::zeros((n, feature_columns.len()));
    let mut stats = Vec::with_capacity(feature_columns.len());

    for (j, name) in feature_columns.iter().enumerate() {
        let marks: Vec<Option<f64>> = match table.column(name) {
            Some(column) => column.to_vec(),
            None => vec![None; n],
        };
        let observed = marks.iter().filter(|m| m.is_some()).count();

        let mean = match means {
            MeanSource::Batch => batch_mean(&marks),
            MeanSource::Reference(reference) => reference.get(j).copied(),
        };

        let scaled = scale_column(&marks, mean);
        values.column_mut(j).assign(&scaled);

        match mean {
            None => debug!("Feature '{name}' has no observed marks; normalized to 0"),
            Some(m) if m == 0.0 => debug!("Feature '{name}' has zero mean; normalized to 0"),
            Some(_) => {}
        }

        stats.push(ColumnStats {
            name: name.clone(),
            mean,
            observed,
            imputed: n - observed,
        });
    }

    let known: AHashSet<&str> = feature_columns.iter().map(String::as_str).collect();
    let dropped: Vec<&String> = table
        .courses()
        .iter()
        .filter(|c| !known.contains(c.as_str()))
        .collect();
    if !dropped.is_empty() {
        debug!(
            "Dropped {} input courses that are not model features: {}",
            dropped.len(),
            dropped.iter().join(", ")
        );
    }

    FeatureMatrix {
        columns: feature_columns.to_vec(),
        values,
        stats,
    }
}

/// Mean of the observed entries, or `None` when nothing was observed.
fn batch_mean(marks: &[Option<f64>]) -> Option<f64> {
    let observed: Array1<f64> = marks.iter().flatten().copied().collect();
    observed.mean()
}

/// Imputes missing entries with `mean` and applies `(x - mean) / mean`. Without a
/// usable mean the whole column is zero.
fn scale_column(marks: &[Option<f64>], mean: Option<f64>) -> Array1<f64> {
    match mean {
        Some(m) if m != 0.0 => marks
            .iter()
            .map(|mark| (mark.unwrap_or(m) - m) / m)
            .collect(),
        _ => Array1::zeros(marks.len()),
    }
}
