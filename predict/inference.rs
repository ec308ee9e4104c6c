//! # Inference Engine
//!
//! Applies a scorer to a normalized feature matrix. Stateless: the same matrix and
//! scorer always give the same scores, in the same row order.

use crate::model::Scorer;
use crate::normalize::FeatureMatrix;
use log::debug;
use ndarray::Array1;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum InferenceError {
    #[error(
        "Feature column {position} is '{found}', but the model expects '{expected}'. The feature matrix does not follow the model's column order."
    )]
    ColumnMismatch {
        position: usize,
        found: String,
        expected: String,
    },
    #[error("Feature matrix has {found} columns, but the model was trained on {expected}.")]
    MismatchedFeatureCount { found: usize, expected: usize },
    #[error("The model returned {found} scores for {expected} students.")]
    MismatchedRowCount { found: usize, expected: usize },
    #[error("The model produced a non-finite score for row {row}.")]
    NonFiniteScore { row: usize },
}

/// Scores every row of `features`.
///
/// `expected_columns` is the column list the scorer was trained on. The matrix must
/// carry exactly these names in this order, and its width must match the scorer.
pub fn predict(
    scorer: &dyn Scorer,
    expected_columns: &[String],
    features: &FeatureMatrix,
) -> Result<Array1<f64>, InferenceError> {
    let found = features.columns();
    if found.len() != expected_columns.len() {
        return Err(InferenceError::MismatchedFeatureCount {
            found: found.len(),
            expected: expected_columns.len(),
        });
    }
    if let Some(position) = found
        .iter()
        .zip(expected_columns)
        .position(|(f, e)| f != e)
    {
        return Err(InferenceError::ColumnMismatch {
            position,
            found: found[position].clone(),
            expected: expected_columns[position].clone(),
        });
    }

    let x = features.values();
    if x.ncols() != scorer.n_features() {
        return Err(InferenceError::MismatchedFeatureCount {
            found: x.ncols(),
            expected: scorer.n_features(),
        });
    }

    let scores = scorer.predict(x);
    if scores.len() != x.nrows() {
        return Err(InferenceError::MismatchedRowCount {
            found: scores.len(),
            expected: x.nrows(),
        });
    }
    if let Some(row) = scores.iter().position(|s| !s.is_finite()) {
        return Err(InferenceError::NonFiniteScore { row });
    }

    debug!("Scored {} students", scores.len());
    Ok(scores)
}
