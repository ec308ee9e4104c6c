//! # Model Artifact Loader
//!
//! A model artifact is the single, self-contained hand-off from the training side: a
//! fitted regressor plus the ordered list of course codes it was trained on. It is
//! stored as human-readable TOML with one fixed, tagged schema and validated in full
//! at load time, so every later stage can trust its shape.
//!
//! The artifact is immutable once built. Callers load it once and share it behind an
//! `Arc` across every pipeline invocation.

use crate::model::{ModelError, Regressor, Scorer};
use ahash::AHashSet;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The only artifact layout this crate reads and writes.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// The label column the training side may leave in `subject_cols`.
const DEFAULT_TARGET_COLUMN: &str = "GPA";

/// The on-disk schema. Field order matters for TOML output: plain values first, then
/// tables.
#[derive(Debug, Serialize, Deserialize)]
struct ArtifactFile {
    format_version: u32,
    subject_cols: Vec<String>,
    #[serde(default = "default_target_column")]
    target_column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reference_means: Option<BTreeMap<String, f64>>,
    model: Regressor,
}

fn default_target_column() -> String {
    DEFAULT_TARGET_COLUMN.to_string()
}

/// A validated, read-only model artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    model: Regressor,
    feature_columns: Vec<String>,
    target_column: String,
    reference_means: Option<Vec<f64>>,
}

/// Everything that can go wrong while reading, writing or validating an artifact.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to read or write model artifact '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML model artifact: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize model artifact to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Model artifact has format version {found}, but only version {supported} is supported.")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("Model artifact lists no feature columns.")]
    NoFeatureColumns,
    #[error("Feature column '{0}' appears more than once in the model artifact.")]
    DuplicateFeatureColumn(String),
    #[error("Feature column '{0}' is also the artifact's target column.")]
    TargetAmongFeatures(String),
    #[error("The model expects {model} inputs, but the artifact lists {columns} feature columns.")]
    FeatureCountMismatch { model: usize, columns: usize },
    #[error("The stored model is malformed: {0}")]
    InvalidModel(#[from] ModelError),
    #[error("Reference means are present but column '{0}' has none.")]
    MissingReferenceMean(String),
    #[error("Got {found} reference means for {expected} feature columns.")]
    ReferenceMeanCountMismatch { found: usize, expected: usize },
    #[error("Reference mean for column '{0}' is not a finite number.")]
    NonFiniteReferenceMean(String),
    #[error(
        "Reference normalization was requested, but the model artifact carries no training-time column means."
    )]
    MissingReferenceMeans,
}

impl ModelArtifact {
    /// Builds an artifact from parts, enforcing the same rules as `load`. The target
    /// column is the default `GPA`, so no feature may carry that name.
    pub fn new(model: Regressor, feature_columns: Vec<String>) -> Result<Self, ArtifactError> {
        Self::from_parts(model, feature_columns, default_target_column())
    }

    fn from_parts(
        model: Regressor,
        feature_columns: Vec<String>,
        target_column: String,
    ) -> Result<Self, ArtifactError> {
        if feature_columns.is_empty() {
            return Err(ArtifactError::NoFeatureColumns);
        }
        let mut seen = AHashSet::with_capacity(feature_columns.len());
        for column in &feature_columns {
            if !seen.insert(column.as_str()) {
                return Err(ArtifactError::DuplicateFeatureColumn(column.clone()));
            }
        }
        if seen.contains(target_column.as_str()) {
            return Err(ArtifactError::TargetAmongFeatures(target_column));
        }

        model.validate()?;
        if model.n_features() != feature_columns.len() {
            return Err(ArtifactError::FeatureCountMismatch {
                model: model.n_features(),
                columns: feature_columns.len(),
            });
        }

        Ok(Self {
            model,
            feature_columns,
            target_column,
            reference_means: None,
        })
    }

    /// Attaches training-time column means, aligned with `feature_columns`.
    pub fn with_reference_means(mut self, means: Vec<f64>) -> Result<Self, ArtifactError> {
        if means.len() != self.feature_columns.len() {
            return Err(ArtifactError::ReferenceMeanCountMismatch {
                found: means.len(),
                expected: self.feature_columns.len(),
            });
        }
        if let Some(j) = means.iter().position(|m| !m.is_finite()) {
            return Err(ArtifactError::NonFiniteReferenceMean(
                self.feature_columns[j].clone(),
            ));
        }
        self.reference_means = Some(means);
        Ok(self)
    }

    /// Loads and validates an artifact from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ArtifactError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact = Self::from_toml_str(&text)?;
        info!(
            "Loaded {} model from '{}' with {} feature columns{}",
            artifact.model.family(),
            path.display(),
            artifact.feature_columns.len(),
            if artifact.reference_means.is_some() {
                " and reference means"
            } else {
                ""
            }
        );
        Ok(artifact)
    }

    /// Parses and validates an artifact from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ArtifactError> {
        let file: ArtifactFile = toml::from_str(text)?;
        if file.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: file.format_version,
                supported: ARTIFACT_FORMAT_VERSION,
            });
        }

        let feature_columns: Vec<String> = file
            .subject_cols
            .into_iter()
            .filter(|c| *c != file.target_column)
            .collect();

        let artifact = Self::from_parts(file.model, feature_columns, file.target_column)?;
        match file.reference_means {
            None => Ok(artifact),
            Some(by_column) => {
                let means = artifact
                    .feature_columns
                    .iter()
                    .map(|c| {
                        by_column
                            .get(c)
                            .copied()
                            .ok_or_else(|| ArtifactError::MissingReferenceMean(c.clone()))
                    })
                    .collect::<Result<Vec<f64>, _>>()?;
                artifact.with_reference_means(means)
            }
        }
    }

    /// Writes the artifact in the same TOML layout `load` reads.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ArtifactError> {
        let path = path.as_ref();
        let file = ArtifactFile {
            format_version: ARTIFACT_FORMAT_VERSION,
            subject_cols: self.feature_columns.clone(),
            target_column: self.target_column.clone(),
            reference_means: self.reference_means.as_ref().map(|means| {
                self.feature_columns
                    .iter()
                    .cloned()
                    .zip(means.iter().copied())
                    .collect()
            }),
            model: self.model.clone(),
        };
        let toml_string = toml::to_string_pretty(&file)?;

        let io_error = |source| ArtifactError::IoError {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = BufWriter::new(fs::File::create(path).map_err(io_error)?);
        writer.write_all(toml_string.as_bytes()).map_err(io_error)?;
        writer.flush().map_err(io_error)?;
        Ok(())
    }

    pub fn model(&self) -> &Regressor {
        &self.model
    }

    /// The model as the inference engine sees it.
    pub fn scorer(&self) -> &dyn Scorer {
        &self.model
    }

    /// Ordered course codes forming the model's input contract. Never contains the
    /// target column.
    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    /// Training-time means aligned with `feature_columns`, if the artifact has them.
    pub fn reference_means(&self) -> Option<&[f64]> {
        self.reference_means.as_deref()
    }
}
