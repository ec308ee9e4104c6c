// =============================================================================
// The Pipeline: Raw Marks to Risk Bands
// =============================================================================
//
// raw table -> Feature Builder -> Normalizer -> Inference Engine -> Bucketizer
//           -> Result Assembler -> reporting table
//
// A `Predictor` owns a shared, read-only handle to the model artifact and the
// pipeline configuration. Each call to `run` is self-contained: it builds its own
// intermediate tables and throws them away, so any number of calls may proceed in
// parallel against the same `Predictor`. Any stage failing aborts that call only.

use crate::artifact::{ArtifactError, ModelArtifact};
use crate::config::{NormalizationMode, PipelineConfig};
use crate::features::{SchemaError, WideTable, build_features};
use crate::inference::{self, InferenceError};
use crate::normalize::{FeatureMatrix, MeanSource, normalize};
use crate::report::PredictionReport;
use log::debug;
use polars::prelude::DataFrame;
use rayon::prelude::*;
use std::sync::Arc;
use thiserror::Error;

/// The error taxonomy of one pipeline invocation. Every variant is terminal: no
/// partial report is returned.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input table error: {0}")]
    Schema(#[from] SchemaError),
    #[error("Model artifact error: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),
}

#[derive(Debug, Clone)]
pub struct Predictor {
    artifact: Arc<ModelArtifact>,
    config: PipelineConfig,
}

impl Predictor {
    /// Binds a loaded artifact to a configuration. Fails when reference normalization
    /// is requested from an artifact without stored means.
    pub fn new(artifact: Arc<ModelArtifact>, config: PipelineConfig) -> Result<Self, ArtifactError> {
        if config.normalization == NormalizationMode::Reference
            && artifact.reference_means().is_none()
        {
            return Err(ArtifactError::MissingReferenceMeans);
        }
        Ok(Self { artifact, config })
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the Feature Builder and Normalizer only, returning both intermediate forms.
    pub fn prepare(&self, raw: &DataFrame) -> Result<(WideTable, FeatureMatrix), PipelineError> {
        let wide = build_features(raw, &self.config.input)?;
        let means = match self.config.normalization {
            NormalizationMode::Batch => MeanSource::Batch,
            NormalizationMode::Reference => match self.artifact.reference_means() {
                Some(reference) => MeanSource::Reference(reference),
                None => return Err(ArtifactError::MissingReferenceMeans.into()),
            },
        };
        let features = normalize(&wide, self.artifact.feature_columns(), means);
        debug!(
            "Built a {}x{} feature matrix from {} input courses",
            features.n_rows(),
            features.columns().len(),
            wide.courses().len()
        );
        Ok((wide, features))
    }

    /// Runs the whole pipeline on one parsed input table.
    pub fn run(&self, raw: &DataFrame) -> Result<PredictionReport, PipelineError> {
        let (wide, features) = self.prepare(raw)?;
        let scores = inference::predict(
            self.artifact.scorer(),
            self.artifact.feature_columns(),
            &features,
        )?;
        Ok(PredictionReport::assemble(wide.students(), scores.view())?)
    }

    /// Runs several independent inputs in parallel. Results are returned in input
    /// order; one failure does not affect the others.
    pub fn run_many(&self, inputs: &[DataFrame]) -> Vec<Result<PredictionReport, PipelineError>> {
        inputs.par_iter().map(|raw| self.run(raw)).collect()
    }
}
