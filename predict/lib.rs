#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

pub mod artifact;
pub mod bands;
pub mod config;
pub mod data;
pub mod features;
pub mod inference;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod report;

#[cfg(test)]
mod test_fixtures;

pub use artifact::{ArtifactError, ModelArtifact};
pub use bands::{ELIGIBILITY_THRESHOLD, GpaBand, is_eligible};
pub use config::{InputSchema, NormalizationMode, PipelineConfig};
pub use data::{DataError, read_table};
pub use features::{SchemaError, Student, WideTable, build_features};
pub use inference::InferenceError;
pub use model::{Regressor, Scorer};
pub use normalize::{ColumnStats, FeatureMatrix, MeanSource, normalize};
pub use pipeline::{PipelineError, Predictor};
pub use report::{PredictionReport, PredictionResult, ReportError, ReportSummary};
