//! Pipeline configuration.
//!
//! The defaults reproduce the standard upload layout (`Emplid, Name, Course, Mark`)
//! and batch-relative normalization, so a config file is only needed to deviate.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The declared names of the four columns the Feature Builder reads. Header matching
/// is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSchema {
    pub student_id: String,
    pub student_name: String,
    pub course_code: String,
    pub mark: String,
}

impl Default for InputSchema {
    fn default() -> Self {
        Self {
            student_id: "Emplid".to_string(),
            student_name: "Name".to_string(),
            course_code: "Course".to_string(),
            mark: "Mark".to_string(),
        }
    }
}

impl InputSchema {
    /// Column names in projection order: id, name, course, mark.
    pub fn required_columns(&self) -> [&str; 4] {
        [
            self.student_id.as_str(),
            self.student_name.as_str(),
            self.course_code.as_str(),
            self.mark.as_str(),
        ]
    }
}

/// Where the per-column mean used for imputation and scaling comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMode {
    /// Re-derive each mean from the non-missing marks of the current batch.
    #[default]
    Batch,
    /// Use the training-time means stored in the model artifact.
    Reference,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub input: InputSchema,
    pub normalization: NormalizationMode,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

impl PipelineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}
