//! # Result Assembler
//!
//! Joins each student's identity with their score, band and eligibility, and renders
//! the result as a table for downstream reporting. Scores are kept unrounded; rounding
//! to three decimals only happens for display.

use crate::bands::{GpaBand, is_eligible};
use crate::features::Student;
use crate::inference::InferenceError;
use ndarray::ArrayView1;
use polars::prelude::*;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Header of the results table, in column order.
pub const OUTPUT_COLUMNS: [&str; 4] = ["Emplid", "Name", "Estimated GPA Range", "Predicted GPA"];

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub student_id: String,
    pub student_name: String,
    /// The unrounded model output. Bucketing always uses this value.
    pub score: f64,
    pub band: GpaBand,
    pub eligible: bool,
}

impl PredictionResult {
    pub fn new(student: &Student, score: f64) -> Self {
        Self {
            student_id: student.student_id.clone(),
            student_name: student.student_name.clone(),
            score,
            band: GpaBand::from_score(score),
            eligible: is_eligible(score),
        }
    }

    /// The score rounded to three decimal places.
    pub fn display_score(&self) -> f64 {
        (self.score * 1000.0).round() / 1000.0
    }
}

/// The reporting table: one row per student, in Feature Builder order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PredictionReport {
    rows: Vec<PredictionResult>,
}

/// Counts behind the eligible/at-risk chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSummary {
    pub eligible: usize,
    pub at_risk: usize,
    /// Every band in ascending order, including empty ones.
    pub by_band: Vec<(GpaBand, usize)>,
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("Failed to write report '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize report to JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// One JSON record. Carries the same columns as the table plus the flag and the raw
/// score.
#[derive(Serialize)]
struct ReportRecord<'a> {
    #[serde(rename = "Emplid")]
    student_id: &'a str,
    #[serde(rename = "Name")]
    student_name: &'a str,
    #[serde(rename = "Estimated GPA Range")]
    band: GpaBand,
    #[serde(rename = "Predicted GPA")]
    predicted_gpa: f64,
    #[serde(rename = "Eligible")]
    eligible: bool,
    #[serde(rename = "Score")]
    score: f64,
}

impl PredictionReport {
    /// Pairs students with their scores. Both must be in the same order and of the
    /// same length; no row is added or dropped.
    pub fn assemble(
        students: &[Student],
        scores: ArrayView1<'_, f64>,
    ) -> Result<Self, InferenceError> {
        if students.len() != scores.len() {
            return Err(InferenceError::MismatchedRowCount {
                found: scores.len(),
                expected: students.len(),
            });
        }
        let rows = students
            .iter()
            .zip(scores.iter())
            .map(|(student, &score)| PredictionResult::new(student, score))
            .collect();
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[PredictionResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The students below the eligibility threshold, in report order.
    pub fn at_risk(&self) -> PredictionReport {
        PredictionReport {
            rows: self.rows.iter().filter(|r| !r.eligible).cloned().collect(),
        }
    }

    pub fn summary(&self) -> ReportSummary {
        let eligible = self.rows.iter().filter(|r| r.eligible).count();
        let by_band = GpaBand::ALL
            .iter()
            .map(|&band| (band, self.rows.iter().filter(|r| r.band == band).count()))
            .collect();
        ReportSummary {
            eligible,
            at_risk: self.rows.len() - eligible,
            by_band,
        }
    }

    /// The four-column results table.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let ids: Vec<&str> = self.rows.iter().map(|r| r.student_id.as_str()).collect();
        let names: Vec<&str> = self.rows.iter().map(|r| r.student_name.as_str()).collect();
        let bands: Vec<&str> = self.rows.iter().map(|r| r.band.label()).collect();
        let gpas: Vec<f64> = self.rows.iter().map(PredictionResult::display_score).collect();
        df!(
            OUTPUT_COLUMNS[0] => ids,
            OUTPUT_COLUMNS[1] => names,
            OUTPUT_COLUMNS[2] => bands,
            OUTPUT_COLUMNS[3] => gpas
        )
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let path = path.as_ref();
        let mut df = self.to_dataframe()?;
        let mut file = create(path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)?;
        file.flush().map_err(|source| ReportError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let path = path.as_ref();
        let records: Vec<ReportRecord<'_>> = self
            .rows
            .iter()
            .map(|r| ReportRecord {
                student_id: &r.student_id,
                student_name: &r.student_name,
                band: r.band,
                predicted_gpa: r.display_score(),
                eligible: r.eligible,
                score: r.score,
            })
            .collect();
        let mut file = create(path)?;
        serde_json::to_writer_pretty(&mut file, &records)?;
        file.flush().map_err(|source| ReportError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}

fn create(path: &Path) -> Result<BufWriter<File>, ReportError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| ReportError::IoError {
            path: path.to_path_buf(),
            source,
        })
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Eligible GPA: {}", self.eligible)?;
        write!(f, "At-Risk GPA: {}", self.at_risk)?;
        for (band, count) in &self.by_band {
            write!(f, "\n  {band}: {count}")?;
        }
        Ok(())
    }
}
