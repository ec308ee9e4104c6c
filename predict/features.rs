//! # Feature Builder
//!
//! Turns a long-format mark sheet (one row per student, course and mark) into a wide
//! table with one row per student and one column per course. The steps run in a fixed
//! order and each one is exposed on its own:
//!
//! 1. `extract_records`: project the four declared columns and coerce their types.
//! 2. `impute_global_median`: fill missing marks with the median of every numeric mark
//!    in the input, including rows that step 1 could not key.
//! 3. `deduplicate`: keep the first record for each `(student_id, course_code)`.
//! 4. `pivot`: reshape into a `WideTable`.
//!
//! `build_features` runs all of them. Matching the wide table against the model's
//! feature columns happens later, in the normalizer.

use crate::config::InputSchema;
use ahash::{AHashMap, AHashSet};
use log::{debug, warn};
use polars::prelude::*;
use thiserror::Error;

/// One student-course-mark row after type coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub student_id: String,
    pub student_name: String,
    pub course_code: String,
    /// `None` when the cell was empty, non-numeric or non-finite.
    pub mark: Option<f64>,
}

/// The identity carried alongside every feature row. Never used as a feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    pub student_id: String,
    pub student_name: String,
}

/// The pivoted marks: students in first-seen order, courses in first-seen order.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    students: Vec<Student>,
    courses: Vec<String>,
    course_index: AHashMap<String, usize>,
    /// One column per course, each `students.len()` long.
    marks: Vec<Vec<Option<f64>>>,
    global_median: Option<f64>,
}

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error(
        "The required column '{0}' was not found in the input table. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
}

impl WideTable {
    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn n_students(&self) -> usize {
        self.students.len()
    }

    /// Every course code seen in the input, whether or not the model uses it.
    pub fn courses(&self) -> &[String] {
        &self.courses
    }

    /// The marks of one course, aligned with `students()`.
    pub fn column(&self, course: &str) -> Option<&[Option<f64>]> {
        self.course_index
            .get(course)
            .map(|&j| self.marks[j].as_slice())
    }

    pub fn mark(&self, student: usize, course: &str) -> Option<f64> {
        self.column(course).and_then(|col| col.get(student).copied().flatten())
    }

    /// The median used to fill missing marks before pivoting, if any mark was numeric.
    pub fn global_median(&self) -> Option<f64> {
        self.global_median
    }
}

/// Runs the full long-to-wide transformation.
pub fn build_features(df: &DataFrame, schema: &InputSchema) -> Result<WideTable, SchemaError> {
    let mut records = extract_records(df, schema)?;
    let median = input_median(df, schema)?;
    if let Some(median) = median {
        impute_global_median(&mut records, median);
    }
    let records = deduplicate(records);
    let mut table = pivot(records);
    table.global_median = median;
    Ok(table)
}

/// Projects the declared columns and coerces them: identifiers and course codes to
/// text, marks to `f64` with anything unparseable treated as missing.
///
/// Rows without an id, name or course cannot be placed in the pivot and are skipped.
pub fn extract_records(
    df: &DataFrame,
    schema: &InputSchema,
) -> Result<Vec<RawRecord>, SchemaError> {
    let present: AHashSet<&str> = df.get_column_names().into_iter().map(|c| c.as_str()).collect();
    for required in schema.required_columns() {
        if !present.contains(required) {
            return Err(SchemaError::ColumnNotFound(required.to_string()));
        }
    }

    let ids = text_column(df, &schema.student_id)?;
    let names = text_column(df, &schema.student_name)?;
    let courses = text_column(df, &schema.course_code)?;
    let marks = numeric_column(df, &schema.mark)?;

    let mut records = Vec::with_capacity(df.height());
    let mut skipped = 0usize;
    for (((id, name), course), mark) in ids.into_iter().zip(names).zip(courses).zip(marks) {
        match (id, name, course) {
            (Some(student_id), Some(student_name), Some(course_code)) => {
                records.push(RawRecord {
                    student_id,
                    student_name,
                    course_code,
                    mark,
                })
            }
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Skipped {skipped} rows with a missing student id, name or course code");
    }
    debug!("Extracted {} mark records", records.len());
    Ok(records)
}

/// The median of every numeric mark in the input, or `None` when no mark is numeric.
/// Rows later skipped for a missing key still contribute their mark.
pub fn input_median(df: &DataFrame, schema: &InputSchema) -> Result<Option<f64>, SchemaError> {
    let marks = numeric_column(df, &schema.mark)?;
    let observed = Float64Chunked::from_iter_values("mark".into(), marks.into_iter().flatten());
    Ok(observed.median())
}

/// Replaces every missing mark with `median`. Returns how many marks were filled.
pub fn impute_global_median(records: &mut [RawRecord], median: f64) -> usize {
    let mut filled = 0usize;
    for record in records.iter_mut().filter(|r| r.mark.is_none()) {
        record.mark = Some(median);
        filled += 1;
    }
    if filled > 0 {
        debug!("Filled {filled} missing marks with the input median {median}");
    }
    filled
}

/// Keeps the first record for each `(student_id, course_code)`, preserving order.
pub fn deduplicate(mut records: Vec<RawRecord>) -> Vec<RawRecord> {
    let before = records.len();
    let mut seen: AHashSet<(String, String)> = AHashSet::with_capacity(before);
    records.retain(|r| seen.insert((r.student_id.clone(), r.course_code.clone())));

    if records.len() < before {
        debug!(
            "Dropped {} duplicate (student, course) records",
            before - records.len()
        );
    }
    records
}

/// Reshapes deduplicated records into one row per student.
///
/// Students are keyed by id. The first name seen for an id is canonical; later rows
/// carrying a different name are merged into the same student.
pub fn pivot(records: Vec<RawRecord>) -> WideTable {
    let mut students: Vec<Student> = Vec::new();
    let mut student_index: AHashMap<String, usize> = AHashMap::new();
    let mut courses: Vec<String> = Vec::new();
    let mut course_index: AHashMap<String, usize> = AHashMap::new();
    let mut cells: Vec<(usize, usize, Option<f64>)> = Vec::with_capacity(records.len());
    let mut name_conflicts = 0usize;

    for record in records {
        let row = match student_index.get(&record.student_id) {
            Some(&row) => {
                if students[row].student_name != record.student_name {
                    debug!(
                        "Student '{}' also appears as '{}'; keeping '{}'",
                        record.student_id, record.student_name, students[row].student_name
                    );
                    name_conflicts += 1;
                }
                row
            }
            None => {
                let row = students.len();
                student_index.insert(record.student_id.clone(), row);
                students.push(Student {
                    student_id: record.student_id,
                    student_name: record.student_name,
                });
                row
            }
        };

        let col = match course_index.get(&record.course_code) {
            Some(&col) => col,
            None => {
                let col = courses.len();
                course_index.insert(record.course_code.clone(), col);
                courses.push(record.course_code);
                col
            }
        };

        cells.push((row, col, record.mark));
    }

    if name_conflicts > 0 {
        warn!(
            "{name_conflicts} records carried a different name for an already-seen student id; the first-seen name was kept"
        );
    }

    let mut marks = vec![vec![None; students.len()]; courses.len()];
    for (row, col, mark) in cells {
        marks[col][row] = mark;
    }

    WideTable {
        students,
        courses,
        course_index,
        marks,
        global_median: None,
    }
}

fn text_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, SchemaError> {
    let casted = df.column(name)?.cast(&DataType::String)?;
    Ok(casted
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, SchemaError> {
    // Exported sheets pad cells with spaces; trim before the non-strict cast, which
    // turns anything unparseable into null.
    let text = df.column(name)?.cast(&DataType::String)?;
    let trimmed: StringChunked = text.str()?.into_iter().map(|v| v.map(str::trim)).collect();
    let casted = trimmed.into_series().cast(&DataType::Float64)?;
    Ok(casted
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}
