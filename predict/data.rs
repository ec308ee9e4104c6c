//! # Table Input
//!
//! Reads an uploaded mark sheet from disk into a `polars` `DataFrame`. This is the
//! only place that touches files on the input side; the pipeline itself receives an
//! already-parsed frame.
//!
//! - Every column is read as text. Identifiers such as `00412` must survive untouched,
//!   and mark coercion (with non-numeric cells becoming missing) is the Feature
//!   Builder's job, not the CSV parser's.
//! - The separator follows the file extension: `.tsv` and `.tab` are tab separated,
//!   everything else is comma separated.

use log::debug;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("Could not open input table '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "Input '{0}' is not a CSV or TSV file. Export spreadsheets to CSV before uploading."
    )]
    UnsupportedFormat(PathBuf),
}

/// The delimiter used for `path`, or `None` when the extension is not a delimited
/// text format.
pub fn separator_for(path: &Path) -> Option<u8> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("tsv") | Some("tab") => Some(b'\t'),
        Some("csv") | Some("txt") | None => Some(b','),
        Some(_) => None,
    }
}

/// Reads a delimited mark sheet with a header row. All columns come back as strings.
pub fn read_table(path: impl AsRef<Path>) -> Result<DataFrame, DataError> {
    let path = path.as_ref();
    let separator =
        separator_for(path).ok_or_else(|| DataError::UnsupportedFormat(path.to_path_buf()))?;

    let file = File::open(path).map_err(|source| DataError::IoError {
        path: path.to_path_buf(),
        source,
    })?;

    let df = CsvReader::new(file)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(0))
                .with_parse_options(CsvParseOptions::default().with_separator(separator)),
        )
        .finish()?;

    debug!(
        "Read {} rows and {} columns from '{}'",
        df.height(),
        df.width(),
        path.display()
    );
    Ok(df)
}
