//! Derived metadata
//!
//! Turns the raw record store into `meta_projected.jsonl`: one row per id
//! (first occurrence wins), with coordinates in the tile CRS and the
//! capture time normalized to UTC.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::crs::Projection;
use crate::record::{ProjectedRecord, Record};
use crate::store::{read_jsonl, write_jsonl, StoreError};

/// Errors from the derive step.
#[derive(Debug, Error)]
pub enum DeriveError {
    /// No usable rows in the input.
    #[error("no valid records in {0}")]
    Empty(PathBuf),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Row counts of a derive run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeriveStats {
    /// Rows read from the input.
    pub read: usize,
    /// Rows written after dedup.
    pub written: usize,
}

/// Projects records into the planar CRS, keeping the first row per id.
pub fn project_records(records: Vec<Record>, projection: &dyn Projection) -> Vec<ProjectedRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .map(|record| {
            let (x, y) = projection.forward(record.lon, record.lat);
            let captured_at_utc = record.captured_at_utc();
            ProjectedRecord {
                record,
                x,
                y,
                captured_at_utc,
            }
        })
        .collect()
}

/// Reads `input`, projects it and writes `output` atomically.
pub fn derive_file(
    input: &Path,
    output: &Path,
    projection: &dyn Projection,
) -> Result<DeriveStats, DeriveError> {
    let records: Vec<Record> = read_jsonl(input)?;
    let read = records.len();
    let projected = project_records(records, projection);
    if projected.is_empty() {
        return Err(DeriveError::Empty(input.to_path_buf()));
    }

    write_jsonl(output, &projected)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        read,
        written = projected.len(),
        crs = %projection.crs_tag(),
        "Derived projected metadata"
    );
    Ok(DeriveStats {
        read,
        written: projected.len(),
    })
}
