//! Clean subset construction.

use std::path::Path;

use tracing::{debug, info, warn};

use super::FilterError;
use crate::acquisition::image_path;
use crate::record::{is_safe_id, AnnotatedRecord};
use crate::store::{read_jsonl, write_jsonl};

/// How clean images are materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    Symlink,
    Copy,
}

impl Default for LinkMode {
    fn default() -> Self {
        if cfg!(unix) {
            LinkMode::Symlink
        } else {
            LinkMode::Copy
        }
    }
}

/// Result of the clean step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanOutcome {
    /// Rows read from the annotated file.
    pub total: usize,
    /// Rows written to the clean file.
    pub clean: usize,
    /// Thumbnails linked into the clean image directory.
    pub images_linked: usize,
    /// Full-size images linked into the clean image directory.
    pub images_full_linked: usize,
}

/// Writes the clean rows of `annotated` to `output`.
///
/// Returns the number of rows read and the clean rows in file order.
pub fn write_clean_subset(
    annotated: &Path,
    output: &Path,
) -> Result<(usize, Vec<AnnotatedRecord>), FilterError> {
    let rows: Vec<AnnotatedRecord> = read_jsonl(annotated)?;
    let total = rows.len();
    let clean: Vec<AnnotatedRecord> = rows.into_iter().filter(|r| r.is_clean).collect();
    write_jsonl(output, &clean)?;
    info!(output = %output.display(), total, clean = clean.len(), "Wrote clean subset");
    Ok((total, clean))
}

/// Links `<src>/<id>.jpg` into `dst` for every id whose image exists.
///
/// Missing source directories link nothing. Existing links are kept.
pub fn link_images<'a>(
    src: &Path,
    dst: &Path,
    ids: impl IntoIterator<Item = &'a str>,
    mode: LinkMode,
) -> Result<usize, FilterError> {
    if !src.is_dir() {
        return Ok(0);
    }
    std::fs::create_dir_all(dst).map_err(|e| FilterError::Link {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let mut linked = 0;
    for id in ids {
        if !is_safe_id(id) {
            warn!(id, "Skipping image link for unsafe id");
            continue;
        }
        let from = image_path(src, id);
        let to = image_path(dst, id);
        if !from.exists() {
            continue;
        }
        if to.symlink_metadata().is_ok() {
            linked += 1;
            continue;
        }
        materialize(&from, &to, mode).map_err(|e| FilterError::Link {
            path: to.clone(),
            source: e,
        })?;
        linked += 1;
    }
    debug!(src = %src.display(), dst = %dst.display(), linked, "Linked clean images");
    Ok(linked)
}

fn materialize(from: &Path, to: &Path, mode: LinkMode) -> std::io::Result<()> {
    match mode {
        #[cfg(unix)]
        LinkMode::Symlink => {
            let target = std::fs::canonicalize(from)?;
            std::os::unix::fs::symlink(target, to)
        }
        #[cfg(not(unix))]
        LinkMode::Symlink => std::fs::copy(from, to).map(|_| ()),
        LinkMode::Copy => std::fs::copy(from, to).map(|_| ()),
    }
}
