//! Append-only record store and dedup set
//!
//! `meta.jsonl` is the single source of truth for what has been ingested
//! for a tile. The [`DedupSet`] is rebuilt from it when the store is opened,
//! so the two can never disagree after a crash: a record is either a whole
//! flushed line (and therefore in the set on the next run) or absent.
//!
//! A torn final line left by an interrupted write is skipped on load and
//! the next append starts on a fresh line.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::record::Record;

/// Errors from record persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Set of ingested record ids for one tile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupSet {
    ids: HashSet<String>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an id, returning `true` if it was not present.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        self.ids.insert(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Deserialize)]
struct IdOnly {
    id: serde_json::Value,
}

/// Append-only JSONL store of records with its dedup set.
///
/// The store is the sole writer for its file.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    file: File,
    dedup: DedupSet,
}

impl RecordStore {
    /// Opens (or creates) the store and loads the dedup set.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(&path, e))?;
        }

        let dedup = load_ids(&path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;
        terminate_torn_line(&mut file).map_err(|e| StoreError::io(&path, e))?;

        if !dedup.is_empty() {
            debug!(path = %path.display(), existing = dedup.len(), "Loaded existing record ids");
        }

        Ok(Self { path, file, dedup })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dedup(&self) -> &DedupSet {
        &self.dedup
    }

    /// True when the id has already been stored.
    pub fn contains(&self, id: &str) -> bool {
        self.dedup.contains(id)
    }

    /// Appends a record unless its id is known.
    ///
    /// Returns `false` for duplicates. The line is flushed before the id
    /// enters the dedup set.
    pub fn append(&mut self, record: &Record) -> Result<bool, StoreError> {
        if self.dedup.contains(&record.id) {
            return Ok(false);
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .and_then(|_| self.file.flush())
            .map_err(|e| StoreError::io(&self.path, e))?;

        self.dedup.insert(&record.id);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.dedup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dedup.is_empty()
    }
}

fn load_ids(path: &Path) -> Result<DedupSet, StoreError> {
    let mut dedup = DedupSet::new();
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(dedup),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let mut skipped = 0usize;
    for line in BufReader::new(file).split(b'\n') {
        let line = line.map_err(|e| StoreError::io(path, e))?;
        if is_blank(&line) {
            continue;
        }
        let id = serde_json::from_slice::<IdOnly>(&line)
            .ok()
            .and_then(|r| match r.id {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        match id {
            Some(id) => {
                dedup.insert(&id);
            }
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(path = %path.display(), skipped, "Skipped unreadable lines in record store");
    }
    Ok(dedup)
}

// Lines are raw bytes: a write torn inside a multi-byte character is
// invalid UTF-8 and must count as an unparseable line, not an I/O error.
fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

fn terminate_torn_line(file: &mut File) -> std::io::Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        file.write_all(b"\n")?;
        file.flush()?;
    }
    Ok(())
}

/// Reads every parseable line of a JSONL file.
///
/// Blank and unparseable lines are skipped with a warning.
pub fn read_jsonl<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>, StoreError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| StoreError::io(path, e))?;

    let mut out = Vec::new();
    let mut skipped = 0usize;
    for line in BufReader::new(file).split(b'\n') {
        let line = line.map_err(|e| StoreError::io(path, e))?;
        if is_blank(&line) {
            continue;
        }
        match serde_json::from_slice(&line) {
            Ok(v) => out.push(v),
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(path = %path.display(), skipped, "Skipped unparseable JSONL lines");
    }
    Ok(out)
}

/// Writes a JSONL file atomically (temp file, then rename).
pub fn write_jsonl<T: Serialize>(path: impl AsRef<Path>, rows: &[T]) -> Result<(), StoreError> {
    let path = path.as_ref();
    let mut buf = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut buf, row)?;
        buf.push(b'\n');
    }
    write_atomic(path, &buf)
}

/// Writes bytes to `path` via `<path>.tmp` and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::io(path, e))?;
    }

    // Write to temp file first, then rename for atomicity
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    std::fs::write(&temp, bytes).map_err(|e| StoreError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| StoreError::io(path, e))?;
    Ok(())
}
