//! Durable record of which source files have been ingested.
//!
//! The manifest maps a path relative to the ingestion root to the file's
//! modification time in nanoseconds since the Unix epoch. A file is current
//! only when its mtime matches the stored value exactly, so even a touch
//! without content changes forces re-ingestion.
//!
//! The whole map is rewritten on every [`Manifest::persist`] via a temporary
//! sibling and an atomic rename, so calling it after each file costs at most
//! the file in progress if the process is killed.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

/// File name used when no manifest path is configured.
pub const DEFAULT_FILE_NAME: &str = "processed_files.json";

#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    entries: BTreeMap<String, i64>,
}

impl Manifest {
    /// Load the manifest at `path`. A missing file yields an empty manifest;
    /// an unreadable or corrupt one is logged and treated as empty, which
    /// re-ingests everything rather than failing the run.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "manifest is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "manifest unreadable, starting empty");
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, relative_path: &str) -> Option<i64> {
        self.entries.get(relative_path).copied()
    }

    pub fn is_current(&self, relative_path: &str, mtime: i64) -> bool {
        self.get(relative_path) == Some(mtime)
    }

    pub fn record(&mut self, relative_path: impl Into<String>, mtime: i64) {
        self.entries.insert(relative_path.into(), mtime);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &BTreeMap<String, i64> {
        &self.entries
    }

    /// Overwrite the manifest file with the full current mapping.
    pub fn persist(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "manifest".into());
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)
    }
}

/// Modification time of `path` in nanoseconds since the Unix epoch.
pub fn mtime_nanos(path: &Path) -> io::Result<i64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(system_time_nanos(modified))
}

pub(crate) fn system_time_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(e) => -i64::try_from(e.duration().as_nanos()).unwrap_or(i64::MAX),
    }
}
