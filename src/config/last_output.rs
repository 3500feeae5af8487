//! Record of the most recent generate/edit output.

use super::{read_config_or_default, write_json};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths written by the last successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastOutputRecord {
    /// Written files, in output order.
    pub file_paths: Vec<PathBuf>,
    /// Unix time in milliseconds.
    pub timestamp: i64,
}

impl LastOutputRecord {
    /// Returns the first recorded path, used as the input of `edit --last`.
    pub fn first(&self) -> Option<&Path> {
        self.file_paths.first().map(PathBuf::as_path)
    }
}

/// File-backed store for [`LastOutputRecord`].
#[derive(Debug, Clone)]
pub struct LastOutputStore {
    path: PathBuf,
}

impl LastOutputStore {
    /// Creates a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrites the record with `paths`, stamped with the current time.
    pub fn save(&self, paths: &[PathBuf]) -> Result<()> {
        let record = LastOutputRecord {
            file_paths: paths.to_vec(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        write_json(&self.path, &record, false)?;
        tracing::debug!(count = paths.len(), "recorded last output");
        Ok(())
    }

    /// Loads the record. Missing, malformed or empty records read as `None`.
    pub fn load(&self) -> Option<LastOutputRecord> {
        let record: LastOutputRecord = read_config_or_default(&self.path);
        if record.file_paths.is_empty() {
            None
        } else {
            Some(record)
        }
    }
}
