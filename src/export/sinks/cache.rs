//! Directory holding the published DCAT feed

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::config::OutputConfig;
use crate::error::{Result, SinkError};

use super::FileSink;

/// Cache directory of the DCAT feed
///
/// Every export writes through its own [`FileSink`]; the last one to close
/// wins, and readers always see a complete feed.
#[derive(Debug, Clone)]
pub struct DcatCache {
    dir: PathBuf,
    file_name: String,
}

impl DcatCache {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(config.cache_dir.clone(), config.file_name.clone())
    }

    /// Path of the published feed
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// Sink that publishes the feed on close
    ///
    /// Creates the cache directory if needed.
    pub fn create_sink(&self) -> Result<FileSink> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            SinkError::Io(format!(
                "Failed to create cache directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;
        Ok(FileSink::new(self.path()))
    }

    /// Published feed, if one exists
    pub fn latest(&self) -> Option<PathBuf> {
        let path = self.path();
        path.is_file().then_some(path)
    }

    /// Contents of the published feed
    pub fn read_latest(&self) -> Result<Option<Vec<u8>>> {
        match self.latest() {
            Some(path) => Ok(Some(fs::read(path)?)),
            None => Ok(None),
        }
    }

    /// Remove temporary files older than `max_age`
    ///
    /// Exports that were killed mid-write leave their temporary file behind.
    /// Files younger than `max_age` may belong to a running export and are kept.
    pub fn purge_stale(&self, max_age: Duration) -> Result<usize> {
        if !self.dir.is_dir() {
            return Ok(0);
        }

        let prefix = format!(".{}.", self.file_name);
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(&prefix) || !name.ends_with(".tmp") {
                continue;
            }

            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < max_age {
                debug!("Keeping {} ({}s old)", name, age.as_secs());
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove stale {}: {}", name, e),
            }
        }

        if removed > 0 {
            info!("Removed {} stale temporary files from {}", removed, self.dir.display());
        }
        Ok(removed)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
