//! File sink with atomic publish
//!
//! Output goes to a hidden temporary file next to the target. Closing the sink
//! flushes, syncs and renames it over the target, so readers only ever see a
//! complete file. Aborting (or dropping an open sink) removes the temporary file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, SinkError};

use super::{RecordSink, SinkState};

const BUFFER_CAPACITY: usize = 1024 * 1024;

/// Sink publishing to a file on close
#[derive(Debug)]
pub struct FileSink {
    /// Path the output is published to
    target: PathBuf,
    /// Temporary file while open
    temp: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    state: SinkState,
    bytes_written: u64,
}

impl FileSink {
    /// Create a sink publishing to `target`
    ///
    /// Nothing touches the filesystem until [`open`](RecordSink::open).
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            temp: None,
            writer: None,
            state: SinkState::Unopened,
            bytes_written: 0,
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Temporary file name used for `target`, unique per sink
    pub(crate) fn temp_path_for(target: &Path) -> PathBuf {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        target.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
    }

    fn publish(&mut self) -> std::io::Result<()> {
        if let Some(writer) = self.writer.take() {
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        if let Some(temp) = &self.temp {
            fs::rename(temp, &self.target)?;
        }
        self.temp = None;
        Ok(())
    }

    fn discard(&mut self) {
        self.writer = None;
        if let Some(temp) = self.temp.take() {
            if let Err(e) = fs::remove_file(&temp) {
                warn!("Failed to remove {}: {}", temp.display(), e);
            }
        }
    }
}

impl RecordSink for FileSink {
    fn open(&mut self) -> Result<()> {
        self.state.require(SinkState::Unopened, "open")?;

        if let Some(parent) = self.target.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(SinkError::Io(format!(
                    "Directory does not exist: {}",
                    parent.display()
                ))
                .into());
            }
        }

        let temp = Self::temp_path_for(&self.target);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp)
            .map_err(|e| {
                SinkError::Io(format!("Failed to create {}: {}", temp.display(), e))
            })?;

        debug!("Opened {} for {}", temp.display(), self.target.display());
        self.writer = Some(BufWriter::with_capacity(BUFFER_CAPACITY, file));
        self.temp = Some(temp);
        self.state = SinkState::Open;
        Ok(())
    }

    fn write(&mut self, payload: &[u8]) -> Result<()> {
        self.state.require(SinkState::Open, "write")?;
        let writer = self.writer.as_mut().ok_or(SinkError::InvalidState {
            operation: "write",
            state: "Open",
        })?;
        writer
            .write_all(payload)
            .map_err(|e| SinkError::Io(format!("Failed to write to file: {}", e)))?;
        self.bytes_written += payload.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.require(SinkState::Open, "close")?;

        match self.publish() {
            Ok(()) => {
                self.state = SinkState::Closed;
                debug!(
                    "Published {} ({} bytes)",
                    self.target.display(),
                    self.bytes_written
                );
                Ok(())
            }
            Err(e) => {
                self.discard();
                self.state = SinkState::Aborted;
                Err(SinkError::Io(format!(
                    "Failed to publish {}: {}",
                    self.target.display(),
                    e
                ))
                .into())
            }
        }
    }

    fn abort(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.discard();
        self.state = SinkState::Aborted;
        debug!("Aborted output for {}", self.target.display());
    }

    fn state(&self) -> SinkState {
        self.state
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if self.state == SinkState::Open {
            warn!(
                "FileSink for {} dropped while open, discarding output",
                self.target.display()
            );
            self.discard();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect()
    }

    #[test]
    fn test_close_publishes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("dcat.json");
        let mut sink = FileSink::new(&target);

        sink.open().unwrap();
        sink.write(b"[1,").unwrap();
        sink.write(b"2]").unwrap();
        assert!(!target.exists());
        assert_eq!(leftovers(dir.path()).len(), 1);

        sink.close().unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "[1,2]");
        assert_eq!(sink.bytes_written(), 5);
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn test_abort_leaves_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("dcat.json");
        fs::write(&target, "previous").unwrap();

        let mut sink = FileSink::new(&target);
        sink.open().unwrap();
        sink.write(b"truncated").unwrap();
        sink.abort();

        assert_eq!(sink.state(), SinkState::Aborted);
        assert_eq!(fs::read_to_string(&target).unwrap(), "previous");
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn test_drop_while_open_discards() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("dcat.json");
        {
            let mut sink = FileSink::new(&target);
            sink.open().unwrap();
            sink.write(b"partial").unwrap();
        }
        assert!(!target.exists());
        assert!(leftovers(dir.path()).is_empty());
    }

    #[test]
    fn test_unopened_sink_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("dcat.json");
        let mut sink = FileSink::new(&target);
        sink.abort();

        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_missing_directory() {
        let mut sink = FileSink::new("/nonexistent/directory/dcat.json");
        assert!(sink.open().is_err());
        assert_eq!(sink.state(), SinkState::Unopened);
    }

    #[test]
    fn test_temp_names_are_unique_and_hidden() {
        let target = Path::new("/tmp/out/dcat.json");
        let a = FileSink::temp_path_for(target);
        let b = FileSink::temp_path_for(target);
        assert_ne!(a, b);
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".dcat.json."));
        assert!(name.ends_with(".tmp"));
    }
}
