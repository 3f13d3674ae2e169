//! In-memory sink
//!
//! Buffers the output and publishes it through a [`MemoryOutput`] handle on
//! close, which suits HTTP response bodies and tests.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;

use super::{RecordSink, SinkState};

/// Read side of a [`MemorySink`]
#[derive(Debug, Clone, Default)]
pub struct MemoryOutput {
    published: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryOutput {
    /// Published bytes, `None` until the sink closes cleanly
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.published.lock().clone()
    }

    /// Published output as UTF-8 text
    pub fn contents_string(&self) -> Option<String> {
        self.contents()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Sink writing into a memory buffer
#[derive(Debug)]
pub struct MemorySink {
    state: SinkState,
    buffer: Vec<u8>,
    output: MemoryOutput,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            state: SinkState::Unopened,
            buffer: Vec::new(),
            output: MemoryOutput::default(),
        }
    }

    /// Handle for reading the output once published
    pub fn output(&self) -> MemoryOutput {
        self.output.clone()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSink for MemorySink {
    fn open(&mut self) -> Result<()> {
        self.state.require(SinkState::Unopened, "open")?;
        self.state = SinkState::Open;
        Ok(())
    }

    fn write(&mut self, payload: &[u8]) -> Result<()> {
        self.state.require(SinkState::Open, "write")?;
        self.buffer.extend_from_slice(payload);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.require(SinkState::Open, "close")?;
        let bytes = std::mem::take(&mut self.buffer);
        debug!("Published {} bytes to memory", bytes.len());
        *self.output.published.lock() = Some(bytes);
        self.state = SinkState::Closed;
        Ok(())
    }

    fn abort(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.buffer.clear();
        self.state = SinkState::Aborted;
    }

    fn state(&self) -> SinkState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_visible_after_close() {
        let mut sink = MemorySink::new();
        let output = sink.output();

        sink.open().unwrap();
        sink.write(b"A").unwrap();
        sink.write(b"B").unwrap();
        assert!(output.contents().is_none());

        sink.close().unwrap();
        assert_eq!(output.contents_string().unwrap(), "AB");
    }

    #[test]
    fn test_abort_discards() {
        let mut sink = MemorySink::new();
        let output = sink.output();

        sink.open().unwrap();
        sink.write(b"partial").unwrap();
        sink.abort();

        assert_eq!(sink.state(), SinkState::Aborted);
        assert!(output.contents().is_none());
        assert!(sink.write(b"more").is_err());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut sink = MemorySink::new();
        assert!(sink.write(b"x").is_err());
        assert!(sink.close().is_err());

        sink.open().unwrap();
        assert!(sink.open().is_err());
        sink.close().unwrap();
        assert!(sink.close().is_err());
    }

    #[test]
    fn test_abort_after_close_is_noop() {
        let mut sink = MemorySink::new();
        let output = sink.output();
        sink.open().unwrap();
        sink.write(b"done").unwrap();
        sink.close().unwrap();

        sink.abort();
        assert_eq!(sink.state(), SinkState::Closed);
        assert_eq!(output.contents_string().unwrap(), "done");
    }

    #[test]
    fn test_abort_unopened() {
        let mut sink = MemorySink::new();
        sink.abort();
        assert_eq!(sink.state(), SinkState::Aborted);
        assert!(sink.open().is_err());
    }
}
