//! Output destinations for export operations
//!
//! This module provides a unified interface for the destinations an export
//! streams into. A sink moves through
//!
//! ```text
//! Unopened -> Open -> Closed
//! Unopened | Open -> Aborted
//! ```
//!
//! and never accepts writes once closed or aborted. Output only becomes
//! visible to readers on `close`; `abort` discards everything written.

use std::fmt;

use crate::error::{Result, SinkError};

pub mod cache;
pub mod file;
pub mod memory;

pub use cache::DcatCache;
pub use file::FileSink;
pub use memory::{MemoryOutput, MemorySink};

/// Lifecycle state of a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Unopened,
    Open,
    Closed,
    Aborted,
}

impl SinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkState::Unopened => "Unopened",
            SinkState::Open => "Open",
            SinkState::Closed => "Closed",
            SinkState::Aborted => "Aborted",
        }
    }

    /// Whether nothing more can happen to the sink
    pub fn is_terminal(&self) -> bool {
        matches!(self, SinkState::Closed | SinkState::Aborted)
    }

    /// Fail with [`SinkError::InvalidState`] unless in `expected`
    pub(crate) fn require(&self, expected: SinkState, operation: &'static str) -> Result<()> {
        if *self == expected {
            Ok(())
        } else {
            Err(SinkError::InvalidState {
                operation,
                state: self.as_str(),
            }
            .into())
        }
    }
}

impl fmt::Display for SinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writable destination of one export
pub trait RecordSink: Send {
    /// Acquire the destination (`Unopened -> Open`)
    fn open(&mut self) -> Result<()>;

    /// Append bytes; only valid while open
    fn write(&mut self, payload: &[u8]) -> Result<()>;

    /// Flush and publish the output (`Open -> Closed`)
    fn close(&mut self) -> Result<()>;

    /// Discard everything written and release the destination
    ///
    /// A no-op on a sink that is already closed or aborted.
    fn abort(&mut self);

    fn state(&self) -> SinkState;
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn write(&mut self, payload: &[u8]) -> Result<()> {
        (**self).write(payload)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn abort(&mut self) {
        (**self).abort()
    }

    fn state(&self) -> SinkState {
        (**self).state()
    }
}
