//! Export request driving one transform run into one sink
//!
//! The request brings together the self-description, the compiled transform
//! and the sink. The sink is opened lazily when the first record arrives,
//! framed with the header before it, and closed with the footer once the
//! transform signals the end. Any failure aborts the sink, so a failed export
//! leaves either no output or the previously published one.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::context::SelfInfoProvider;
use crate::error::{DcatError, Result, SinkError};
use crate::script::{Emitter, RecordListener, TransformCache};

use super::framing::Framing;
use super::sinks::RecordSink;

/// Outcome of an export
#[derive(Debug)]
pub enum ExportReport {
    /// Records were written and the output published
    Completed { records: u64, elapsed_ms: u64 },
    /// The transform produced no records; nothing was opened
    Empty,
    /// No index node was available
    Skipped,
    /// The export failed
    ///
    /// Output not yet closed was discarded. Output already closed by the
    /// transform's `end()` stays published.
    Failed { error: DcatError },
}

impl ExportReport {
    pub fn is_success(&self) -> bool {
        matches!(self, ExportReport::Completed { .. } | ExportReport::Empty)
    }

    pub fn records(&self) -> u64 {
        match self {
            ExportReport::Completed { records, .. } => *records,
            _ => 0,
        }
    }
}

/// One export of a transform into a sink
///
/// Created per export and consumed by [`execute`](Self::execute).
pub struct ExportRequest<S> {
    provider: SelfInfoProvider,
    cache: Arc<TransformCache>,
    transform_id: String,
    sink: S,
    framing: Framing,
}

impl<S: RecordSink + 'static> ExportRequest<S> {
    pub fn new(
        provider: SelfInfoProvider,
        cache: Arc<TransformCache>,
        transform_id: impl Into<String>,
        sink: S,
    ) -> Self {
        Self {
            provider,
            cache,
            transform_id: transform_id.into(),
            sink,
            framing: Framing::dcat_json(),
        }
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Run the export
    ///
    /// Never fails: every error is logged and reported in the returned
    /// [`ExportReport`].
    pub fn execute(self) -> ExportReport {
        let started = Instant::now();
        let id = self.transform_id;

        let Some(info) = self.provider.self_info() else {
            info!("No index node available, skipping DCAT export");
            return ExportReport::Skipped;
        };

        let transform = match self.cache.get_compiled(&id) {
            Ok(transform) => transform,
            Err(e) => {
                error!("Error generating DCAT with {}: {}", id, e);
                return ExportReport::Failed { error: e };
            }
        };

        debug!("Running transform {} against {}", id, info.search_url());

        let stream = Arc::new(Mutex::new(RecordStream::new(self.sink, self.framing)));
        let listener: Arc<Mutex<dyn RecordListener + Send>> = stream.clone();
        let emitter = Emitter::new(listener);

        let result = transform.run(&info, &emitter).and_then(|()| {
            if emitter.is_ended() {
                Ok(())
            } else {
                debug!("Transform {} returned without ending the stream", id);
                emitter.end()
            }
        });

        let mut stream = stream.lock();
        let failure = match (stream.failure.take(), result) {
            (Some(first), _) => Some(first),
            (None, Err(e)) => Some(e),
            (None, Ok(())) => None,
        };

        if let Some(error) = failure {
            error!("Error generating DCAT with {}: {}", id, error);
            stream.abort();
            return ExportReport::Failed { error };
        }

        if let Some(error) = stream.close_error.take() {
            return ExportReport::Failed { error };
        }

        if stream.records == 0 {
            info!("Transform {} produced no records", id);
            return ExportReport::Empty;
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "DCAT export completed: {} records, {} ms",
            stream.records, elapsed_ms
        );
        ExportReport::Completed {
            records: stream.records,
            elapsed_ms,
        }
    }
}

/// Listener writing framed records into a sink
struct RecordStream<S> {
    sink: S,
    framing: Framing,
    opened: bool,
    records: u64,
    /// First write failure; the stream refuses further work once set
    failure: Option<DcatError>,
    close_error: Option<DcatError>,
}

impl<S: RecordSink> RecordStream<S> {
    fn new(sink: S, framing: Framing) -> Self {
        Self {
            sink,
            framing,
            opened: false,
            records: 0,
            failure: None,
            close_error: None,
        }
    }

    fn ensure_healthy(&self) -> Result<()> {
        match &self.failure {
            Some(e) => Err(SinkError::Io(format!("Output already failed: {e}")).into()),
            None => Ok(()),
        }
    }

    fn write_record(&mut self, payload: &str) -> Result<()> {
        if self.opened {
            if !self.framing.separator.is_empty() {
                self.sink.write(self.framing.separator.as_bytes())?;
            }
        } else {
            self.sink.open()?;
            self.opened = true;
            if !self.framing.header.is_empty() {
                self.sink.write(self.framing.header.as_bytes())?;
            }
        }
        self.sink.write(payload.as_bytes())?;
        self.records += 1;
        Ok(())
    }

    /// Record `error` as the failure of this stream and hand back a copy
    fn fail(&mut self, error: DcatError) -> DcatError {
        let reported = SinkError::Io(error.to_string()).into();
        self.failure = Some(error);
        reported
    }

    fn abort(&mut self) {
        if self.opened && !self.sink.state().is_terminal() {
            self.sink.abort();
            debug!("Aborted DCAT output after {} records", self.records);
        }
    }
}

impl<S: RecordSink> RecordListener for RecordStream<S> {
    fn on_record(&mut self, payload: &str) -> Result<()> {
        self.ensure_healthy()?;
        self.write_record(payload).map_err(|e| self.fail(e))
    }

    fn on_end(&mut self) -> Result<()> {
        self.ensure_healthy()?;
        if !self.opened {
            return Ok(());
        }

        if !self.framing.footer.is_empty() {
            if let Err(e) = self.sink.write(self.framing.footer.as_bytes()) {
                return Err(self.fail(e));
            }
        }

        if let Err(e) = self.sink.close() {
            warn!("Error closing DCAT stream: {}", e);
            self.sink.abort();
            self.close_error = Some(e);
        }
        Ok(())
    }
}
