//! Export module for streaming DCAT exports
//!
//! This module turns a transform run into a published document:
//! - [`ExportRequest`]: one export, driving a transform into a sink
//! - [`Framing`]: header, separator and footer around the records
//! - [`sinks`]: the destinations an export streams into
//!
//! # Architecture
//!
//! ```text
//! SelfInfoProvider --snapshot--> ExportRequest --records--> RecordSink
//!                                     ^
//!                    TransformCache --+ compiled transform
//! ```
//!
//! [`Exporter`] wires these together from a [`Config`] and is what the
//! command line uses; every export it starts shares one transform cache.

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::context::{
    ConfiguredAccessContext, ConfiguredIndexContext, SelfDescription, SelfInfoProvider,
};
use crate::error::{DcatError, Result};
use crate::script::{RhaiCompiler, TransformCache};

pub mod framing;
pub mod request;
pub mod sinks;

pub use framing::Framing;
pub use request::{ExportReport, ExportRequest};
pub use sinks::{DcatCache, FileSink, MemoryOutput, MemorySink, RecordSink, SinkState};

/// Entry point for running exports against one configuration
#[derive(Clone)]
pub struct Exporter {
    provider: SelfInfoProvider,
    cache: Arc<TransformCache>,
    framing: Framing,
    default_transform: String,
    output: DcatCache,
}

impl Exporter {
    /// Build an exporter backed by the configured index, access and scripts
    pub fn from_config(config: &Config) -> Self {
        let provider = SelfInfoProvider::new(
            Arc::new(ConfiguredIndexContext::new(config.index.clone())),
            Arc::new(ConfiguredAccessContext::new(config.access.clone())),
        );
        let compiler = RhaiCompiler::from_config(&config.transform);

        Self::new(provider, Arc::new(TransformCache::new(Arc::new(compiler))))
            .with_framing(config.output.framing())
            .with_default_transform(config.transform.default_script.clone())
            .with_output(DcatCache::from_config(&config.output))
    }

    pub fn new(provider: SelfInfoProvider, cache: Arc<TransformCache>) -> Self {
        Self {
            provider,
            cache,
            framing: Framing::dcat_json(),
            default_transform: "execute.rhai".to_string(),
            output: DcatCache::new(".", "dcat.json"),
        }
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_default_transform(mut self, id: impl Into<String>) -> Self {
        self.default_transform = id.into();
        self
    }

    pub fn with_output(mut self, output: DcatCache) -> Self {
        self.output = output;
        self
    }

    /// Prepare an export of `transform_id` into `sink`
    pub fn request<S: RecordSink + 'static>(
        &self,
        transform_id: Option<&str>,
        sink: S,
    ) -> ExportRequest<S> {
        let id = transform_id.unwrap_or(&self.default_transform);
        ExportRequest::new(self.provider.clone(), self.cache.clone(), id, sink)
            .with_framing(self.framing.clone())
    }

    /// Export into a file, published atomically on success
    pub fn export_to_file(&self, transform_id: Option<&str>, path: &Path) -> ExportReport {
        self.request(transform_id, FileSink::new(path)).execute()
    }

    /// Export into the DCAT cache directory
    pub fn export_to_cache(&self, transform_id: Option<&str>) -> ExportReport {
        match self.output.create_sink() {
            Ok(sink) => self.request(transform_id, sink).execute(),
            Err(error) => {
                tracing::error!("Cannot prepare DCAT cache: {}", error);
                ExportReport::Failed { error }
            }
        }
    }

    /// Current self-description
    pub fn describe(&self) -> Result<SelfDescription> {
        self.provider
            .self_info()
            .ok_or(DcatError::SnapshotUnavailable)
    }

    pub fn default_transform(&self) -> &str {
        &self.default_transform
    }

    pub fn cache(&self) -> &Arc<TransformCache> {
        &self.cache
    }

    pub fn output(&self) -> &DcatCache {
        &self.output
    }
}
