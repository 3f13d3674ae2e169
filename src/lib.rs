//! DCAT Export Library
//!
//! This library publishes the contents of a metadata index as a DCAT catalog.
//! A transform script receives a self-description of the index, emits one
//! record per dataset, and the records are streamed into a sink that only
//! publishes complete documents.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `context`: Self-description of the index and its access model
//! - `error`: Error types and handling
//! - `export`: Export requests, framing and output sinks
//! - `script`: Transform contract, compilation cache and Rhai engine
//!
//! # Example
//!
//! ```no_run
//! use dcat_export::{config::Config, export::Exporter};
//!
//! fn main() -> dcat_export::Result<()> {
//!     let config = Config::load(None)?;
//!     let exporter = Exporter::from_config(&config);
//!
//!     let report = exporter.export_to_cache(None);
//!     println!("{:?}", report);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod script;

// Re-export commonly used types
pub use config::Config;
pub use context::{SelfDescription, SelfInfoProvider};
pub use error::{DcatError, Result};
pub use export::{ExportReport, ExportRequest, Exporter};
pub use script::{CompiledTransform, Emitter, Transform, TransformCache};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}
