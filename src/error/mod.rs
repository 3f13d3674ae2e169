//! Error handling for DCAT export operations.
//!
//! Every failure an export can hit is expressed as one of the kinds in
//! [`kinds`] and converted into the top-level [`DcatError`]. The export
//! request turns these into log diagnostics at its boundary, so callers of
//! `execute` never see them as errors.
//!
//! # Example
//!
//! ```rust
//! use dcat_export::error::{CompileError, DcatError, Result};
//!
//! fn locate(id: &str) -> Result<()> {
//!     Err(CompileError::NotFound(id.to_string()).into())
//! }
//!
//! assert!(matches!(locate("missing"), Err(DcatError::Compile(_))));
//! ```

pub mod kinds;

// Re-export commonly used types
pub use kinds::{
    CompileError, ConfigError, ContextError, DcatError, Result, SinkError, TransformError,
};
