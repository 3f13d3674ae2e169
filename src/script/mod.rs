//! Transform scripts for DCAT export
//!
//! This module provides everything between a transform id and running code:
//! - [`ScriptLoader`]: locating and reading transform sources
//! - [`TransformCompiler`] / [`RhaiCompiler`]: turning a source into a [`CompiledTransform`]
//! - [`TransformCache`]: compiling each id once and sharing the handle
//! - [`Emitter`] / [`RecordListener`]: the callbacks a running transform reports to
//!
//! A transform owns its own iteration. It calls [`Emitter::emit`] for every
//! record it produces, in order, and [`Emitter::end`] once when it is done.

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::warn;

use crate::context::SelfDescription;
use crate::error::{CompileError, Result, TransformError};

pub mod cache;
pub mod rhai_engine;

pub use cache::TransformCache;
pub use rhai_engine::{EngineLimits, RhaiCompiler, RhaiTransform};

/// Receives the records of one transform run
pub trait RecordListener {
    /// Called for every record, in emission order
    fn on_record(&mut self, payload: &str) -> Result<()>;

    /// Called once after the last record
    fn on_end(&mut self) -> Result<()>;
}

/// Handle a running transform reports its records through
///
/// Cloning is cheap; every clone feeds the same listener.
#[derive(Clone)]
pub struct Emitter {
    listener: Arc<Mutex<dyn RecordListener + Send>>,
    ended: Arc<AtomicBool>,
}

impl Emitter {
    pub fn new(listener: Arc<Mutex<dyn RecordListener + Send>>) -> Self {
        Self {
            listener,
            ended: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Forward one record to the listener
    ///
    /// Fails once [`end`](Self::end) has been called.
    pub fn emit(&self, payload: &str) -> Result<()> {
        if self.is_ended() {
            return Err(TransformError::EmitAfterEnd.into());
        }
        self.listener.lock().on_record(payload)
    }

    /// Signal that no more records follow
    ///
    /// Only the first call reaches the listener.
    pub fn end(&self) -> Result<()> {
        if self.ended.swap(true, Ordering::SeqCst) {
            warn!("End of stream signalled more than once");
            return Ok(());
        }
        self.listener.lock().on_end()
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("ended", &self.is_ended())
            .finish_non_exhaustive()
    }
}

/// Executable transform logic
///
/// Implementations must tolerate concurrent `run` calls from several exports.
pub trait Transform: Send + Sync {
    /// Identifier the transform was compiled from
    fn id(&self) -> &str;

    /// Produce records for `info` through `out`
    fn run(&self, info: &SelfDescription, out: &Emitter) -> Result<()>;
}

/// Shared handle to a compiled transform
pub type CompiledTransform = Arc<dyn Transform>;

/// Turns a transform id into a compiled transform
pub trait TransformCompiler: Send + Sync {
    fn compile(&self, id: &str) -> Result<CompiledTransform>;
}

/// Transform backed by a Rust closure
pub struct FnTransform<F> {
    id: String,
    func: F,
}

impl<F> FnTransform<F>
where
    F: Fn(&SelfDescription, &Emitter) -> Result<()> + Send + Sync,
{
    pub fn new(id: impl Into<String>, func: F) -> Self {
        Self {
            id: id.into(),
            func,
        }
    }
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(&SelfDescription, &Emitter) -> Result<()> + Send + Sync,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn run(&self, info: &SelfDescription, out: &Emitter) -> Result<()> {
        (self.func)(info, out)
    }
}

/// Script loader for locating and reading transform sources
#[derive(Debug, Clone)]
pub struct ScriptLoader {
    /// Directory ids are resolved against
    root: PathBuf,

    /// Maximum script size in bytes
    max_size_bytes: u64,
}

impl ScriptLoader {
    /// Create a new script loader
    ///
    /// # Arguments
    /// * `root` - Directory containing the transform scripts
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_size_bytes: 10 * 1024 * 1024, // 10 MB default
        }
    }

    /// Set maximum script size
    ///
    /// # Arguments
    /// * `bytes` - Maximum size in bytes
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    /// Map a transform id to a file below the root
    ///
    /// Ids that are absolute, climb out of the root or do not name a Rhai
    /// script are not resolvable.
    pub fn resolve(&self, id: &str) -> Result<PathBuf> {
        let relative = Path::new(id);
        let contained = !id.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained || !Self::has_valid_extension(relative) {
            return Err(CompileError::NotFound(id.to_string()).into());
        }
        Ok(self.root.join(relative))
    }

    /// Load the source of a transform
    ///
    /// # Arguments
    /// * `id` - Transform id, a path relative to the root
    ///
    /// # Returns
    /// * `Result<String>` - Script content or error
    pub fn load(&self, id: &str) -> Result<String> {
        let path = self.resolve(id)?;

        if !path.is_file() {
            return Err(CompileError::NotFound(path.display().to_string()).into());
        }

        let metadata = fs::metadata(&path).map_err(|e| read_error(id, e))?;
        if metadata.len() > self.max_size_bytes {
            return Err(CompileError::Read {
                id: id.to_string(),
                reason: format!(
                    "Script file too large: {} bytes (max: {} bytes)",
                    metadata.len(),
                    self.max_size_bytes
                ),
            }
            .into());
        }

        fs::read_to_string(&path).map_err(|e| read_error(id, e))
    }

    /// Check if file has a Rhai script extension
    pub fn has_valid_extension(path: &Path) -> bool {
        matches!(path.extension().and_then(|e| e.to_str()), Some("rhai"))
    }
}

fn read_error(id: &str, err: std::io::Error) -> crate::error::DcatError {
    CompileError::Read {
        id: id.to_string(),
        reason: err.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DcatError;

    #[derive(Default)]
    struct Collect {
        records: Vec<String>,
        ends: usize,
    }

    impl RecordListener for Collect {
        fn on_record(&mut self, payload: &str) -> Result<()> {
            self.records.push(payload.to_string());
            Ok(())
        }

        fn on_end(&mut self) -> Result<()> {
            self.ends += 1;
            Ok(())
        }
    }

    #[test]
    fn test_emitter_forwards_in_order() {
        let listener = Arc::new(Mutex::new(Collect::default()));
        let emitter = Emitter::new(listener.clone());

        emitter.emit("A").unwrap();
        emitter.clone().emit("B").unwrap();
        emitter.end().unwrap();

        let collected = listener.lock();
        assert_eq!(collected.records, vec!["A", "B"]);
        assert_eq!(collected.ends, 1);
    }

    #[test]
    fn test_emit_after_end_fails() {
        let listener = Arc::new(Mutex::new(Collect::default()));
        let emitter = Emitter::new(listener.clone());

        emitter.end().unwrap();
        let result = emitter.emit("late");
        assert!(matches!(
            result,
            Err(DcatError::Transform(TransformError::EmitAfterEnd))
        ));
        assert!(listener.lock().records.is_empty());
    }

    #[test]
    fn test_second_end_is_ignored() {
        let listener = Arc::new(Mutex::new(Collect::default()));
        let emitter = Emitter::new(listener.clone());

        emitter.end().unwrap();
        emitter.end().unwrap();
        assert_eq!(listener.lock().ends, 1);
    }

    #[test]
    fn test_fn_transform() {
        let transform = FnTransform::new("inline", |info: &SelfDescription, out: &Emitter| {
            out.emit(info.search_url())?;
            out.end()
        });
        let listener = Arc::new(Mutex::new(Collect::default()));
        let emitter = Emitter::new(listener.clone());

        transform
            .run(&SelfDescription::new("http://n:9200/i/d/_search"), &emitter)
            .unwrap();
        assert_eq!(transform.id(), "inline");
        assert_eq!(listener.lock().records, vec!["http://n:9200/i/d/_search"]);
    }

    #[test]
    fn test_loader_rejects_escaping_ids() {
        let loader = ScriptLoader::new("/srv/scripts");
        assert!(loader.resolve("../secret.rhai").is_err());
        assert!(loader.resolve("/etc/passwd").is_err());
        assert!(loader.resolve("").is_err());
        assert_eq!(
            loader.resolve("dcat/execute.rhai").unwrap(),
            PathBuf::from("/srv/scripts/dcat/execute.rhai")
        );
    }

    #[test]
    fn test_loader_reads_and_limits_size() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("small.rhai"), "fn transform(info, out) {}").unwrap();
        fs::write(dir.path().join("big.rhai"), "x".repeat(64)).unwrap();

        let loader = ScriptLoader::new(dir.path()).with_max_size(32);
        assert!(loader.load("small.rhai").unwrap().contains("transform"));
        assert!(matches!(
            loader.load("big.rhai"),
            Err(DcatError::Compile(CompileError::Read { .. }))
        ));
        assert!(matches!(
            loader.load("missing.rhai"),
            Err(DcatError::Compile(CompileError::NotFound(_)))
        ));
    }

    #[test]
    fn test_loader_rejects_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("execute.js"), "fn transform(info, out) {}").unwrap();
        fs::write(dir.path().join("execute"), "fn transform(info, out) {}").unwrap();

        let loader = ScriptLoader::new(dir.path());
        assert!(matches!(
            loader.load("execute.js"),
            Err(DcatError::Compile(CompileError::NotFound(_)))
        ));
        assert!(matches!(
            loader.load("execute"),
            Err(DcatError::Compile(CompileError::NotFound(_)))
        ));
    }
}
