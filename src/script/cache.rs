//! Process-wide cache of compiled transforms
//!
//! Each transform id is compiled at most once for the lifetime of the cache.
//! Entries are never evicted; a changed script needs a new cache (in practice
//! a restart of the hosting process).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::Result;

use super::{CompiledTransform, TransformCompiler};

/// Cache of compiled transforms keyed by transform id
///
/// Lookups of cached ids only take a read lock. Compilation is serialized
/// through a separate lock and re-checks the map before compiling, so
/// concurrent first requests for one id compile it exactly once.
pub struct TransformCache {
    compiler: Arc<dyn TransformCompiler>,
    entries: RwLock<HashMap<String, CompiledTransform>>,
    compile_lock: Mutex<()>,
}

impl TransformCache {
    pub fn new(compiler: Arc<dyn TransformCompiler>) -> Self {
        Self {
            compiler,
            entries: RwLock::new(HashMap::new()),
            compile_lock: Mutex::new(()),
        }
    }

    /// Get the compiled transform for `id`, compiling it on first use
    ///
    /// Compilation failures are not cached; the next request retries.
    pub fn get_compiled(&self, id: &str) -> Result<CompiledTransform> {
        if let Some(compiled) = self.lookup(id) {
            return Ok(compiled);
        }

        let _guard = self.compile_lock.lock();
        if let Some(compiled) = self.lookup(id) {
            debug!("Transform {} compiled by a concurrent request", id);
            return Ok(compiled);
        }

        let started = Instant::now();
        let compiled = self.compiler.compile(id)?;
        self.entries
            .write()
            .insert(id.to_string(), Arc::clone(&compiled));

        info!(
            "Compiled transform {} in {} ms",
            id,
            started.elapsed().as_millis()
        );
        Ok(compiled)
    }

    /// Whether `id` has been compiled already
    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn lookup(&self, id: &str) -> Option<CompiledTransform> {
        self.entries.read().get(id).cloned()
    }
}
