//! Rhai-backed transforms
//!
//! A transform script defines the entry point
//!
//! ```text
//! fn transform(info, out) {
//!     out.emit(#{ title: "dataset", url: info.elastic.searchUrl });
//!     out.end();
//! }
//! ```
//!
//! `info` is the self-description rendered by
//! [`SelfDescription::to_json`](crate::context::SelfDescription::to_json).
//! `out.emit` accepts a string, written as is, or a map, written as compact JSON.
//!
//! One compiled [`RhaiTransform`] is shared by every export using it: the
//! engine and AST are immutable after compilation and each run gets its own
//! scope, so concurrent runs need no lock.

use std::sync::Arc;

use rhai::{AST, Dynamic, Engine, EvalAltResult, ImmutableString, Map, OptimizationLevel, Scope};
use tracing::{debug, info};

use crate::config::TransformConfig;
use crate::context::SelfDescription;
use crate::error::{CompileError, Result, TransformError};

use super::{CompiledTransform, Emitter, ScriptLoader, Transform, TransformCompiler};

/// Function every transform script must define
pub const ENTRY_POINT: &str = "transform";

type ScriptResult<T> = std::result::Result<T, Box<EvalAltResult>>;

/// Safety limits applied to every script engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    /// Operation budget per run (0 = unlimited)
    pub max_operations: u64,
    pub max_call_levels: usize,
    /// Longest string a script may build (0 = unlimited)
    pub max_string_size: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_operations: 0,
            max_call_levels: 64,
            max_string_size: 0,
        }
    }
}

impl From<&TransformConfig> for EngineLimits {
    fn from(config: &TransformConfig) -> Self {
        Self {
            max_operations: config.max_operations,
            max_call_levels: config.max_call_levels,
            max_string_size: config.max_string_size,
        }
    }
}

/// Compiles Rhai transform scripts located by a [`ScriptLoader`]
#[derive(Debug, Clone)]
pub struct RhaiCompiler {
    loader: ScriptLoader,
    limits: EngineLimits,
}

impl RhaiCompiler {
    pub fn new(loader: ScriptLoader, limits: EngineLimits) -> Self {
        Self { loader, limits }
    }

    pub fn from_config(config: &TransformConfig) -> Self {
        let loader =
            ScriptLoader::new(config.script_dir.clone()).with_max_size(config.max_script_bytes);
        Self::new(loader, EngineLimits::from(config))
    }

    /// Compile a script from source text
    ///
    /// # Errors
    ///
    /// Returns an error if the script fails to parse or does not define
    /// `transform(info, out)`.
    pub fn compile_source(&self, id: &str, source: &str) -> Result<RhaiTransform> {
        let engine = create_engine(&self.limits);

        let mut ast = engine.compile(source).map_err(|e| CompileError::Parse {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        ast.set_source(id);

        let has_entry_point = ast
            .iter_functions()
            .any(|f| f.name == ENTRY_POINT && f.params.len() == 2);
        if !has_entry_point {
            return Err(CompileError::MissingEntryPoint {
                id: id.to_string(),
                entry_point: format!("{ENTRY_POINT}(info, out)"),
            }
            .into());
        }

        debug!(limits = ?self.limits, "Compiled Rhai transform {}", id);

        Ok(RhaiTransform {
            id: id.to_string(),
            engine,
            ast,
        })
    }
}

impl TransformCompiler for RhaiCompiler {
    fn compile(&self, id: &str) -> Result<CompiledTransform> {
        let source = self.loader.load(id)?;
        Ok(Arc::new(self.compile_source(id, &source)?))
    }
}

/// Compiled Rhai transform
pub struct RhaiTransform {
    id: String,
    engine: Engine,
    ast: AST,
}

impl std::fmt::Debug for RhaiTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhaiTransform")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Transform for RhaiTransform {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(&self, info: &SelfDescription, out: &Emitter) -> Result<()> {
        let info = rhai::serde::to_dynamic(info.to_json()).map_err(|e| {
            TransformError::Runtime(format!(
                "Failed to pass self-description to {}: {e}",
                self.id
            ))
        })?;

        // The entry point's return value carries no meaning.
        let mut scope = Scope::new();
        let _returned: Dynamic = self
            .engine
            .call_fn(&mut scope, &self.ast, ENTRY_POINT, (info, out.clone()))
            .map_err(|e| TransformError::Runtime(format!("{} failed: {e}", self.id)))?;
        Ok(())
    }
}

/// Creates a Rhai engine with the export bindings and safety limits.
fn create_engine(limits: &EngineLimits) -> Engine {
    let mut engine = Engine::new();

    if limits.max_operations > 0 {
        engine.set_max_operations(limits.max_operations);
    }
    if limits.max_string_size > 0 {
        engine.set_max_string_size(limits.max_string_size);
    }
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_optimization_level(OptimizationLevel::Full);

    engine.on_print(|text| info!("[script] {}", text));
    engine.on_debug(|text, source, pos| {
        debug!("[script {}:{}] {}", source.unwrap_or("?"), pos, text)
    });

    engine
        .register_type_with_name::<Emitter>("Emitter")
        .register_fn("emit", emit_text)
        .register_fn("emit", emit_map)
        .register_fn("end", end_stream);

    engine
}

fn emit_text(out: &mut Emitter, payload: ImmutableString) -> ScriptResult<()> {
    out.emit(payload.as_str()).map_err(|e| e.to_string().into())
}

fn emit_map(out: &mut Emitter, record: Map) -> ScriptResult<()> {
    let payload = serde_json::to_string(&Dynamic::from_map(record))
        .map_err(|e| format!("Record is not valid JSON: {e}"))?;
    out.emit(&payload).map_err(|e| e.to_string().into())
}

fn end_stream(out: &mut Emitter) -> ScriptResult<()> {
    out.end().map_err(|e| e.to_string().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DcatError;
    use crate::script::RecordListener;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect {
        records: Vec<String>,
        ended: bool,
    }

    impl RecordListener for Collect {
        fn on_record(&mut self, payload: &str) -> Result<()> {
            self.records.push(payload.to_string());
            Ok(())
        }

        fn on_end(&mut self) -> Result<()> {
            self.ended = true;
            Ok(())
        }
    }

    fn compiler() -> RhaiCompiler {
        RhaiCompiler::new(ScriptLoader::new("."), EngineLimits::default())
    }

    fn info() -> SelfDescription {
        SelfDescription::new("https://node1:9200/idx/doc/_search")
    }

    fn run(transform: &RhaiTransform) -> (Result<()>, Arc<Mutex<Collect>>) {
        let listener = Arc::new(Mutex::new(Collect::default()));
        let emitter = Emitter::new(listener.clone());
        let result = transform.run(&info(), &emitter);
        (result, listener)
    }

    #[test]
    fn test_records_in_order() {
        let transform = compiler()
            .compile_source(
                "t1",
                r#"
                fn transform(info, out) {
                    for rec in ["A", "B", "C"] {
                        out.emit(rec);
                    }
                    out.end();
                }
                "#,
            )
            .unwrap();

        let (result, listener) = run(&transform);
        result.unwrap();
        let collected = listener.lock();
        assert_eq!(collected.records, vec!["A", "B", "C"]);
        assert!(collected.ended);
    }

    #[test]
    fn test_info_and_map_records() {
        let transform = compiler()
            .compile_source(
                "maps",
                r#"
                fn transform(info, out) {
                    out.emit(#{ url: info.elastic.searchUrl });
                    out.end();
                }
                "#,
            )
            .unwrap();

        let (result, listener) = run(&transform);
        result.unwrap();
        let record: serde_json::Value =
            serde_json::from_str(&listener.lock().records[0]).unwrap();
        assert_eq!(record["url"], "https://node1:9200/idx/doc/_search");
    }

    #[test]
    fn test_throw_after_first_record() {
        let transform = compiler()
            .compile_source(
                "fails",
                r#"
                fn transform(info, out) {
                    out.emit("A");
                    throw "index unreachable";
                }
                "#,
            )
            .unwrap();

        let (result, listener) = run(&transform);
        assert!(matches!(
            result,
            Err(DcatError::Transform(TransformError::Runtime(msg)))
                if msg.contains("index unreachable")
        ));
        let collected = listener.lock();
        assert_eq!(collected.records, vec!["A"]);
        assert!(!collected.ended);
    }

    #[test]
    fn test_parse_error() {
        let result = compiler().compile_source("bad", "fn transform(info, out) {{{");
        assert!(matches!(
            result,
            Err(DcatError::Compile(CompileError::Parse { .. }))
        ));
    }

    #[test]
    fn test_missing_entry_point() {
        let result = compiler().compile_source("noentry", "fn other(a, b) { a + b }");
        assert!(matches!(
            result,
            Err(DcatError::Compile(CompileError::MissingEntryPoint { .. }))
        ));
    }

    #[test]
    fn test_operation_limit() {
        let limits = EngineLimits {
            max_operations: 1_000,
            ..EngineLimits::default()
        };
        let transform = RhaiCompiler::new(ScriptLoader::new("."), limits)
            .compile_source("spin", "fn transform(info, out) { loop { } }")
            .unwrap();

        let (result, _) = run(&transform);
        assert!(result.is_err());
    }

    #[test]
    fn test_compile_from_loader() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("execute.rhai"),
            "fn transform(info, out) { out.end(); }",
        )
        .unwrap();

        let compiler = RhaiCompiler::new(ScriptLoader::new(dir.path()), EngineLimits::default());
        let compiled = compiler.compile("execute.rhai").unwrap();
        assert_eq!(compiled.id(), "execute.rhai");

        assert!(matches!(
            compiler.compile("absent.rhai"),
            Err(DcatError::Compile(CompileError::NotFound(_)))
        ));
    }

    #[test]
    fn test_bundled_script_compiles() {
        let loader = ScriptLoader::new(concat!(env!("CARGO_MANIFEST_DIR"), "/scripts"));
        let compiled = RhaiCompiler::new(loader, EngineLimits::default())
            .compile("execute.rhai")
            .unwrap();

        let listener = Arc::new(Mutex::new(Collect::default()));
        compiled
            .run(&info(), &Emitter::new(listener.clone()))
            .unwrap();
        let collected = listener.lock();
        assert!(!collected.records.is_empty());
        assert!(collected.ended);
    }
}
