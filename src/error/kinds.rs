use std::{fmt, io};

/// Crate-wide `Result` type using [`DcatError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, DcatError>;

/// Top-level error type for DCAT export operations.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum DcatError {
    /// No index node could be resolved, so no self-description exists.
    SnapshotUnavailable,

    /// Transform resource missing or failed to initialize.
    Compile(CompileError),

    /// Failure while the transform was producing records.
    Transform(TransformError),

    /// Failure opening, writing or closing the output destination.
    Sink(SinkError),

    /// Configuration errors.
    Config(ConfigError),

    /// Lookup failures reported by an external context.
    Context(ContextError),

    /// I/O errors.
    Io(io::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Transform compilation errors.
#[derive(Debug)]
pub enum CompileError {
    /// Transform resource could not be located.
    NotFound(String),

    /// Transform resource exists but could not be read.
    Read { id: String, reason: String },

    /// Transform source failed to parse.
    Parse { id: String, reason: String },

    /// Transform source does not define the required entry point.
    MissingEntryPoint { id: String, entry_point: String },
}

/// Errors raised while a transform runs.
#[derive(Debug)]
pub enum TransformError {
    /// The transform raised an error.
    Runtime(String),

    /// A record was emitted after the end of the stream was signalled.
    EmitAfterEnd,
}

/// Output destination errors.
#[derive(Debug)]
pub enum SinkError {
    /// Operation not valid in the sink's current state.
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// Underlying destination failed.
    Io(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

/// Errors reported by the index or access-control collaborators.
#[derive(Debug)]
pub enum ContextError {
    /// A single field lookup failed.
    Lookup { field: &'static str, reason: String },
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for DcatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DcatError::SnapshotUnavailable => write!(f, "No index node available"),
            DcatError::Compile(e) => write!(f, "Compile error: {e}"),
            DcatError::Transform(e) => write!(f, "Transform error: {e}"),
            DcatError::Sink(e) => write!(f, "Sink error: {e}"),
            DcatError::Config(e) => write!(f, "Configuration error: {e}"),
            DcatError::Context(e) => write!(f, "Context error: {e}"),
            DcatError::Io(e) => write!(f, "I/O error: {e}"),
            DcatError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::NotFound(id) => write!(f, "Transform not found: {id}"),
            CompileError::Read { id, reason } => {
                write!(f, "Failed to read transform '{id}': {reason}")
            }
            CompileError::Parse { id, reason } => {
                write!(f, "Failed to compile transform '{id}': {reason}")
            }
            CompileError::MissingEntryPoint { id, entry_point } => {
                write!(f, "Transform '{id}' does not define '{entry_point}'")
            }
        }
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::Runtime(msg) => write!(f, "{msg}"),
            TransformError::EmitAfterEnd => write!(f, "Record emitted after end of stream"),
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::InvalidState { operation, state } => {
                write!(f, "Cannot {operation} a sink in state {state}")
            }
            SinkError::Io(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::Lookup { field, reason } => {
                write!(f, "Failed to resolve {field}: {reason}")
            }
        }
    }
}

impl std::error::Error for DcatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DcatError::Io(e) => Some(e),
            _ => None,
        }
    }
}
impl std::error::Error for CompileError {}
impl std::error::Error for TransformError {}
impl std::error::Error for SinkError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for ContextError {}

/* ========================= Conversions to DcatError ========================= */

impl From<io::Error> for DcatError {
    fn from(err: io::Error) -> Self {
        DcatError::Io(err)
    }
}

impl From<CompileError> for DcatError {
    fn from(err: CompileError) -> Self {
        DcatError::Compile(err)
    }
}

impl From<TransformError> for DcatError {
    fn from(err: TransformError) -> Self {
        DcatError::Transform(err)
    }
}

impl From<SinkError> for DcatError {
    fn from(err: SinkError) -> Self {
        DcatError::Sink(err)
    }
}

impl From<ConfigError> for DcatError {
    fn from(err: ConfigError) -> Self {
        DcatError::Config(err)
    }
}

impl From<ContextError> for DcatError {
    fn from(err: ContextError) -> Self {
        DcatError::Context(err)
    }
}
