//! Configuration management for dcat-export
//!
//! This module handles loading, parsing, and managing configuration from various sources:
//! - Configuration files (TOML format)
//! - Environment variables
//! - Command-line arguments
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line flags (log verbosity)
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};
use crate::export::Framing;

/// Prefix for configuration environment variables
pub const ENV_PREFIX: &str = "DCAT_";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Search index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Access-control configuration
    #[serde(default)]
    pub access: AccessConfig,

    /// Transform script configuration
    #[serde(default)]
    pub transform: TransformConfig,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Search index connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Index nodes, handed out round-robin
    #[serde(default = "default_nodes")]
    pub nodes: Vec<String>,

    /// HTTP port of every node
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Use https instead of http
    #[serde(default)]
    pub use_https: bool,

    /// Optional username for the index
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password for the index
    #[serde(default)]
    pub password: Option<String>,

    /// Name of the metadata index
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Document type of catalog items
    #[serde(default = "default_item_doc_type")]
    pub item_doc_type: String,
}

/// Access-control configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Items carry an approval status
    #[serde(default)]
    pub supports_approval_status: bool,

    /// Items are shared with groups
    #[serde(default)]
    pub supports_group_based_access: bool,

    /// Caller the export runs on behalf of
    #[serde(default)]
    pub user: Option<UserConfig>,
}

/// Authenticated caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub username: String,

    #[serde(default)]
    pub is_admin: bool,

    #[serde(default)]
    pub groups: Vec<String>,
}

/// Transform script configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Directory transform ids are resolved against
    #[serde(default = "default_script_dir")]
    pub script_dir: PathBuf,

    /// Transform used when none is named
    #[serde(default = "default_script")]
    pub default_script: String,

    /// Largest accepted script file
    #[serde(default = "default_max_script_bytes")]
    pub max_script_bytes: u64,

    /// Operation budget per export (0 = unlimited)
    #[serde(default)]
    pub max_operations: u64,

    /// Maximum function call depth
    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,

    /// Maximum string length a script may build (0 = unlimited)
    #[serde(default)]
    pub max_string_size: usize,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory holding the published feed
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// File name of the published feed
    #[serde(default = "default_file_name")]
    pub file_name: String,

    /// Written once, before the first record
    #[serde(default = "default_header")]
    pub header: String,

    /// Written between two records
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Written once, after the last record
    #[serde(default = "default_footer")]
    pub footer: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_nodes() -> Vec<String> {
    vec!["localhost".to_string()]
}

fn default_http_port() -> u16 {
    9200
}

fn default_index_name() -> String {
    "metadata".to_string()
}

fn default_item_doc_type() -> String {
    "item".to_string()
}

fn default_script_dir() -> PathBuf {
    PathBuf::from("scripts")
}

fn default_script() -> String {
    "execute.rhai".to_string()
}

fn default_max_script_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_max_call_levels() -> usize {
    64
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dcat-export")
}

fn default_file_name() -> String {
    "dcat.json".to_string()
}

fn default_header() -> String {
    Framing::dcat_json().header
}

fn default_separator() -> String {
    Framing::dcat_json().separator
}

fn default_footer() -> String {
    Framing::dcat_json().footer
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
            http_port: default_http_port(),
            use_https: false,
            username: None,
            password: None,
            index_name: default_index_name(),
            item_doc_type: default_item_doc_type(),
        }
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            script_dir: default_script_dir(),
            default_script: default_script(),
            max_script_bytes: default_max_script_bytes(),
            max_operations: 0,
            max_call_levels: default_max_call_levels(),
            max_string_size: 0,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            file_name: default_file_name(),
            header: default_header(),
            separator: default_separator(),
            footer: default_footer(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load configuration from multiple sources with proper precedence
    ///
    /// The file is optional when no explicit path is given; the default
    /// location is used if it exists. Environment variables are applied last.
    ///
    /// # Returns
    /// * `Result<Config>` - Merged configuration or error
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables are prefixed with DCAT_
    /// Example: DCAT_INDEX_NODES=node1,node2
    ///
    /// # Returns
    /// * `Result<Config>` - Configuration from environment or default
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from variables resolved through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(nodes) = var("INDEX_NODES") {
            self.index.nodes = nodes
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(port) = var("INDEX_HTTP_PORT") {
            self.index.http_port = parse_value("INDEX_HTTP_PORT", &port)?;
        }
        if let Some(https) = var("INDEX_USE_HTTPS") {
            self.index.use_https = parse_value("INDEX_USE_HTTPS", &https)?;
        }
        if let Some(username) = var("INDEX_USERNAME") {
            self.index.username = Some(username);
        }
        if let Some(password) = var("INDEX_PASSWORD") {
            self.index.password = Some(password);
        }
        if let Some(name) = var("INDEX_NAME") {
            self.index.index_name = name;
        }
        if let Some(doc_type) = var("INDEX_ITEM_DOC_TYPE") {
            self.index.item_doc_type = doc_type;
        }
        if let Some(dir) = var("TRANSFORM_SCRIPT_DIR") {
            self.transform.script_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("OUTPUT_CACHE_DIR") {
            self.output.cache_dir = PathBuf::from(dir);
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = LogLevel::parse(&level).ok_or(ConfigError::InvalidValue {
                field: "LOG_LEVEL".to_string(),
                value: level,
            })?;
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - Path to default configuration file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dcat-export")
            .join("config.toml")
    }

    /// Save configuration to a file
    ///
    /// # Arguments
    /// * `path` - Path where to save the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Success or error
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        if self.index.http_port == 0 {
            return Err(invalid("index.http_port", "0"));
        }
        if self.index.index_name.trim().is_empty() {
            return Err(invalid("index.index_name", &self.index.index_name));
        }
        if self.index.item_doc_type.trim().is_empty() {
            return Err(invalid("index.item_doc_type", &self.index.item_doc_type));
        }
        if self.transform.default_script.trim().is_empty() {
            return Err(invalid(
                "transform.default_script",
                &self.transform.default_script,
            ));
        }
        if self.output.file_name.trim().is_empty() || self.output.file_name.contains('/') {
            return Err(invalid("output.file_name", &self.output.file_name));
        }
        Ok(())
    }
}

impl OutputConfig {
    /// Framing written around the records
    pub fn framing(&self) -> Framing {
        Framing::new(&self.header, &self.separator, &self.footer)
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

fn parse_value<T: std::str::FromStr>(field: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| invalid(field, value))
}

fn invalid(field: &str, value: &str) -> crate::error::DcatError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.index.nodes, vec!["localhost".to_string()]);
        assert_eq!(config.index.http_port, 9200);
        assert!(!config.index.use_https);
        assert_eq!(config.transform.default_script, "execute.rhai");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::from_toml(
            r#"
            [index]
            nodes = ["node1", "node2"]
            use_https = true
            index_name = "idx"
            item_doc_type = "doc"

            [access]
            supports_group_based_access = true

            [access.user]
            username = "alice"
            groups = ["g1"]
            "#,
        )
        .unwrap();

        assert_eq!(config.index.nodes.len(), 2);
        assert!(config.index.use_https);
        assert_eq!(config.index.http_port, 9200);
        assert!(config.access.supports_group_based_access);
        let user = config.access.user.unwrap();
        assert_eq!(user.username, "alice");
        assert!(!user.is_admin);
        assert_eq!(config.logging.level, LogLevel::Warn);
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_toml("[index\nnodes = 1");
        assert!(matches!(
            result,
            Err(crate::error::DcatError::Config(ConfigError::InvalidFormat(_)))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/nonexistent/dcat/config.toml");
        assert!(matches!(
            result,
            Err(crate::error::DcatError::Config(ConfigError::FileNotFound(_)))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("DCAT_INDEX_NODES", "a, b,,c"),
            ("DCAT_INDEX_HTTP_PORT", "9201"),
            ("DCAT_INDEX_USE_HTTPS", "true"),
            ("DCAT_LOG_LEVEL", "debug"),
        ]);

        let mut config = Config::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.index.nodes, vec!["a", "b", "c"]);
        assert_eq!(config.index.http_port, 9201);
        assert!(config.index.use_https);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_env_invalid_port() {
        let mut config = Config::default();
        let result = config.apply_env(|key| {
            (key == "DCAT_INDEX_HTTP_PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.index.http_port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.output.file_name = "nested/dcat.json".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("config.toml");

        let mut config = Config::default();
        config.index.index_name = "catalog".to_string();
        config.save(&path).unwrap();

        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded.index.index_name, "catalog");
        assert_eq!(reloaded.output.footer, config.output.footer);
    }

    #[test]
    fn test_output_framing() {
        let config = OutputConfig::default();
        let framing = config.framing();
        assert!(framing.header.contains("dcat:Catalog"));
        assert_eq!(framing.separator, ",");
        assert_eq!(framing.footer, "]}");
    }
}
