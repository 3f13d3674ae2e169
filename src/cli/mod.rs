//! Command-line interface for dcat-export
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and validation
//! - Dispatching the `generate`, `info` and `config` commands

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{DcatError, Result};
use crate::export::{ExportReport, Exporter};

/// Temporary files older than this belong to exports that died
const STALE_TEMP_AGE: Duration = Duration::from_secs(3600);

/// DCAT Export - publish a DCAT catalog of a metadata index
#[derive(Parser, Debug)]
#[command(
    name = "dcat-export",
    version,
    about = "Export a metadata index as a DCAT catalog",
    long_about = "Runs a transform script against the self-description of a metadata index
and publishes the records it emits as a DCAT JSON catalog."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (debug logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for dcat-export
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a transform and publish its output
    Generate {
        /// Transform id, relative to the script directory
        #[arg(short = 't', long, value_name = "ID")]
        transform: Option<String>,

        /// Output file (defaults to the DCAT cache directory)
        #[arg(short = 'o', long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Number of concurrent exports sharing one compiled transform
        #[arg(short = 'p', long, value_name = "N", default_value_t = 1)]
        parallel: usize,
    },

    /// Show the self-description handed to transforms
    Info,

    /// Show the effective configuration
    Config,
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface from the process arguments
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Create a CLI interface from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Config::load(args.config_file.as_deref())?;
        Ok(Self { args, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Run the selected subcommand
    pub async fn run(&self) -> Result<()> {
        match &self.args.command {
            Commands::Generate {
                transform,
                output,
                parallel,
            } => {
                self.generate(transform.as_deref(), output.as_deref(), *parallel)
                    .await
            }
            Commands::Info => self.show_info(),
            Commands::Config => self.show_config(),
        }
    }

    /// Run `parallel` exports concurrently and report each outcome
    async fn generate(
        &self,
        transform: Option<&str>,
        output: Option<&Path>,
        parallel: usize,
    ) -> Result<()> {
        if parallel == 0 {
            return Err(DcatError::Generic(
                "--parallel must be at least 1".to_string(),
            ));
        }

        let exporter = Exporter::from_config(&self.config);
        if let Err(e) = exporter.output().purge_stale(STALE_TEMP_AGE) {
            warn!("Failed to clean DCAT cache: {}", e);
        }

        let started = Instant::now();
        let mut handles = Vec::with_capacity(parallel);
        for _ in 0..parallel {
            let exporter = exporter.clone();
            let transform = transform.map(str::to_string);
            let output = output.map(Path::to_path_buf);
            handles.push(tokio::task::spawn_blocking(move || match output {
                Some(path) => exporter.export_to_file(transform.as_deref(), &path),
                None => exporter.export_to_cache(transform.as_deref()),
            }));
        }

        let mut failures = 0;
        for (n, handle) in handles.into_iter().enumerate() {
            let report = handle
                .await
                .map_err(|e| DcatError::Generic(format!("Export task failed: {}", e)))?;
            if !report.is_success() && !matches!(report, ExportReport::Skipped) {
                failures += 1;
            }
            println!("export {}: {}", n + 1, describe_report(&report));
        }

        info!(
            "{} export(s) finished in {} ms",
            parallel,
            started.elapsed().as_millis()
        );

        if failures > 0 {
            return Err(DcatError::Generic(format!(
                "{} of {} export(s) failed",
                failures, parallel
            )));
        }

        let target = output
            .map(Path::to_path_buf)
            .or_else(|| exporter.output().latest());
        if let Some(path) = target.filter(|p| p.exists()) {
            println!("Published {}", path.display());
        }
        Ok(())
    }

    fn show_info(&self) -> Result<()> {
        match Exporter::from_config(&self.config).describe() {
            Ok(info) => {
                let text = serde_json::to_string_pretty(&info.to_redacted_json())
                    .map_err(|e| DcatError::Generic(e.to_string()))?;
                println!("{}", text);
            }
            Err(DcatError::SnapshotUnavailable) => {
                println!("No index node configured; exports will be skipped.");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn show_config(&self) -> Result<()> {
        println!("{}", self.config.to_toml()?);
        Ok(())
    }
}

/// One-line summary of an export outcome
pub fn describe_report(report: &ExportReport) -> String {
    match report {
        ExportReport::Completed {
            records,
            elapsed_ms,
        } => format!("{} record(s) in {} ms", records, elapsed_ms),
        ExportReport::Empty => "no records, nothing published".to_string(),
        ExportReport::Skipped => "skipped, no index node available".to_string(),
        ExportReport::Failed { error } => format!("failed: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformError;

    #[test]
    fn test_parse_generate() {
        let args = CliArgs::try_parse_from([
            "dcat-export",
            "-c",
            "dcat.toml",
            "generate",
            "--transform",
            "t1.rhai",
            "--parallel",
            "2",
        ])
        .unwrap();

        assert_eq!(args.config_file, Some(PathBuf::from("dcat.toml")));
        match args.command {
            Commands::Generate {
                transform,
                output,
                parallel,
            } => {
                assert_eq!(transform.as_deref(), Some("t1.rhai"));
                assert!(output.is_none());
                assert_eq!(parallel, 2);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_defaults() {
        let args = CliArgs::try_parse_from(["dcat-export", "--vv", "generate"]).unwrap();
        assert!(args.very_verbose);
        assert!(matches!(
            args.command,
            Commands::Generate { parallel: 1, .. }
        ));
    }

    #[test]
    fn test_command_required() {
        assert!(CliArgs::try_parse_from(["dcat-export"]).is_err());
    }

    #[test]
    fn test_describe_report() {
        assert_eq!(
            describe_report(&ExportReport::Completed {
                records: 3,
                elapsed_ms: 12
            }),
            "3 record(s) in 12 ms"
        );
        let failed = ExportReport::Failed {
            error: TransformError::EmitAfterEnd.into(),
        };
        assert!(describe_report(&failed).starts_with("failed: "));
    }

    #[tokio::test]
    async fn test_generate_parallel_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = dir.path().join("scripts");
        std::fs::create_dir_all(&scripts).unwrap();
        std::fs::write(
            scripts.join("execute.rhai"),
            r#"fn transform(info, out) { out.emit("1"); out.emit("2"); out.end(); }"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.transform.script_dir = scripts;
        config.output.cache_dir = dir.path().join("cache");
        let output = dir.path().join("feed.json");

        let cli = CliInterface {
            args: CliArgs::try_parse_from(["dcat-export", "generate"]).unwrap(),
            config,
        };
        cli.generate(None, Some(&output), 3).await.unwrap();

        let document: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(document["dataset"], serde_json::json!([1, 2]));
    }

    #[tokio::test]
    async fn test_generate_rejects_zero_parallel() {
        let cli = CliInterface {
            args: CliArgs::try_parse_from(["dcat-export", "generate"]).unwrap(),
            config: Config::default(),
        };
        assert!(cli.generate(None, None, 0).await.is_err());
    }
}
