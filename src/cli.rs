// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::PipelineMode;

/// Command-line arguments for `simwatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "simwatch",
    version,
    about = "Watch a script project, rebuild on change and stream the interpreter's output to the browser.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// A missing file is fine: defaults plus environment variables apply.
    #[arg(long, env = "SIMWATCH_CONFIG", value_name = "PATH", default_value = "Simwatch.toml")]
    pub config: String,

    /// Build and run once, exit when the runtime process exits. No watching.
    #[arg(long)]
    pub once: bool,

    /// Override `[server].port`.
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Override `[build].pipeline` ("direct" or "compile").
    #[arg(long, value_name = "MODE")]
    pub pipeline: Option<PipelineMode>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SIMWATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load + validate config, print it, but don't watch, build or serve.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
