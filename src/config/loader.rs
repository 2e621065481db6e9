// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, SimwatchError};
use crate::types::PipelineMode;

/// Environment variables understood on top of the config file.
pub const ENV_PROJECT_PATH: &str = "PROJECT_PATH";
pub const ENV_PROJECT: &str = "PROJECT";
pub const ENV_FILE: &str = "FILE";
pub const ENV_PORT: &str = "PORT";

/// Command-line overrides, applied after the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub pipeline: Option<PipelineMode>,
}

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. A missing file yields the all-defaults config.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    if !path.exists() {
        info!(?path, "config file not found; using defaults");
        return Ok(RawConfigFile::default());
    }

    let contents = fs::read_to_string(path)?;
    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Apply `PROJECT_PATH`, `PROJECT`, `FILE` and `PORT` from `lookup`.
///
/// `lookup` is `std::env::var` in production; tests pass a closure so they
/// never touch the process environment.
pub fn apply_env_overrides<F>(raw: &mut RawConfigFile, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(root) = lookup(ENV_PROJECT_PATH) {
        raw.project.root = PathBuf::from(root);
    }
    if let Some(name) = lookup(ENV_PROJECT) {
        raw.project.name = Some(name);
    }
    if let Some(file) = lookup(ENV_FILE) {
        raw.project.target = PathBuf::from(file);
    }
    if let Some(port) = lookup(ENV_PORT) {
        raw.server.port = port.trim().parse().map_err(|e| {
            SimwatchError::Config(format!("{ENV_PORT}={port:?} is not a valid port: {e}"))
        })?;
    }
    Ok(())
}

fn apply_cli_overrides(raw: &mut RawConfigFile, overrides: &Overrides) {
    if let Some(port) = overrides.port {
        raw.server.port = port;
    }
    if let Some(pipeline) = overrides.pipeline {
        raw.build.pipeline = pipeline;
    }
}

/// Load configuration from path, environment and CLI overrides, then validate.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Loads `.env` (if present) into the process environment.
/// - Reads TOML (defaults when the file is missing).
/// - Applies environment, then CLI overrides.
/// - Resolves a relative project root against the config file's directory.
/// - Validates into a `ConfigFile`.
pub fn load_and_validate(path: impl AsRef<Path>, overrides: &Overrides) -> Result<ConfigFile> {
    if let Ok(env_path) = dotenvy::dotenv() {
        debug!(?env_path, "loaded .env file");
    }

    let path = path.as_ref();
    let mut raw = load_from_path(path)?;
    apply_env_overrides(&mut raw, |key| std::env::var(key).ok())?;
    apply_cli_overrides(&mut raw, overrides);

    if raw.project.root.is_relative() {
        raw.project.root = config_root_dir(path).join(&raw.project.root);
    }

    ConfigFile::try_from(raw)
}

/// Directory that relative paths in the config are resolved against.
///
/// - If the config path has a non-empty parent (e.g. "configs/Simwatch.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Simwatch.toml" (parent = ""),
///   we fall back to the current working directory.
pub fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Default config path: `Simwatch.toml` in the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Simwatch.toml")
}
