// src/config/mod.rs

//! Configuration loading and validation for simwatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk and layer environment / CLI overrides on
//!   top (`loader.rs`).
//! - Validate it into a checked `ConfigFile` (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{
    apply_env_overrides, config_root_dir, default_config_path, load_and_validate,
    load_from_path, Overrides,
};
pub use model::{
    BuildConfig, BuildSection, ConfigFile, ProjectConfig, ProjectSection, RawConfigFile,
    RuntimeConfig, RuntimeSection, ServerConfig, ServerSection, WatchConfig, WatchSection,
};
