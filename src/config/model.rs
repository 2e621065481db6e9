// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::types::PipelineMode;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [project]
/// root = "."
/// target = "source/main.brs"
///
/// [server]
/// port = 8080
///
/// [watch]
/// include = ["**/*.brs", "manifest"]
/// debounce = "300ms"
///
/// [build]
/// pipeline = "compile"
/// cmd = "brsc --out build source"
/// exclude_artifacts = ["*lib*"]
///
/// [runtime]
/// program = "brs"
/// grace_period = "3s"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub project: ProjectSection,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub build: BuildSection,

    #[serde(default)]
    pub runtime: RuntimeSection,
}

/// `[project]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSection {
    /// Project root. Relative paths are resolved against the directory of the
    /// config file.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Optional project identifier; when set it is joined onto `root`
    /// (`PROJECT_PATH` + `PROJECT` in environment terms).
    #[serde(default)]
    pub name: Option<String>,

    /// Script handed to the runtime in the direct pipeline, relative to the
    /// project root.
    #[serde(default = "default_target")]
    pub target: PathBuf,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_target() -> PathBuf {
    PathBuf::from("source/main.brs")
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            root: default_root(),
            name: None,
            target: default_target(),
        }
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_interface")]
    pub interface: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Lines queued per viewer before it is considered too slow and evicted.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Interval between SSE keep-alive comments.
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
}

fn default_interface() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_subscriber_buffer() -> usize {
    1024
}

fn default_keep_alive() -> String {
    "15s".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            port: default_port(),
            subscriber_buffer: default_subscriber_buffer(),
            keep_alive: default_keep_alive(),
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchSection {
    /// Globs (relative to the project root) whose changes request a rebuild.
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,

    /// Quiet period that collapses a burst of notifications into one build.
    #[serde(default = "default_debounce")]
    pub debounce: String,

    /// Only count a notification when the file content actually changed.
    #[serde(default)]
    pub use_hash: bool,
}

fn default_include() -> Vec<String> {
    vec!["**/*.brs".to_string(), "manifest".to_string()]
}

fn default_debounce() -> String {
    "300ms".to_string()
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: Vec::new(),
            debounce: default_debounce(),
            use_hash: false,
        }
    }
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    #[serde(default)]
    pub pipeline: PipelineMode,

    /// Shell command. Required for the compile pipeline, an optional check
    /// step for the direct pipeline.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Where the compile pipeline looks for artifacts (relative to root).
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Artifact include globs, relative to `output_dir`.
    #[serde(default = "default_artifacts")]
    pub artifacts: Vec<String>,

    /// Artifacts matching any of these globs are helpers, not runnable.
    #[serde(default = "default_exclude_artifacts")]
    pub exclude_artifacts: Vec<String>,

    /// Ceiling on a single build; exceeding it counts as a tool failure.
    #[serde(default = "default_build_timeout")]
    pub timeout: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("build")
}

fn default_artifacts() -> Vec<String> {
    vec!["**/*".to_string()]
}

fn default_exclude_artifacts() -> Vec<String> {
    vec!["*lib*".to_string()]
}

fn default_build_timeout() -> String {
    "60s".to_string()
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            pipeline: PipelineMode::default(),
            cmd: None,
            output_dir: default_output_dir(),
            artifacts: default_artifacts(),
            exclude_artifacts: default_exclude_artifacts(),
            timeout: default_build_timeout(),
        }
    }
}

/// `[runtime]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSection {
    /// Interpreter binary.
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the artifact paths.
    #[serde(default)]
    pub args: Vec<String>,

    /// How long a terminated runtime gets between SIGTERM and SIGKILL.
    #[serde(default = "default_grace_period")]
    pub grace_period: String,

    /// Mirror runtime output to this process' stdout/stderr.
    #[serde(default = "default_echo")]
    pub echo: bool,

    /// Bound for the synchronous `/execute` mode.
    #[serde(default = "default_execute_timeout")]
    pub execute_timeout: String,
}

fn default_program() -> String {
    "brs".to_string()
}

fn default_grace_period() -> String {
    "3s".to_string()
}

fn default_echo() -> bool {
    true
}

fn default_execute_timeout() -> String {
    "30s".to_string()
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            grace_period: default_grace_period(),
            echo: default_echo(),
            execute_timeout: default_execute_timeout(),
        }
    }
}

/// Validated configuration.
///
/// Durations are parsed, the project root is resolved and the pipeline
/// requirements have been checked. Construct through
/// `ConfigFile::try_from(RawConfigFile)` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub project: ProjectConfig,
    pub server: ServerConfig,
    pub watch: WatchConfig,
    pub build: BuildConfig,
    pub runtime: RuntimeConfig,
}

impl ConfigFile {
    /// The direct pipeline hands the target script straight to the runtime;
    /// returns its path when it is not an existing file.
    pub fn missing_target(&self) -> Option<PathBuf> {
        let target = self.project.target_path();
        (self.build.pipeline == PipelineMode::Direct && !target.is_file()).then_some(target)
    }
}

#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub root: PathBuf,
    pub name: Option<String>,
    pub target: PathBuf,
}

impl ProjectConfig {
    /// Absolute (or root-relative) path of the target script.
    pub fn target_path(&self) -> PathBuf {
        self.root.join(&self.target)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub interface: String,
    pub port: u16,
    pub subscriber_buffer: usize,
    pub keep_alive: Duration,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.interface, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub debounce: Duration,
    pub use_hash: bool,
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub pipeline: PipelineMode,
    pub cmd: Option<String>,
    pub output_dir: PathBuf,
    pub artifacts: Vec<String>,
    pub exclude_artifacts: Vec<String>,
    pub timeout: Duration,
}

impl BuildConfig {
    pub fn output_path(&self, root: &Path) -> PathBuf {
        root.join(&self.output_dir)
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub program: String,
    pub args: Vec<String>,
    pub grace_period: Duration,
    pub echo: bool,
    pub execute_timeout: Duration,
}
