#![allow(dead_code)]

use std::path::Path;

use simwatch::config::{ConfigFile, RawConfigFile};
use simwatch::types::PipelineMode;

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the defaults with the project rooted at `root`, the target
/// set to `main.brs`, runtime echo off and short timings.
pub struct ConfigBuilder {
    config: RawConfigFile,
}

impl ConfigBuilder {
    pub fn new(root: &Path) -> Self {
        let mut config = RawConfigFile::default();
        config.project.root = root.to_path_buf();
        config.project.target = "main.brs".into();
        config.watch.debounce = "100ms".into();
        config.runtime.echo = false;
        config.runtime.grace_period = "1s".into();
        config.server.keep_alive = "200ms".into();
        Self { config }
    }

    pub fn target(mut self, target: &str) -> Self {
        self.config.project.target = target.into();
        self
    }

    pub fn pipeline(mut self, pipeline: PipelineMode) -> Self {
        self.config.build.pipeline = pipeline;
        self
    }

    pub fn build_cmd(mut self, cmd: &str) -> Self {
        self.config.build.cmd = Some(cmd.to_string());
        self
    }

    /// Runtime is `sh -c <script> sh`, so artifacts arrive as `$1`, `$2`, ...
    pub fn runtime_script(mut self, script: &str) -> Self {
        self.config.runtime.program = "sh".into();
        self.config.runtime.args = vec!["-c".into(), script.into(), "sh".into()];
        self
    }

    pub fn runtime_program(mut self, program: &str) -> Self {
        self.config.runtime.program = program.into();
        self.config.runtime.args.clear();
        self
    }

    pub fn debounce(mut self, value: &str) -> Self {
        self.config.watch.debounce = value.into();
        self
    }

    pub fn watch_include(mut self, pattern: &str) -> Self {
        self.config.watch.include = vec![pattern.to_string()];
        self
    }

    pub fn use_hash(mut self, val: bool) -> Self {
        self.config.watch.use_hash = val;
        self
    }

    pub fn subscriber_buffer(mut self, n: usize) -> Self {
        self.config.server.subscriber_buffer = n;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}
