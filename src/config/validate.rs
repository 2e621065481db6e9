// src/config/validate.rs

use std::time::Duration;

use globset::Glob;

use crate::config::duration::parse_duration;
use crate::config::model::{
    BuildConfig, ConfigFile, ProjectConfig, RawConfigFile, RuntimeConfig, ServerConfig,
    WatchConfig,
};
use crate::errors::{Result, SimwatchError};
use crate::types::PipelineMode;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SimwatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_server(&raw)?;
        validate_watch(&raw)?;
        validate_build(&raw)?;
        validate_runtime(&raw)?;

        let RawConfigFile {
            project,
            server,
            watch,
            build,
            runtime,
        } = raw;

        let root = match project.name.as_deref() {
            Some(name) if !name.trim().is_empty() => project.root.join(name.trim()),
            _ => project.root.clone(),
        };

        Ok(ConfigFile {
            project: ProjectConfig {
                root,
                name: project.name,
                target: project.target,
            },
            server: ServerConfig {
                keep_alive: nonzero_duration("server.keep_alive", &server.keep_alive)?,
                interface: server.interface,
                port: server.port,
                subscriber_buffer: server.subscriber_buffer,
            },
            watch: WatchConfig {
                debounce: nonzero_duration("watch.debounce", &watch.debounce)?,
                include: watch.include,
                exclude: watch.exclude,
                use_hash: watch.use_hash,
            },
            build: BuildConfig {
                timeout: nonzero_duration("build.timeout", &build.timeout)?,
                pipeline: build.pipeline,
                cmd: build.cmd.filter(|c| !c.trim().is_empty()),
                output_dir: build.output_dir,
                artifacts: build.artifacts,
                exclude_artifacts: build.exclude_artifacts,
            },
            runtime: RuntimeConfig {
                grace_period: nonzero_duration("runtime.grace_period", &runtime.grace_period)?,
                execute_timeout: nonzero_duration(
                    "runtime.execute_timeout",
                    &runtime.execute_timeout,
                )?,
                program: runtime.program,
                args: runtime.args,
                echo: runtime.echo,
            },
        })
    }
}

fn validate_server(cfg: &RawConfigFile) -> Result<()> {
    if cfg.server.port == 0 {
        return Err(SimwatchError::Config(
            "[server].port must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.server.subscriber_buffer == 0 {
        return Err(SimwatchError::Config(
            "[server].subscriber_buffer must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_watch(cfg: &RawConfigFile) -> Result<()> {
    if cfg.watch.include.is_empty() {
        return Err(SimwatchError::Config(
            "[watch].include must contain at least one pattern".to_string(),
        ));
    }
    validate_globs("watch.include", &cfg.watch.include)?;
    validate_globs("watch.exclude", &cfg.watch.exclude)?;
    Ok(())
}

fn validate_build(cfg: &RawConfigFile) -> Result<()> {
    let has_cmd = cfg
        .build
        .cmd
        .as_deref()
        .is_some_and(|c| !c.trim().is_empty());

    if cfg.build.pipeline == PipelineMode::Compile && !has_cmd {
        return Err(SimwatchError::Config(
            "[build].cmd is required when pipeline = \"compile\"".to_string(),
        ));
    }
    validate_globs("build.artifacts", &cfg.build.artifacts)?;
    validate_globs("build.exclude_artifacts", &cfg.build.exclude_artifacts)?;
    Ok(())
}

fn validate_runtime(cfg: &RawConfigFile) -> Result<()> {
    if cfg.runtime.program.trim().is_empty() {
        return Err(SimwatchError::Config(
            "[runtime].program must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_globs(field: &str, patterns: &[String]) -> Result<()> {
    for pat in patterns {
        Glob::new(pat).map_err(|e| {
            SimwatchError::Config(format!("[{field}] invalid glob pattern '{pat}': {e}"))
        })?;
    }
    Ok(())
}

fn nonzero_duration(field: &str, value: &str) -> Result<Duration> {
    let dur = parse_duration(value)
        .map_err(|e| SimwatchError::Config(format!("[{field}] {e}")))?;
    if dur.is_zero() {
        return Err(SimwatchError::Config(format!("[{field}] must be > 0")));
    }
    Ok(dur)
}
