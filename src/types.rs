use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which build pipeline produces the runnable artifact set.
///
/// - `Direct`: the target script itself is the artifact; an optional
///   `build.cmd` runs as a validation step beforehand.
/// - `Compile`: `build.cmd` compiles the project and the artifacts are
///   collected from `build.output_dir` afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    #[default]
    Direct,
    Compile,
}

impl FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "direct" => Ok(PipelineMode::Direct),
            "compile" => Ok(PipelineMode::Compile),
            other => Err(format!(
                "invalid pipeline: {other} (expected \"direct\" or \"compile\")"
            )),
        }
    }
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineMode::Direct => f.write_str("direct"),
            PipelineMode::Compile => f.write_str("compile"),
        }
    }
}

/// Why a build was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    /// A debounced filesystem change.
    Watch,
    /// Control surface request or the initial build at startup.
    Manual,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Watch => f.write_str("watch"),
            TriggerSource::Manual => f.write_str("manual"),
        }
    }
}
