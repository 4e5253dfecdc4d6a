//! Output naming for simulation jobs.
//!
//! Every name a job writes into its output directory is derived from the
//! script's file stem, so scripts with distinct stems never target the same
//! path even when all jobs share one output directory.

use serde::Serialize;
use std::path::Path;

/// Extension of the animation each simulation produces.
pub const MOVIE_EXTENSION: &str = "gif";
/// Extension of the auxiliary timestamp log.
pub const LOG_EXTENSION: &str = "log";
/// Fixed name the simulation writes into its working directory.
pub const PRODUCED_MOVIE_NAME: &str = "movie.gif";

/// Names derived from one script path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactNames {
    pub stem: String,
    pub artifact_name: String,
    pub log_name: String,
    pub stdout_name: String,
    pub stderr_name: String,
}

impl ArtifactNames {
    /// Derive names from `script_path`, or `None` when the path has no file name.
    pub fn for_script(script_path: &Path) -> Option<Self> {
        script_stem(script_path).map(Self::from_stem)
    }

    pub fn from_stem(stem: impl Into<String>) -> Self {
        let stem = stem.into();
        Self {
            artifact_name: format!("{}.{}", stem, MOVIE_EXTENSION),
            log_name: format!("{}.{}", stem, LOG_EXTENSION),
            stdout_name: format!("{}.stdout", stem),
            stderr_name: format!("{}.stderr", stem),
            stem,
        }
    }
}

/// Basename of `path` without its final extension.
pub fn script_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
}

pub fn artifact_name(script_path: &Path) -> Option<String> {
    ArtifactNames::for_script(script_path).map(|n| n.artifact_name)
}

pub fn log_name(script_path: &Path) -> Option<String> {
    ArtifactNames::for_script(script_path).map(|n| n.log_name)
}
