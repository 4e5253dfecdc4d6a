use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DOCKER_WRAPPER: &str =
    "/pw/workflows/ocean_parcels_demo/ocean-parcels/wrap_docker_oceanparcels.sh";
pub const DEFAULT_SINGULARITY_WRAPPER: &str =
    "/pw/workflows/ocean_parcels_demo/ocean-parcels/wrap_singularity_oceanparcels.sh";

/// Name of the scratch directory created under the output root when no
/// explicit work root is configured.
pub const DEFAULT_WORK_DIR_NAME: &str = ".work";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WrapperPaths {
    #[serde(default = "default_docker_wrapper")]
    pub docker: PathBuf,
    #[serde(default = "default_singularity_wrapper")]
    pub singularity: PathBuf,
}

impl Default for WrapperPaths {
    fn default() -> Self {
        Self {
            docker: default_docker_wrapper(),
            singularity: default_singularity_wrapper(),
        }
    }
}

fn default_docker_wrapper() -> PathBuf {
    PathBuf::from(DEFAULT_DOCKER_WRAPPER)
}

fn default_singularity_wrapper() -> PathBuf {
    PathBuf::from(DEFAULT_SINGULARITY_WRAPPER)
}

/// What to do when two scripts derive the same artifact name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    #[default]
    Reject,
    /// Suffix later duplicates with their 1-based manifest position.
    Disambiguate,
}

/// Settings for one orchestration invocation.
///
/// Built once (from a YAML file and/or command-line flags) and passed by
/// reference into planning and dispatch.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub container_type: Option<String>,
    /// Script paths joined by [`RUN_FILES_DELIMITER`](crate::manifest::RUN_FILES_DELIMITER).
    #[serde(default)]
    pub run_files: Option<String>,
    #[serde(default)]
    pub out_dir: Option<PathBuf>,
    #[serde(default)]
    pub wrappers: WrapperPaths,
    /// Worker threads; defaults to one per job.
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub work_root: Option<PathBuf>,
    #[serde(default)]
    pub collision_policy: CollisionPolicy,
    #[serde(default)]
    pub timestamp_log: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: u32,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        serde_yaml::from_str(&raw).map_err(|source| OrchestratorError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject settings that are well-formed YAML but cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == Some(0) {
            return Err(OrchestratorError::Configuration(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn out_dir(&self) -> Result<&Path> {
        self.out_dir
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| OrchestratorError::Configuration("out_dir is required".to_string()))
    }

    pub fn work_root(&self) -> Result<PathBuf> {
        match &self.work_root {
            Some(root) => Ok(root.clone()),
            None => Ok(self.out_dir()?.join(DEFAULT_WORK_DIR_NAME)),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn options(&self) -> RunOptions {
        RunOptions {
            timestamp_log: self.timestamp_log,
            timeout: self.timeout(),
            max_retries: self.max_retries,
        }
    }

    /// Worker count for a manifest of `job_count` jobs; never zero.
    pub fn worker_count(&self, job_count: usize) -> usize {
        self.workers.unwrap_or(job_count).max(1)
    }
}

/// Per-job execution knobs copied into every submitted task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub timestamp_log: bool,
    pub timeout: Option<Duration>,
    pub max_retries: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_config_fills_defaults() {
        let cfg: RunConfig = serde_yaml::from_str(
            "container_type: docker\nrun_files: /a/sim1.py---/a/sim2.py\nout_dir: /out\n",
        )
        .expect("parse");
        assert_eq!(cfg.container_type.as_deref(), Some("docker"));
        assert_eq!(cfg.out_dir().expect("out_dir"), Path::new("/out"));
        assert_eq!(cfg.wrappers, WrapperPaths::default());
        assert_eq!(cfg.collision_policy, CollisionPolicy::Reject);
        assert_eq!(cfg.work_root().expect("work root"), PathBuf::from("/out/.work"));
        assert_eq!(cfg.options(), RunOptions::default());
        assert_eq!(cfg.worker_count(4), 4);
    }

    #[test]
    fn yaml_config_reads_extensions() {
        let cfg: RunConfig = serde_yaml::from_str(
            r#"
out_dir: /out
wrappers:
  docker: /opt/wrap_docker.sh
collision_policy: disambiguate
timestamp_log: true
timeout_secs: 30
max_retries: 2
workers: 0
"#,
        )
        .expect("parse");
        assert_eq!(cfg.wrappers.docker, PathBuf::from("/opt/wrap_docker.sh"));
        assert_eq!(
            cfg.wrappers.singularity,
            PathBuf::from(DEFAULT_SINGULARITY_WRAPPER)
        );
        assert_eq!(cfg.collision_policy, CollisionPolicy::Disambiguate);
        let opts = cfg.options();
        assert!(opts.timestamp_log);
        assert_eq!(opts.timeout, Some(Duration::from_secs(30)));
        assert_eq!(opts.max_retries, 2);
        assert_eq!(cfg.worker_count(3), 1);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = serde_yaml::from_str::<RunConfig>("out_dir: /out\nretry_forever: true\n");
        assert!(err.is_err());
    }

    #[test]
    fn missing_out_dir_is_a_configuration_error() {
        let cfg = RunConfig::default();
        match cfg.out_dir() {
            Err(OrchestratorError::Configuration(msg)) => assert!(msg.contains("out_dir")),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn zero_timeout_is_a_configuration_error() {
        let cfg: RunConfig =
            serde_yaml::from_str("out_dir: /out\ntimeout_secs: 0\n").expect("parse");
        match cfg.validate() {
            Err(OrchestratorError::Configuration(msg)) => assert!(msg.contains("timeout_secs")),
            other => panic!("expected configuration error, got {:?}", other),
        }
        let cfg = RunConfig {
            timeout_secs: Some(1),
            ..RunConfig::default()
        };
        assert!(cfg.validate().is_ok());
        assert!(RunConfig::default().validate().is_ok());
    }
}
