use crate::config::WrapperPaths;
use crate::error::{OrchestratorError, Result};
use serde::Serialize;
use std::path::PathBuf;

/// Container technology used to run every job of a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerType {
    Docker,
    Singularity,
}

impl ContainerType {
    /// Parse a configured value. `"True"`/`"False"` are accepted as the
    /// boolean spelling of docker/singularity.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "docker" | "true" => Ok(ContainerType::Docker),
            "singularity" | "false" => Ok(ContainerType::Singularity),
            other => Err(OrchestratorError::Configuration(format!(
                "unrecognized container_type '{}' (expected docker or singularity)",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContainerType::Docker => "docker",
            ContainerType::Singularity => "singularity",
        }
    }
}

/// Pick the adapter script for all jobs of a run. Does not touch the filesystem.
pub fn select_wrapper(container_type: Option<&str>, wrappers: &WrapperPaths) -> Result<PathBuf> {
    let value = container_type
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| OrchestratorError::Configuration("container_type is required".to_string()))?;
    let path = match ContainerType::parse(value)? {
        ContainerType::Docker => &wrappers.docker,
        ContainerType::Singularity => &wrappers.singularity,
    };
    Ok(path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_DOCKER_WRAPPER, DEFAULT_SINGULARITY_WRAPPER};

    #[test]
    fn docker_spellings_select_docker_wrapper() {
        let w = WrapperPaths::default();
        for v in ["docker", "Docker", "True", "true", " docker "] {
            assert_eq!(
                select_wrapper(Some(v), &w).expect("docker"),
                PathBuf::from(DEFAULT_DOCKER_WRAPPER),
                "value {:?}",
                v
            );
        }
    }

    #[test]
    fn singularity_spellings_select_singularity_wrapper() {
        let w = WrapperPaths::default();
        for v in ["singularity", "SINGULARITY", "False"] {
            assert_eq!(
                select_wrapper(Some(v), &w).expect("singularity"),
                PathBuf::from(DEFAULT_SINGULARITY_WRAPPER)
            );
        }
    }

    #[test]
    fn selection_does_not_check_existence() {
        let w = WrapperPaths {
            docker: PathBuf::from("/definitely/not/here.sh"),
            singularity: PathBuf::from("/nor/here.sh"),
        };
        assert_eq!(
            select_wrapper(Some("docker"), &w).expect("selected"),
            PathBuf::from("/definitely/not/here.sh")
        );
    }

    #[test]
    fn absent_or_unknown_value_is_configuration_error() {
        let w = WrapperPaths::default();
        for v in [None, Some(""), Some("  "), Some("podman"), Some("yes")] {
            assert!(
                matches!(
                    select_wrapper(v, &w),
                    Err(OrchestratorError::Configuration(_))
                ),
                "value {:?}",
                v
            );
        }
    }
}
