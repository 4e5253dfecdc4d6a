use crate::artifact::{script_stem, ArtifactNames, PRODUCED_MOVIE_NAME};
use crate::config::CollisionPolicy;
use crate::error::{OrchestratorError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Separator between script paths in the `run_files` setting.
pub const RUN_FILES_DELIMITER: &str = "---";
/// Program that executes the wrapper script.
pub const RUNTIME_COMMAND: &str = "bash";
/// Interpreter the wrapper is asked to run the simulation script with.
pub const SIMULATION_INTERPRETER: &str = "python";

/// One containerized simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    /// Position in the manifest.
    pub index: usize,
    pub script_path: PathBuf,
    pub wrapper_path: PathBuf,
    pub output_dir: PathBuf,
    /// Private working directory the process runs in.
    pub work_dir: PathBuf,
    pub names: ArtifactNames,
}

impl Job {
    pub fn artifact_path(&self) -> PathBuf {
        self.output_dir.join(&self.names.artifact_name)
    }

    pub fn log_path(&self) -> PathBuf {
        self.output_dir.join(&self.names.log_name)
    }

    pub fn stdout_path(&self) -> PathBuf {
        self.output_dir.join(&self.names.stdout_name)
    }

    pub fn stderr_path(&self) -> PathBuf {
        self.output_dir.join(&self.names.stderr_name)
    }

    /// Where the simulation is expected to leave its movie before it is
    /// moved to [`artifact_path`](Self::artifact_path).
    pub fn expected_output_path(&self) -> PathBuf {
        self.work_dir.join(PRODUCED_MOVIE_NAME)
    }

    /// `<runtime> <wrapper> <interpreter> <script>`
    pub fn command(&self) -> Vec<String> {
        vec![
            RUNTIME_COMMAND.to_string(),
            self.wrapper_path.to_string_lossy().to_string(),
            SIMULATION_INTERPRETER.to_string(),
            self.script_path.to_string_lossy().to_string(),
        ]
    }
}

/// Settings shared by every job of a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTemplate {
    pub wrapper_path: PathBuf,
    pub output_dir: PathBuf,
    pub work_root: PathBuf,
}

/// Ordered jobs built for one invocation. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunManifest {
    jobs: Vec<Job>,
}

impl RunManifest {
    /// Build one job per script, in order.
    ///
    /// Relative paths are resolved against the current directory here, since
    /// each job's process runs from its own work dir.
    pub fn build(
        script_paths: &[PathBuf],
        template: &JobTemplate,
        policy: CollisionPolicy,
    ) -> Result<Self> {
        if script_paths.is_empty() {
            return Err(OrchestratorError::InvalidManifest(
                "run list is empty".to_string(),
            ));
        }
        let wrapper_path = absolute_path(&template.wrapper_path, "wrapper")?;
        let output_dir = absolute_path(&template.output_dir, "output dir")?;
        let work_root = absolute_path(&template.work_root, "work root")?;
        let mut taken: BTreeMap<String, PathBuf> = BTreeMap::new();
        let mut jobs = Vec::with_capacity(script_paths.len());
        for (index, script) in script_paths.iter().enumerate() {
            validate_script_path(script)?;
            let script = &absolute_path(script, "script")?;
            let base = script_stem(script).ok_or_else(|| {
                OrchestratorError::InvalidManifest(format!(
                    "script path has no file name: {}",
                    script.display()
                ))
            })?;
            let stem = match taken.get(&base) {
                None => base,
                Some(first) => match policy {
                    CollisionPolicy::Reject => {
                        return Err(OrchestratorError::InvalidManifest(format!(
                            "artifact name collision: {} and {} both derive '{}'",
                            first.display(),
                            script.display(),
                            base
                        )))
                    }
                    CollisionPolicy::Disambiguate => {
                        let mut candidate = format!("{}_{}", base, index + 1);
                        while taken.contains_key(&candidate) {
                            candidate = format!("{}_{}", candidate, index + 1);
                        }
                        candidate
                    }
                },
            };
            taken.insert(stem.clone(), script.clone());
            let names = ArtifactNames::from_stem(stem);
            jobs.push(Job {
                index,
                script_path: script.clone(),
                wrapper_path: wrapper_path.clone(),
                output_dir: output_dir.clone(),
                work_dir: work_root.join(&names.stem),
                names,
            });
        }
        Ok(Self { jobs })
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }
}

/// Split a delimited run list into script paths, dropping blank entries.
pub fn split_run_files(raw: &str) -> Vec<PathBuf> {
    raw.split(RUN_FILES_DELIMITER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn absolute_path(path: &Path, what: &str) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| {
        OrchestratorError::InvalidManifest(format!(
            "cannot resolve {} path {:?}: {}",
            what,
            path.to_string_lossy(),
            e
        ))
    })
}

fn validate_script_path(path: &Path) -> Result<()> {
    let raw = path.to_string_lossy();
    if raw.contains('\0') {
        return Err(OrchestratorError::InvalidManifest(format!(
            "script path contains NUL byte: {:?}",
            raw
        )));
    }
    if matches!(
        path.components().next_back(),
        None | Some(Component::RootDir) | Some(Component::ParentDir) | Some(Component::CurDir)
    ) {
        return Err(OrchestratorError::InvalidManifest(format!(
            "script path does not name a file: {:?}",
            raw
        )));
    }
    Ok(())
}
