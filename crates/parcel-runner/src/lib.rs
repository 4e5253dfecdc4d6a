//! Parallel dispatcher for containerized simulation runs.
//!
//! A run is planned from a [`RunConfig`] (wrapper selection and manifest
//! construction, both fail-fast), fanned out onto a [`WorkerPool`] through a
//! [`SubmissionClient`], and joined with [`wait_all`].

pub mod artifact;
pub mod barrier;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fs_util;
pub mod manifest;
pub mod report;
pub mod result;
pub mod runner;
pub mod wrapper;

pub use artifact::ArtifactNames;
pub use barrier::wait_all;
pub use config::{CollisionPolicy, RunConfig, RunOptions, WrapperPaths};
pub use dispatch::{Executor, SubmissionClient, TaskHandle, WorkerPool};
pub use error::{JobFailure, OrchestratorError, Result};
pub use manifest::{split_run_files, Job, JobTemplate, RunManifest};
pub use report::RunReport;
pub use result::ExecutionResult;
pub use wrapper::{select_wrapper, ContainerType};

use std::path::PathBuf;
use tracing::info;

/// Everything decided before the first job is submitted.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub container_type: ContainerType,
    pub wrapper_path: PathBuf,
    pub manifest: RunManifest,
    pub options: RunOptions,
    pub workers: usize,
}

/// Validate configuration and build the manifest. Nothing is spawned.
pub fn plan_run(config: &RunConfig) -> Result<RunPlan> {
    config.validate()?;
    let wrapper_path = select_wrapper(config.container_type.as_deref(), &config.wrappers)?;
    let container_type = ContainerType::parse(config.container_type.as_deref().unwrap_or_default())?;
    let run_files = config.run_files.as_deref().unwrap_or_default();
    let scripts = split_run_files(run_files);
    let template = JobTemplate {
        wrapper_path: wrapper_path.clone(),
        output_dir: config.out_dir()?.to_path_buf(),
        work_root: config.work_root()?,
    };
    let manifest = RunManifest::build(&scripts, &template, config.collision_policy)?;
    info!(
        jobs = manifest.len(),
        container = container_type.as_str(),
        wrapper = %wrapper_path.display(),
        "manifest built"
    );
    Ok(RunPlan {
        container_type,
        wrapper_path,
        workers: config.worker_count(manifest.len()),
        options: config.options(),
        manifest,
    })
}

/// Submit every job of `plan` and wait for all of them.
pub fn execute(plan: &RunPlan) -> Result<RunReport> {
    let pool = WorkerPool::new(plan.workers)?;
    let client = SubmissionClient::new(&pool, plan.options);
    let handles = client.submit_all(&plan.manifest);
    Ok(RunReport::from_results(wait_all(handles)))
}

/// [`plan_run`] followed by [`execute`].
pub fn run(config: &RunConfig) -> Result<RunReport> {
    let plan = plan_run(config)?;
    execute(&plan)
}
