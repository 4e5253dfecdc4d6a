use crate::error::JobFailure;
use crate::manifest::Job;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of one job, created once its task finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub index: usize,
    pub script_path: PathBuf,
    /// Exit code of the last attempt, when the process ran and exited normally.
    pub exit_code: Option<i32>,
    pub artifact_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub failure: Option<JobFailure>,
}

/// What a finished attempt left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Completed {
    pub exit_code: Option<i32>,
    pub artifact_path: PathBuf,
}

impl ExecutionResult {
    pub(crate) fn finished(
        job: &Job,
        log_path: Option<PathBuf>,
        outcome: Result<Completed, (Option<i32>, JobFailure)>,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        let (exit_code, artifact_path, failure) = match outcome {
            Ok(done) => (done.exit_code, Some(done.artifact_path), None),
            Err((exit_code, failure)) => (exit_code, None, Some(failure)),
        };
        Self {
            index: job.index,
            script_path: job.script_path.clone(),
            exit_code,
            artifact_path,
            log_path,
            stdout_path: job.stdout_path(),
            stderr_path: job.stderr_path(),
            attempts,
            elapsed_ms: elapsed.as_millis() as u64,
            failure,
        }
    }

    /// Result reported for a job whose worker vanished without answering.
    pub(crate) fn lost(job: &Job) -> Self {
        Self {
            index: job.index,
            script_path: job.script_path.clone(),
            exit_code: None,
            artifact_path: None,
            log_path: None,
            stdout_path: job.stdout_path(),
            stderr_path: job.stderr_path(),
            attempts: 0,
            elapsed_ms: 0,
            failure: Some(JobFailure::WorkerLost),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn status(&self) -> &'static str {
        match &self.failure {
            None => "success",
            Some(f) => f.code(),
        }
    }
}
