//! Error types for run planning and per-job failures.

use serde::Serialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a run before any job is submitted.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Container type missing or unrecognized, or a required setting absent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Run list empty or containing unusable paths.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Config file could not be parsed.
    #[error("failed to parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Why a single job did not produce its artifact.
///
/// These never abort sibling jobs; they are carried inside the job's
/// [`ExecutionResult`](crate::ExecutionResult).
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobFailure {
    #[error("{what} not found: {}", path.display())]
    ResourceNotFound { what: String, path: PathBuf },

    #[error("external process failed with {}", describe_exit(*exit_code))]
    ExternalProcess { exit_code: Option<i32> },

    #[error("expected artifact missing: {}", expected.display())]
    ArtifactMissing { expected: PathBuf },

    #[error("job exceeded timeout of {after_secs}s and was killed")]
    Timeout { after_secs: u64 },

    #[error("I/O error: {message}")]
    Io { message: String },

    /// The worker running the job went away before reporting a result.
    #[error("worker exited without reporting a result")]
    WorkerLost,
}

impl JobFailure {
    pub(crate) fn io(context: &str, err: io::Error) -> Self {
        JobFailure::Io {
            message: format!("{}: {}", context, err),
        }
    }

    pub(crate) fn resource_not_found(what: &str, path: impl Into<PathBuf>) -> Self {
        JobFailure::ResourceNotFound {
            what: what.to_string(),
            path: path.into(),
        }
    }

    /// Stable identifier used in reports.
    pub fn code(&self) -> &'static str {
        match self {
            JobFailure::ResourceNotFound { .. } => "resource_not_found",
            JobFailure::ExternalProcess { .. } => "external_process_failure",
            JobFailure::ArtifactMissing { .. } => "artifact_missing",
            JobFailure::Timeout { .. } => "timeout",
            JobFailure::Io { .. } => "io_error",
            JobFailure::WorkerLost => "worker_lost",
        }
    }

    /// Failures that another attempt of the same job could plausibly fix.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobFailure::ExternalProcess { .. }
                | JobFailure::ArtifactMissing { .. }
                | JobFailure::Timeout { .. }
        )
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {}", c),
        None => "termination by signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_messages_name_the_cause() {
        let f = JobFailure::ExternalProcess { exit_code: Some(3) };
        assert_eq!(f.to_string(), "external process failed with exit code 3");
        let f = JobFailure::ExternalProcess { exit_code: None };
        assert!(f.to_string().contains("signal"));
        let f = JobFailure::resource_not_found("wrapper", "/w/wrap.sh");
        assert_eq!(f.to_string(), "wrapper not found: /w/wrap.sh");
    }

    #[test]
    fn only_process_level_failures_are_retryable() {
        assert!(JobFailure::ExternalProcess { exit_code: Some(1) }.is_retryable());
        assert!(JobFailure::Timeout { after_secs: 5 }.is_retryable());
        assert!(JobFailure::ArtifactMissing {
            expected: PathBuf::from("movie.gif")
        }
        .is_retryable());
        assert!(!JobFailure::resource_not_found("script", "/a.py").is_retryable());
        assert!(!JobFailure::WorkerLost.is_retryable());
    }

    #[test]
    fn failure_serializes_with_kind_tag() {
        let v = serde_json::to_value(JobFailure::Timeout { after_secs: 9 }).expect("serialize");
        assert_eq!(v["kind"], "timeout");
        assert_eq!(v["after_secs"], 9);
    }
}
