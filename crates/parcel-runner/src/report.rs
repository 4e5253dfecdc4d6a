use crate::result::ExecutionResult;
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregate view of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Failure counts keyed by failure code.
    pub failures_by_kind: BTreeMap<String, usize>,
    pub results: Vec<ExecutionResult>,
}

impl RunReport {
    pub fn from_results(results: Vec<ExecutionResult>) -> Self {
        let mut failures_by_kind = BTreeMap::new();
        for failure in results.iter().filter_map(|r| r.failure.as_ref()) {
            *failures_by_kind.entry(failure.code().to_string()).or_insert(0) += 1;
        }
        let failed: usize = failures_by_kind.values().sum();
        Self {
            submitted: results.len(),
            succeeded: results.len() - failed,
            failed,
            failures_by_kind,
            results,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobFailure;
    use std::path::PathBuf;

    fn result(index: usize, failure: Option<JobFailure>) -> ExecutionResult {
        ExecutionResult {
            index,
            script_path: PathBuf::from(format!("/s/sim{}.py", index)),
            exit_code: None,
            artifact_path: None,
            log_path: None,
            stdout_path: PathBuf::from("/out/x.stdout"),
            stderr_path: PathBuf::from("/out/x.stderr"),
            attempts: 1,
            elapsed_ms: 5,
            failure,
        }
    }

    #[test]
    fn counts_successes_and_failures_by_kind() {
        let report = RunReport::from_results(vec![
            result(0, None),
            result(1, Some(JobFailure::ExternalProcess { exit_code: Some(2) })),
            result(2, Some(JobFailure::ExternalProcess { exit_code: Some(1) })),
            result(3, Some(JobFailure::Timeout { after_secs: 3 })),
        ]);
        assert_eq!(report.submitted, 4);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 3);
        assert_eq!(report.failures_by_kind["external_process_failure"], 2);
        assert_eq!(report.failures_by_kind["timeout"], 1);
        assert!(!report.all_succeeded());
    }

    #[test]
    fn report_serializes_results_in_order() {
        let report = RunReport::from_results(vec![result(0, None), result(1, None)]);
        assert!(report.all_succeeded());
        let v = serde_json::to_value(&report).expect("json");
        assert_eq!(v["submitted"], 2);
        assert_eq!(v["results"][1]["index"], 1);
        assert!(v["results"][0]["failure"].is_null());
    }
}
