use crate::dispatch::TaskHandle;
use crate::result::ExecutionResult;
use tracing::info;

/// Block until every handle resolves and return results in submission order.
///
/// There is no early return and no timeout here: a hung job stalls the
/// barrier but never aborts its siblings.
pub fn wait_all(handles: Vec<TaskHandle>) -> Vec<ExecutionResult> {
    let total = handles.len();
    let results: Vec<ExecutionResult> = handles.into_iter().map(TaskHandle::wait).collect();
    let failed = results.iter().filter(|r| !r.is_success()).count();
    info!(
        jobs = total,
        succeeded = total - failed,
        failed,
        "all jobs resolved"
    );
    results
}
