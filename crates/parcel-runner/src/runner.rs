//! Runs one job to completion: resource checks, process launch, artifact
//! collection and the optional timestamp log.

use crate::config::RunOptions;
use crate::error::JobFailure;
use crate::fs_util::{atomic_write_bytes, ensure_dir, move_file};
use crate::manifest::Job;
use crate::result::{Completed, ExecutionResult};
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

type AttemptOutcome = Result<Completed, (Option<i32>, JobFailure)>;

/// Execute `job`, retrying retryable failures up to `options.max_retries` times.
pub fn run_job(job: &Job, options: &RunOptions) -> ExecutionResult {
    let started = Instant::now();
    let log_path = if options.timestamp_log {
        match write_timestamp_log(job) {
            Ok(path) => Some(path),
            Err(failure) => {
                return ExecutionResult::finished(
                    job,
                    None,
                    Err((None, failure)),
                    0,
                    started.elapsed(),
                )
            }
        }
    } else {
        None
    };

    let mut attempts = 0;
    let outcome = loop {
        attempts += 1;
        let outcome = run_attempt(job, options);
        match &outcome {
            Err((_, failure)) if failure.is_retryable() && attempts <= options.max_retries => {
                warn!(
                    job = job.index,
                    script = %job.script_path.display(),
                    attempt = attempts,
                    error = %failure,
                    "job attempt failed, retrying"
                );
            }
            _ => break outcome,
        }
    };

    let result = ExecutionResult::finished(job, log_path, outcome, attempts, started.elapsed());
    match &result.failure {
        None => info!(
            job = job.index,
            artifact = %job.artifact_path().display(),
            elapsed_ms = result.elapsed_ms,
            "job succeeded"
        ),
        Some(failure) => warn!(
            job = job.index,
            script = %job.script_path.display(),
            error = %failure,
            elapsed_ms = result.elapsed_ms,
            "job failed"
        ),
    }
    result
}

fn run_attempt(job: &Job, options: &RunOptions) -> AttemptOutcome {
    check_resources(job).map_err(|f| (None, f))?;
    prepare_dirs(job).map_err(|f| (None, f))?;

    let status = run_process(job, options.timeout).map_err(|f| (None, f))?;
    let exit_code = status.code();
    if !status.success() {
        return Err((exit_code, JobFailure::ExternalProcess { exit_code }));
    }

    let artifact_path = collect_artifact(job).map_err(|f| (exit_code, f))?;
    Ok(Completed {
        exit_code,
        artifact_path,
    })
}

fn check_resources(job: &Job) -> Result<(), JobFailure> {
    if !job.wrapper_path.is_file() {
        return Err(JobFailure::resource_not_found("wrapper", &job.wrapper_path));
    }
    if !job.script_path.is_file() {
        return Err(JobFailure::resource_not_found("script", &job.script_path));
    }
    Ok(())
}

fn prepare_dirs(job: &Job) -> Result<(), JobFailure> {
    ensure_dir(&job.output_dir).map_err(|e| JobFailure::io("create output dir", e))?;
    ensure_dir(&job.work_dir).map_err(|e| JobFailure::io("create work dir", e))?;
    // A movie left over from an earlier run would mask a crash in this one.
    let expected = job.expected_output_path();
    if expected.exists() {
        fs::remove_file(&expected).map_err(|e| JobFailure::io("clear stale output", e))?;
    }
    Ok(())
}

fn run_process(job: &Job, timeout: Option<Duration>) -> Result<ExitStatus, JobFailure> {
    let command = job.command();
    let stdout =
        fs::File::create(job.stdout_path()).map_err(|e| JobFailure::io("create stdout file", e))?;
    let stderr =
        fs::File::create(job.stderr_path()).map_err(|e| JobFailure::io("create stderr file", e))?;

    let mut cmd = Command::new(&command[0]);
    cmd.args(&command[1..]);
    cmd.current_dir(&job.work_dir);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::from(stdout));
    cmd.stderr(Stdio::from(stderr));

    info!(job = job.index, command = %command.join(" "), work_dir = %job.work_dir.display(), "starting job");
    let mut child = cmd
        .spawn()
        .map_err(|e| JobFailure::io("spawn runtime command", e))?;
    wait_for_exit(&mut child, timeout)
}

/// Kill and reap a child, logging rather than failing if either step errors.
fn stop_child(child: &mut Child) {
    let pid = child.id();
    if let Err(e) = child.kill() {
        warn!(pid, error = %e, "failed to kill timed-out job");
    }
    if let Err(e) = child.wait() {
        warn!(pid, error = %e, "failed to reap timed-out job");
    }
}

fn wait_for_exit(child: &mut Child, timeout: Option<Duration>) -> Result<ExitStatus, JobFailure> {
    let Some(limit) = timeout else {
        return child.wait().map_err(|e| JobFailure::io("wait for process", e));
    };
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|e| JobFailure::io("poll process", e))?
        {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            stop_child(child);
            return Err(JobFailure::Timeout {
                after_secs: limit.as_secs(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn collect_artifact(job: &Job) -> Result<PathBuf, JobFailure> {
    let produced = job.expected_output_path();
    if !produced.is_file() {
        return Err(JobFailure::ArtifactMissing { expected: produced });
    }
    let target = job.artifact_path();
    move_file(&produced, &target).map_err(|e| JobFailure::io("move artifact", e))?;
    debug!(from = %produced.display(), to = %target.display(), "artifact moved");
    Ok(target)
}

fn write_timestamp_log(job: &Job) -> Result<PathBuf, JobFailure> {
    let path = job.log_path();
    let line = format!("{}\n", Utc::now().to_rfc3339());
    atomic_write_bytes(&path, line.as_bytes()).map_err(|e| JobFailure::io("write timestamp log", e))?;
    Ok(path)
}
