//! Fan-out of jobs onto a pool of worker threads.
//!
//! The submission side only relies on [`Executor::submit`] returning a
//! [`TaskHandle`]; the pool below is the in-process implementation.

use crate::config::RunOptions;
use crate::manifest::{Job, RunManifest};
use crate::result::ExecutionResult;
use crate::runner::run_job;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use tracing::{debug, error, info};

/// A unit of work producing one job's result.
pub type Task = Box<dyn FnOnce() -> ExecutionResult + Send + 'static>;

type Message = Box<dyn FnOnce() + Send + 'static>;

/// Anything that can run tasks asynchronously and hand back a handle.
pub trait Executor {
    fn submit(&self, job: &Job, task: Task) -> TaskHandle;
}

/// Resolves to the result of one submitted job.
#[derive(Debug)]
pub struct TaskHandle {
    job: Job,
    receiver: Receiver<ExecutionResult>,
}

impl TaskHandle {
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Block until the task finishes. A task that died without reporting
    /// resolves to a `worker_lost` failure instead of hanging.
    pub fn wait(self) -> ExecutionResult {
        match self.receiver.recv() {
            Ok(result) => result,
            Err(_) => {
                error!(job = self.job.index, script = %self.job.script_path.display(), "worker lost");
                ExecutionResult::lost(&self.job)
            }
        }
    }
}

/// Fixed-size pool of named worker threads fed from one queue.
pub struct WorkerPool {
    sender: Option<Sender<Message>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> io::Result<Self> {
        let size = size.max(1);
        let (sender, receiver) = unbounded::<Message>();
        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("parcel-worker-{}", id))
                .spawn(move || worker_loop(id, receiver))?;
            workers.push(handle);
        }
        debug!(workers = size, "worker pool started");
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }
}

fn worker_loop(id: usize, receiver: Receiver<Message>) {
    while let Ok(message) = receiver.recv() {
        // A panicking task drops its result sender, which its handle
        // reports as a lost worker; the thread keeps serving.
        if panic::catch_unwind(AssertUnwindSafe(message)).is_err() {
            error!(worker = id, "task panicked");
        }
    }
    debug!(worker = id, "worker stopped");
}

impl Executor for WorkerPool {
    fn submit(&self, job: &Job, task: Task) -> TaskHandle {
        let (tx, rx) = bounded(1);
        let message: Message = Box::new(move || {
            let _ = tx.send(task());
        });
        if let Some(sender) = &self.sender {
            // On a closed queue the message (and its result sender) is
            // dropped here, so the handle resolves as lost.
            let _ = sender.send(message);
        }
        TaskHandle {
            job: job.clone(),
            receiver: rx,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Submits every job of a manifest to an executor.
pub struct SubmissionClient<'a, E: Executor> {
    executor: &'a E,
    options: RunOptions,
}

impl<'a, E: Executor> SubmissionClient<'a, E> {
    pub fn new(executor: &'a E, options: RunOptions) -> Self {
        Self { executor, options }
    }

    /// One handle per job, in manifest order.
    pub fn submit_all(&self, manifest: &RunManifest) -> Vec<TaskHandle> {
        let handles: Vec<TaskHandle> = manifest
            .iter()
            .map(|job| {
                let owned = job.clone();
                let options = self.options;
                debug!(job = job.index, script = %job.script_path.display(), "submitting job");
                self.executor
                    .submit(job, Box::new(move || run_job(&owned, &options)))
            })
            .collect();
        info!(jobs = handles.len(), "jobs submitted");
        handles
    }
}
