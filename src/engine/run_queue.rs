// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! Per-device run queues and their worker threads.
//!
//! Each device string owns exactly one queue, created on first use and kept
//! for the life of the process. A queue is a mutex-guarded FIFO plus a
//! condvar; its workers are plain OS threads so a blocking backend call never
//! interacts with any async scheduler. Device names are case-insensitive and
//! normalized to uppercase.
//!
//! Worker loop, per iteration: wait for work, gather a batch under the lock,
//! optionally hold the lock a bounded extra wait for a model's declared
//! minimum batch, then release the lock and execute. Job completion is
//! delivered after execution with no lock held.

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crate::backends::BackendRegistry;
use crate::engine::batching;
use crate::engine::run_info::{self, RunInfo};
use crate::engine::session::ExecutionSession;
use crate::errors::RunError;
use crate::observability::messages::queue::{QueueCreated, QueueShutdown, WorkerStarted};
use crate::observability::messages::StructuredLog;

struct QueueState {
    jobs: VecDeque<Box<RunInfo>>,
    shutdown: bool,
}

/// One device's FIFO of pending jobs.
pub struct RunQueue {
    device: String,
    shared: Mutex<QueueState>,
    cond: Condvar,
    workers: usize,
}

impl RunQueue {
    fn new(device: String, workers: usize) -> RunQueue {
        RunQueue {
            device,
            shared: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                shutdown: false,
            }),
            cond: Condvar::new(),
            workers,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn push(&self, job: Box<RunInfo>) {
        let mut state = self.lock();
        state.jobs.push_back(job);
        drop(state);
        self.cond.notify_one();
    }

    fn begin_shutdown(&self) {
        let mut state = self.lock();
        state.shutdown = true;
        drop(state);
        self.cond.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, QueueState>) -> MutexGuard<'a, QueueState> {
        match self.cond.wait(guard) {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn wait_timeout<'a>(
        &self,
        guard: MutexGuard<'a, QueueState>,
        timeout: Duration,
    ) -> MutexGuard<'a, QueueState> {
        match self.cond.wait_timeout(guard, timeout) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }
}

/// What every worker thread carries.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub backends: Arc<BackendRegistry>,
    /// Upper bound on how long a worker holds an under-minimum batch open
    /// waiting for more same-model jobs.
    pub minbatch_wait: Duration,
}

/// Owns every device queue and its worker threads.
pub struct DeviceRegistry {
    queues: Mutex<HashMap<String, Arc<RunQueue>>>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
    threads_per_queue: usize,
    ctx: WorkerContext,
}

impl DeviceRegistry {
    pub(crate) fn new(threads_per_queue: usize, ctx: WorkerContext) -> DeviceRegistry {
        DeviceRegistry {
            queues: Mutex::new(HashMap::new()),
            handles: Mutex::new(Vec::new()),
            threads_per_queue,
            ctx,
        }
    }

    /// The queue for `device`, creating it (and spawning its workers) on
    /// first use. Idempotent under concurrency: the queues map stays locked
    /// across the check and the insert, so two racing callers get the same
    /// queue back.
    pub fn ensure_queue(&self, device: &str) -> Result<Arc<RunQueue>, RunError> {
        let key = device.to_ascii_uppercase();
        let mut queues = self.lock_queues();
        if let Some(queue) = queues.get(&key) {
            return Ok(queue.clone());
        }

        let queue = Arc::new(RunQueue::new(key.clone(), self.threads_per_queue));
        let mut handles = self.lock_handles();
        for worker in 0..self.threads_per_queue {
            let spawned = thread::Builder::new()
                .name(format!("tensorq-{}-{}", key.to_lowercase(), worker))
                .spawn({
                    let queue = queue.clone();
                    let ctx = self.ctx.clone();
                    move || worker_loop(queue, ctx, worker)
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // Already-spawned workers for this queue wind down; the
                    // device stays absent so a later attempt may retry.
                    queue.begin_shutdown();
                    return Err(RunError::QueueInitFailed {
                        device: key,
                        reason: err.to_string(),
                    });
                }
            }
        }

        queues.insert(key.clone(), queue.clone());
        QueueCreated {
            device: &key,
            workers: self.threads_per_queue,
        }
        .log();
        Ok(queue)
    }

    pub fn get(&self, device: &str) -> Option<Arc<RunQueue>> {
        let key = device.to_ascii_uppercase();
        self.lock_queues().get(&key).cloned()
    }

    pub fn devices(&self) -> Vec<String> {
        self.lock_queues().keys().cloned().collect()
    }

    /// Drain every queue and join every worker. Queued jobs still execute;
    /// new pushes after this point are never picked up.
    pub fn shutdown(&self) {
        let queues: Vec<Arc<RunQueue>> = self.lock_queues().values().cloned().collect();
        for queue in &queues {
            queue.begin_shutdown();
        }
        let handles: Vec<thread::JoinHandle<()>> = self.lock_handles().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        for queue in &queues {
            QueueShutdown {
                device: queue.device(),
            }
            .log();
        }
    }

    fn lock_queues(&self) -> MutexGuard<'_, HashMap<String, Arc<RunQueue>>> {
        match self.queues.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_handles(&self) -> MutexGuard<'_, Vec<thread::JoinHandle<()>>> {
        match self.handles.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(queue: Arc<RunQueue>, ctx: WorkerContext, worker: usize) {
    let startup = WorkerStarted {
        device: queue.device(),
        worker,
    };
    startup.log();
    // Everything this thread logs carries the device/worker fields.
    let _dispatch_span = startup.span("dispatch").entered();

    loop {
        let mut state = queue.lock();
        while state.jobs.is_empty() && !state.shutdown {
            state = queue.wait(state);
        }
        if state.jobs.is_empty() && state.shutdown {
            return;
        }

        let (mut batch, acc) = batching::gather(&mut state.jobs);

        // Hold an under-minimum batch open for a bounded window, still under
        // the lock so arriving same-model jobs are absorbed directly.
        if let Some(mut acc) = acc {
            if acc.wants_more() {
                let deadline = Instant::now() + ctx.minbatch_wait;
                loop {
                    batching::gather_more(&mut state.jobs, &mut batch, &mut acc);
                    if !acc.wants_more() || state.shutdown {
                        break;
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    state = queue.wait_timeout(state, deadline - now);
                }
            }
        }
        drop(state);

        let session = ExecutionSession::new(queue.device(), &ctx.backends);
        if panic::catch_unwind(AssertUnwindSafe(|| session.run(&mut batch))).is_err() {
            for job in batch.iter_mut() {
                if job.result().is_none() {
                    job.finish(Err(RunError::BackendExecutionError {
                        detail: "backend panicked during execution".into(),
                        oneline: "backend panicked during execution".into(),
                    }));
                }
            }
        }

        for job in batch {
            run_info::deliver(job);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(threads: usize) -> DeviceRegistry {
        DeviceRegistry::new(
            threads,
            WorkerContext {
                backends: Arc::new(BackendRegistry::new()),
                minbatch_wait: Duration::from_millis(2),
            },
        )
    }

    #[test]
    fn ensure_queue_is_idempotent_and_case_insensitive() {
        let registry = registry(1);
        let a = registry.ensure_queue("gpu:0").unwrap();
        let b = registry.ensure_queue("GPU:0").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.device(), "GPU:0");
        assert_eq!(registry.devices().len(), 1);
    }

    #[test]
    fn concurrent_ensure_queue_yields_one_queue() {
        let registry = Arc::new(registry(1));
        let mut joins = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            joins.push(thread::spawn(move || {
                registry.ensure_queue("cpu").unwrap()
            }));
        }
        let queues: Vec<Arc<RunQueue>> = joins.into_iter().map(|j| j.join().unwrap()).collect();
        for queue in &queues[1..] {
            assert!(Arc::ptr_eq(&queues[0], queue));
        }
        assert_eq!(registry.devices(), vec!["CPU".to_string()]);
    }

    #[test]
    fn shutdown_joins_workers() {
        let registry = registry(2);
        let queue = registry.ensure_queue("cpu").unwrap();
        assert_eq!(queue.worker_count(), 2);
        registry.shutdown();
        // A second shutdown (e.g. from Drop) is a no-op.
        registry.shutdown();
    }
}
