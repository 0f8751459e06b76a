// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::pin::Pin;
use core::sync::atomic::{AtomicUsize, Ordering};
use core::task::{Context, Poll};
use core::time::Duration;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::Arc;

use async_task::{Runnable, Task};

struct Pool {
    queue_rx: flume::Receiver<Runnable>,
    workers: AtomicUsize,
    queued: AtomicUsize,
    max_workers: usize,
    idle_timeout: Duration,
}

impl Pool {
    /// Claims a worker slot if work is backing up and the limit allows it.
    fn claim_slot_if_backlogged(&self, queued_before: usize) -> bool {
        let workers = self.workers.load(Ordering::Acquire);
        queued_before >= workers
            && workers < self.max_workers
            && self
                .workers
                .compare_exchange(workers, workers + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
    }

    /// Gives up a worker slot unless it is the last one.
    fn release_surplus_slot(&self) -> bool {
        self.workers
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |n| (n > 1).then(|| n - 1))
            .is_ok()
    }
}

/// Runs blocking filesystem calls off the caller's thread.
///
/// The pool starts with one worker and adds one whenever a call is queued while every
/// worker is busy, up to `max_workers`. Surplus workers exit after `idle_timeout` without
/// work; the last one stays. If the OS refuses to start any worker at all, calls run
/// inline on the dispatching thread. Workers exit once every clone of the dispatcher
/// and every pending call is gone.
#[derive(Clone)]
pub struct Dispatcher {
    queue_tx: flume::Sender<Runnable>,
    pool: Arc<Pool>,
}

impl Dispatcher {
    pub fn new(max_workers: usize, idle_timeout: Duration) -> Self {
        let (queue_tx, queue_rx) = flume::unbounded();
        let pool = Arc::new(Pool {
            queue_rx,
            workers: AtomicUsize::new(1),
            queued: AtomicUsize::new(0),
            max_workers: max_workers.max(1),
            idle_timeout,
        });
        start_worker(&pool);
        Self { queue_tx, pool }
    }

    /// Runs `f` on a worker and resolves to its return value.
    ///
    /// A panic inside `f` is re-raised when the future is polled. Dropping the future
    /// before `f` starts cancels it; once started, `f` runs to completion.
    pub fn dispatch<T: Send + 'static>(&self, f: impl FnOnce() -> T + Send + 'static) -> DispatchFuture<T> {
        let queue_tx = self.queue_tx.clone();
        let (runnable, task) = async_task::spawn(async move { catch_unwind(AssertUnwindSafe(f)) }, move |runnable: Runnable| {
            let _ = queue_tx.send(runnable);
        });

        let queued_before = self.pool.queued.fetch_add(1, Ordering::Relaxed);
        if self.pool.claim_slot_if_backlogged(queued_before) {
            tracing::trace!(workers = self.pool.workers.load(Ordering::Relaxed), "growing dispatcher");
            start_worker(&self.pool);
        }

        if self.pool.workers.load(Ordering::Acquire) == 0 {
            let _ = self.pool.queued.fetch_sub(1, Ordering::Relaxed);
            let _ = runnable.run();
        } else {
            runnable.schedule();
        }

        DispatchFuture { task }
    }

    #[cfg(test)]
    fn worker_count(&self) -> usize {
        self.pool.workers.load(Ordering::Acquire)
    }
}

/// Starts a worker for a slot the caller already claimed. Frees the slot on failure.
fn start_worker(pool: &Arc<Pool>) {
    let worker_pool = Arc::clone(pool);
    let spawned = std::thread::Builder::new()
        .name("anyfile-dispatcher".into())
        .spawn(move || run_worker(&worker_pool));

    if let Err(e) = spawned {
        let _ = pool.workers.fetch_sub(1, Ordering::AcqRel);
        tracing::warn!(error = %e, "failed to start dispatcher worker");
    }
}

fn run_worker(pool: &Pool) {
    loop {
        match pool.queue_rx.recv_timeout(pool.idle_timeout) {
            Ok(runnable) => {
                let _ = runnable.run();
                let _ = pool.queued.fetch_sub(1, Ordering::Relaxed);
            }
            Err(flume::RecvTimeoutError::Timeout) => {
                if pool.release_surplus_slot() {
                    return;
                }
            }
            Err(flume::RecvTimeoutError::Disconnected) => {
                let _ = pool.workers.fetch_sub(1, Ordering::AcqRel);
                return;
            }
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.pool.workers.load(Ordering::Relaxed))
            .field("queued", &self.pool.queued.load(Ordering::Relaxed))
            .field("max_workers", &self.pool.max_workers)
            .finish()
    }
}

/// Resolves to the result of a dispatched call.
pub struct DispatchFuture<T> {
    task: Task<std::thread::Result<T>>,
}

impl<T> Future for DispatchFuture<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        match Pin::new(&mut self.get_mut().task).poll(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(value),
            Poll::Ready(Err(payload)) => resume_unwind(payload),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for DispatchFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchFuture").finish_non_exhaustive()
    }
}
