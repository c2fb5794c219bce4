//! Logical thread pool: ordered task queues per logical thread, plus a
//! global completion latch (spec.md §4.2).
//!
//! A "thread" here is a single-consumer FIFO identified by an opaque
//! `thread_id` — not an OS thread. Tasks within one thread_id run strictly in
//! append order; different thread_ids run concurrently with unspecified
//! relative order. This replaces a general work-stealing pool with the
//! minimum primitive the scheduler needs (spec.md §4.2 rationale).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Notify};

use crate::error::ExecError;

/// A unit of work scheduled on a thread_id's queue.
pub type Task = Pin<Box<dyn Future<Output = Result<(), ExecError>> + Send>>;

struct Lane {
    tx: mpsc::UnboundedSender<Task>,
}

/// Per-chain ordered executor with a single pool-wide completion signal.
#[derive(Clone)]
pub struct ThreadPool {
    lanes: Arc<Mutex<HashMap<String, Lane>>>,
    outstanding: Arc<AtomicUsize>,
    terminal_error: Arc<Mutex<Option<ExecError>>>,
    notify: Arc<Notify>,
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadPool {
    pub fn new() -> Self {
        Self {
            lanes: Arc::new(Mutex::new(HashMap::new())),
            outstanding: Arc::new(AtomicUsize::new(0)),
            terminal_error: Arc::new(Mutex::new(None)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Appends `task` to `thread_id`'s queue, creating it lazily. A no-op if
    /// the pool already holds a terminal error (spec.md §4.2).
    pub fn schedule(&self, thread_id: String, task: Task) {
        if self.terminal_error.lock().unwrap().is_some() {
            return;
        }

        // Count the task as outstanding before it is even sent, so a
        // concurrent `wait_for_completion` can never observe outstanding==0
        // while this task is still in flight.
        self.outstanding.fetch_add(1, Ordering::SeqCst);

        let mut lanes = self.lanes.lock().unwrap();
        let lane = lanes.entry(thread_id).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel::<Task>();
            self.spawn_lane_worker(rx);
            Lane { tx }
        });
        if lane.tx.send(task).is_err() {
            // Worker already exited (pool went terminal between the check
            // above and here); undo the optimistic count.
            self.finish_one(None);
        }
    }

    fn spawn_lane_worker(&self, mut rx: mpsc::UnboundedReceiver<Task>) {
        let outstanding = self.outstanding.clone();
        let terminal_error = self.terminal_error.clone();
        let notify = self.notify.clone();
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                let result = task.await;
                if let Err(e) = result {
                    let mut slot = terminal_error.lock().unwrap();
                    if slot.is_none() {
                        *slot = Some(e);
                    }
                }
                outstanding.fetch_sub(1, Ordering::SeqCst);
                notify.notify_waiters();
            }
        });
    }

    fn finish_one(&self, error: Option<ExecError>) {
        if let Some(e) = error {
            let mut slot = self.terminal_error.lock().unwrap();
            if slot.is_none() {
                *slot = Some(e);
            }
        }
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolves once every scheduled task across every lane has completed,
    /// or rejects with the first task error observed.
    pub async fn wait_for_completion(&self) -> Result<(), ExecError> {
        loop {
            if let Some(e) = self.terminal_error.lock().unwrap().clone() {
                return Err(e);
            }
            if self.outstanding.load(Ordering::SeqCst) == 0 {
                return Ok(());
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    #[tokio::test]
    async fn tasks_on_same_lane_run_in_append_order() {
        let pool = ThreadPool::new();
        let order = Arc::new(AsyncMutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            pool.schedule(
                "lane-a".into(),
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    order.lock().await.push(i);
                    Ok(())
                }),
            );
        }

        pool.wait_for_completion().await.unwrap();
        assert_eq!(*order.lock().await, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn distinct_lanes_run_concurrently_and_all_complete() {
        let pool = ThreadPool::new();
        let counter = Arc::new(AtomicU32::new(0));
        for i in 0..10 {
            let counter = counter.clone();
            pool.schedule(
                format!("lane-{i}"),
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            );
        }
        pool.wait_for_completion().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn first_error_is_captured_and_subsequent_schedules_are_dropped() {
        let pool = ThreadPool::new();
        pool.schedule(
            "lane-a".into(),
            Box::pin(async move { Err(ExecError::ExecutionTimeout) }),
        );
        let result = pool.wait_for_completion().await;
        assert!(matches!(result, Err(ExecError::ExecutionTimeout)));

        let ran = Arc::new(AtomicU32::new(0));
        let ran2 = ran.clone();
        pool.schedule(
            "lane-b".into(),
            Box::pin(async move {
                ran2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0, "schedule after terminal error must be a no-op");
    }

    #[tokio::test]
    async fn empty_pool_completes_immediately() {
        let pool = ThreadPool::new();
        pool.wait_for_completion().await.unwrap();
    }
}
