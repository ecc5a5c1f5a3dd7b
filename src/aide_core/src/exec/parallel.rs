//! Bounded-concurrency execution of independent tasks.
//!
//! Admission is governed by a semaphore sized `max_parallel`; tasks
//! beyond the limit wait for a permit. Results come back in submission
//! order with per-task error wrapping. An overall timeout cancels the
//! stragglers and records a timeout error in their slots.

use aide_types::prelude::{CoreError, CoreResult};
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, warn};

pub type BoxedTask<T> = BoxFuture<'static, CoreResult<T>>;

pub struct ParallelExecutor {
    semaphore: Arc<Semaphore>,
    blocking_slots: Arc<Semaphore>,
    active: Mutex<Vec<AbortHandle>>,
}

impl ParallelExecutor {
    pub fn new(max_parallel: usize, thread_pool_size: usize) -> Self {
        ParallelExecutor {
            semaphore: Arc::new(Semaphore::new(max_parallel.max(1))),
            blocking_slots: Arc::new(Semaphore::new(thread_pool_size.max(1))),
            active: Mutex::new(Vec::new()),
        }
    }

    /// Run every task under the concurrency budget; results in
    /// submission order.
    pub async fn execute<T: Send + 'static>(
        &self,
        tasks: Vec<BoxedTask<T>>,
        timeout: Option<Duration>,
    ) -> Vec<CoreResult<T>> {
        let handles: Vec<JoinHandle<CoreResult<T>>> =
            tasks.into_iter().map(|task| self.spawn_task(task)).collect();
        self.register(&handles);

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut results = Vec::with_capacity(handles.len());
        let mut timed_out = false;

        for handle in handles {
            if timed_out {
                handle.abort();
                results.push(Err(CoreError::Timeout(
                    "parallel execution deadline elapsed".to_string(),
                )));
                continue;
            }
            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!("Parallel execution deadline elapsed; cancelling stragglers");
                        timed_out = true;
                        results.push(Err(CoreError::Timeout(
                            "parallel execution deadline elapsed".to_string(),
                        )));
                        continue;
                    }
                },
                None => handle.await,
            };
            results.push(flatten_join(joined));
        }

        self.prune();
        results
    }

    /// Priority-ordered admission (ascending), results re-sorted back to
    /// submission order.
    pub async fn execute_prioritized<T: Send + 'static>(
        &self,
        tasks: Vec<(i32, BoxedTask<T>)>,
        timeout: Option<Duration>,
    ) -> Vec<CoreResult<T>> {
        let mut indexed: Vec<(usize, i32, BoxedTask<T>)> = tasks
            .into_iter()
            .enumerate()
            .map(|(index, (priority, task))| (index, priority, task))
            .collect();
        indexed.sort_by_key(|(_, priority, _)| *priority);

        let order: Vec<usize> = indexed.iter().map(|(index, _, _)| *index).collect();
        let ordered_tasks: Vec<BoxedTask<T>> =
            indexed.into_iter().map(|(_, _, task)| task).collect();

        let mut by_priority = self.execute(ordered_tasks, timeout).await;

        let mut results: Vec<Option<CoreResult<T>>> =
            (0..by_priority.len()).map(|_| None).collect();
        for original_index in order.into_iter().rev() {
            results[original_index] = by_priority.pop();
        }
        results
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(CoreError::Interrupted)))
            .collect()
    }

    /// Run a CPU-bound closure on the blocking pool, bounded by the
    /// configured thread budget.
    pub async fn run_blocking<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.blocking_slots)
            .acquire_owned()
            .await
            .map_err(|_| CoreError::Interrupted)?;
        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f()
        })
        .await
        .map_err(|_| CoreError::Interrupted)?;
        Ok(result)
    }

    /// Request cancellation of every in-flight task.
    pub fn cancel_all(&self) {
        let mut active = self.active.lock().expect("executor lock poisoned");
        let count = active.len();
        for handle in active.drain(..) {
            handle.abort();
        }
        if count > 0 {
            debug!(cancelled = count, "Cancelled in-flight tasks");
        }
    }

    fn spawn_task<T: Send + 'static>(&self, task: BoxedTask<T>) -> JoinHandle<CoreResult<T>> {
        let semaphore = Arc::clone(&self.semaphore);
        tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| CoreError::Interrupted)?;
            task.await
        })
    }

    fn register<T>(&self, handles: &[JoinHandle<CoreResult<T>>]) {
        let mut active = self.active.lock().expect("executor lock poisoned");
        active.extend(handles.iter().map(JoinHandle::abort_handle));
    }

    fn prune(&self) {
        self.active
            .lock()
            .expect("executor lock poisoned")
            .retain(|handle| !handle.is_finished());
    }
}

fn flatten_join<T>(joined: Result<CoreResult<T>, tokio::task::JoinError>) -> CoreResult<T> {
    match joined {
        Ok(result) => result,
        Err(join_error) if join_error.is_cancelled() => Err(CoreError::Interrupted),
        Err(join_error) => {
            warn!(error = %join_error, "Parallel task failed to join");
            Err(CoreError::Interrupted)
        }
    }
}
