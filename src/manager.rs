use crate::error::PoolError;
use crate::task::{Task, TaskShared};

use std::collections::VecDeque;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, info_span, trace, warn};

/// Hard cap on the worker count a pool may be configured with.
pub const MAX_WORKERS: usize = 64;

/// Hard cap on the pending-task capacity a pool may be configured with.
pub const MAX_QUEUED_TASKS: usize = 100_000;

/// Everything the pool lock guards: the pending queue, the worker counters,
/// the shutdown flag, and the spawned threads' join handles.
struct PoolCore<R: Send + 'static> {
  queue: VecDeque<Arc<TaskShared<R>>>,
  live: usize,
  busy: usize,
  shutdown: bool,
  workers: Vec<thread::JoinHandle<()>>,
}

struct PoolShared<R: Send + 'static> {
  pool_name: String,
  max_workers: usize,
  task_capacity: usize,
  state: Mutex<PoolCore<R>>,
  work_available: Condvar,
}

/// A bounded pool of OS worker threads executing client-submitted tasks.
///
/// Workers are spawned lazily: submission creates a new thread only when
/// every live worker is busy and the configured maximum has not been
/// reached. Tasks are claimed in submission order, but that ordering is a
/// convenience, not a contract.
pub struct ThreadPoolManager<R: Send + 'static> {
  shared: Arc<PoolShared<R>>,
}

impl<R: Send + 'static> ThreadPoolManager<R> {
  /// Creates an empty pool. No worker threads are started eagerly.
  ///
  /// # Errors
  /// Returns `PoolError::InvalidArgument` if `max_workers` is zero or above
  /// [`MAX_WORKERS`], or if `task_capacity` is zero or above
  /// [`MAX_QUEUED_TASKS`].
  pub fn new(max_workers: usize, task_capacity: usize, pool_name: &str) -> Result<Arc<Self>, PoolError> {
    if max_workers == 0 || max_workers > MAX_WORKERS {
      return Err(PoolError::InvalidArgument);
    }
    if task_capacity == 0 || task_capacity > MAX_QUEUED_TASKS {
      return Err(PoolError::InvalidArgument);
    }

    let manager = Arc::new(Self {
      shared: Arc::new(PoolShared {
        pool_name: pool_name.to_string(),
        max_workers,
        task_capacity,
        state: Mutex::new(PoolCore {
          queue: VecDeque::new(),
          live: 0,
          busy: 0,
          shutdown: false,
          workers: Vec::new(),
        }),
        work_available: Condvar::new(),
      }),
    });
    debug!(pool_name = %pool_name, max_workers, task_capacity, "Pool created.");
    Ok(manager)
  }

  pub fn name(&self) -> &str {
    &self.shared.pool_name
  }

  /// Snapshot of the live worker count, safe under concurrent submission and
  /// teardown.
  pub fn worker_count(&self) -> usize {
    self.shared.state.lock().live
  }

  /// Snapshot of the number of workers currently executing a task.
  pub fn busy_worker_count(&self) -> usize {
    self.shared.state.lock().busy
  }

  /// Snapshot of the number of tasks queued but not yet claimed.
  pub fn queued_task_count(&self) -> usize {
    self.shared.state.lock().queue.len()
  }

  /// Enqueues a task, spawning one additional worker thread if every live
  /// worker is busy and the configured maximum allows it. Returns once the
  /// task is queued; does not wait for it to run.
  ///
  /// # Errors
  /// Returns `PoolError::PoolShuttingDown` after shutdown was requested.
  /// Returns `PoolError::TooManyTasks` if the pending queue is at capacity;
  /// the queue and counters are left unchanged.
  /// Returns `PoolError::InvalidArgument` if the task is not in the
  /// `Created` state (already submitted, joined, or reclaimed).
  /// Returns `PoolError::SpawnFailed` if a needed worker thread could not be
  /// created; the task is rolled back to `Created` for a later retry.
  pub fn submit(&self, task: &Task<R>) -> Result<(), PoolError> {
    let shared = &self.shared;
    let mut core = shared.state.lock();

    if core.shutdown {
      warn!(pool_name = %shared.pool_name, task_id = task.id(), "Submit: pool is shutting down.");
      return Err(PoolError::PoolShuttingDown);
    }
    if core.queue.len() >= shared.task_capacity {
      return Err(PoolError::TooManyTasks);
    }
    task.shared().enqueue()?;

    if core.busy == core.live && core.live < shared.max_workers {
      if let Err(spawn_error) = Self::spawn_worker(shared, &mut core) {
        task.shared().revert_enqueue();
        error!(
          pool_name = %shared.pool_name,
          task_id = task.id(),
          "Submit: failed to spawn worker thread: {}",
          spawn_error
        );
        return Err(PoolError::SpawnFailed(spawn_error.to_string()));
      }
    }

    core.queue.push_back(task.shared().clone());
    debug!(
      pool_name = %shared.pool_name,
      task_id = task.id(),
      queued = core.queue.len(),
      "Task queued."
    );
    shared.work_available.notify_one();
    Ok(())
  }

  /// Tears the pool down: wakes every worker, waits for each thread to
  /// terminate, and releases pool-owned resources. Running work is never
  /// interrupted; instead the call refuses to proceed while work remains.
  /// Idempotent once it has succeeded.
  ///
  /// # Errors
  /// Returns `PoolError::HasTasks` if any task is still queued or running,
  /// leaving the pool fully usable.
  pub fn shutdown(&self) -> Result<(), PoolError> {
    let handles = {
      let mut core = self.shared.state.lock();
      if !core.queue.is_empty() || core.busy > 0 {
        return Err(PoolError::HasTasks);
      }
      if !core.shutdown {
        info!(pool_name = %self.shared.pool_name, live = core.live, "Initiating pool shutdown.");
        core.shutdown = true;
      }
      self.shared.work_available.notify_all();
      mem::take(&mut core.workers)
    };

    for handle in handles {
      if handle.join().is_err() {
        error!(pool_name = %self.shared.pool_name, "Worker thread panicked before termination.");
      }
    }
    info!(pool_name = %self.shared.pool_name, "Pool shutdown complete, all workers terminated.");
    Ok(())
  }

  /// Must be called with the pool lock held.
  fn spawn_worker(shared: &Arc<PoolShared<R>>, core: &mut PoolCore<R>) -> std::io::Result<()> {
    let worker_id = core.live;
    let worker_shared = shared.clone();
    let handle = thread::Builder::new()
      .name(format!("{}-worker-{:02}", shared.pool_name, worker_id))
      .spawn(move || Self::run_worker_loop(worker_shared, worker_id))?;
    core.live += 1;
    core.workers.push(handle);
    debug!(
      pool_name = %shared.pool_name,
      worker_id,
      live = core.live,
      "Spawned additional worker thread."
    );
    Ok(())
  }

  fn run_worker_loop(shared: Arc<PoolShared<R>>, worker_id: usize) {
    let _span = info_span!("pool_worker", pool_name = %shared.pool_name, worker_id).entered();
    info!("Worker loop started.");

    loop {
      let claimed = {
        let mut core = shared.state.lock();
        loop {
          if core.shutdown {
            core.live -= 1;
            break None;
          }
          if let Some(task) = core.queue.pop_front() {
            core.busy += 1;
            break Some(task);
          }
          shared.work_available.wait(&mut core);
        }
      };
      let Some(task) = claimed else { break };
      trace!(task_id = task.id(), "Claimed task.");

      if let Some(callable) = task.begin_execution() {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(callable)) {
          Ok(output) => Ok(output),
          Err(_panic_payload) => {
            error!(task_id = task.id(), "Task callable panicked during execution.");
            Err(PoolError::TaskPanicked)
          }
        };
        task.complete(outcome);
        trace!(task_id = task.id(), "Task outcome published.");
      } else {
        error!(task_id = task.id(), "Claimed a task with no callable; dropping it.");
      }

      let mut core = shared.state.lock();
      core.busy -= 1;
    }

    info!("Shutdown signal received. Worker loop terminating.");
  }
}

impl<R: Send + 'static> Drop for ThreadPoolManager<R> {
  fn drop(&mut self) {
    let abandoned = {
      let mut core = self.shared.state.lock();
      if core.shutdown {
        // Explicit shutdown already ran; nothing left to signal.
        return;
      }
      core.shutdown = true;
      self.shared.work_available.notify_all();
      let abandoned: Vec<_> = core.queue.drain(..).collect();
      if !abandoned.is_empty() || core.busy > 0 {
        warn!(
          pool_name = %self.shared.pool_name,
          queued = abandoned.len(),
          busy = core.busy,
          "ThreadPoolManager dropped without explicit shutdown; discarding queued work."
        );
      } else {
        debug!(
          pool_name = %self.shared.pool_name,
          "ThreadPoolManager dropped; signalling workers to stop."
        );
      }
      abandoned
    };

    // Fail the abandoned tasks outside the pool lock so blocked joiners wake
    // up instead of parking forever. Worker threads are not joined here; they
    // observe the shutdown flag, finish any in-flight callable, and exit.
    for task in abandoned {
      task.complete(Err(PoolError::PoolShuttingDown));
    }
  }
}
