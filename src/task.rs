use crate::error::PoolError;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

lazy_static::lazy_static! {
  static ref NEXT_TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// The type of callable that the pool executes.
/// Built from the client's `(callable, argument)` pair at creation time.
pub(crate) type TaskCallable<R> = Box<dyn FnOnce() -> R + Send + 'static>;

/// Progress of a task along its lifecycle. The `detached` flag is tracked
/// separately so a detachment request cannot clobber the execution phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskPhase {
  /// Created by the client, never submitted.
  Created,
  /// Submitted and waiting in the pool's queue.
  Queued,
  /// Claimed by a worker, callable executing.
  Running,
  /// Callable finished, result slot populated. Waiting for a join.
  Finished,
  /// Terminal. The result was consumed (joined) or dropped (reclaimed).
  Joined,
}

struct TaskCore<R: Send + 'static> {
  phase: TaskPhase,
  detached: bool,
  callable: Option<TaskCallable<R>>,
  result: Option<Result<R, PoolError>>,
}

/// State shared between the client-facing [`Task`] handle and the pool's
/// worker loop. All mutation happens under `core`; `finished` is signalled
/// whenever the phase advances past `Running` or the task is detached.
pub(crate) struct TaskShared<R: Send + 'static> {
  task_id: u64,
  core: Mutex<TaskCore<R>>,
  finished: Condvar,
}

impl<R: Send + 'static> TaskShared<R> {
  pub(crate) fn id(&self) -> u64 {
    self.task_id
  }

  /// Marks the task `Queued`. Called by `submit` while the pool lock is held,
  /// which keeps the pool-before-task lock ordering uniform.
  pub(crate) fn enqueue(&self) -> Result<(), PoolError> {
    let mut core = self.core.lock();
    if core.phase != TaskPhase::Created {
      return Err(PoolError::InvalidArgument);
    }
    core.phase = TaskPhase::Queued;
    Ok(())
  }

  /// Rolls a failed submission back to `Created` so the client may retry.
  pub(crate) fn revert_enqueue(&self) {
    let mut core = self.core.lock();
    if core.phase == TaskPhase::Queued {
      core.phase = TaskPhase::Created;
    }
  }

  /// Claims the callable for execution. The phase moves to `Running` unless
  /// the task was detached while queued; a detached task is still executed,
  /// just invisibly to state queries.
  pub(crate) fn begin_execution(&self) -> Option<TaskCallable<R>> {
    let mut core = self.core.lock();
    let callable = core.callable.take();
    if callable.is_some() && !core.detached {
      core.phase = TaskPhase::Running;
    }
    callable
  }

  /// Publishes the execution outcome and wakes every waiter. A detached task
  /// is reclaimed here instead: the outcome is dropped and the task goes
  /// straight to its terminal phase.
  pub(crate) fn complete(&self, outcome: Result<R, PoolError>) {
    let mut core = self.core.lock();
    if core.detached {
      core.result = None;
      core.phase = TaskPhase::Joined;
      trace!(task_id = self.task_id, "detached task reclaimed on completion");
    } else {
      core.result = Some(outcome);
      core.phase = TaskPhase::Finished;
    }
    self.finished.notify_all();
  }
}

/// A unit of work plus its state machine and result slot.
///
/// A task is created with a callable and one argument, submitted to a
/// [`ThreadPoolManager`](crate::ThreadPoolManager), and later either joined
/// (blocking until the result is available) or detached (disclaiming the
/// result and leaving reclamation to the worker loop).
pub struct Task<R: Send + 'static> {
  shared: Arc<TaskShared<R>>,
}

impl<R: Send + 'static> Task<R> {
  /// Creates a task in the `Created` state. Always succeeds; the callable and
  /// argument are captured opaquely and never inspected by the pool.
  pub fn new<A, F>(callable: F, argument: A) -> Self
  where
    A: Send + 'static,
    F: FnOnce(A) -> R + Send + 'static,
  {
    let task_id = NEXT_TASK_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    Self {
      shared: Arc::new(TaskShared {
        task_id,
        core: Mutex::new(TaskCore {
          phase: TaskPhase::Created,
          detached: false,
          callable: Some(Box::new(move || callable(argument))),
          result: None,
        }),
        finished: Condvar::new(),
      }),
    }
  }

  /// Returns the unique ID of this task.
  pub fn id(&self) -> u64 {
    self.shared.task_id
  }

  pub(crate) fn shared(&self) -> &Arc<TaskShared<R>> {
    &self.shared
  }

  /// Returns `true` once the task has finished and its result is waiting to
  /// be joined. Never blocks. A detached task reports `false` here even after
  /// its callable ran, since the worker reclaims the result.
  pub fn is_finished(&self) -> bool {
    let core = self.shared.core.lock();
    core.phase == TaskPhase::Finished && !core.detached
  }

  /// Returns `true` while a worker is executing the callable. Never blocks.
  pub fn is_running(&self) -> bool {
    let core = self.shared.core.lock();
    core.phase == TaskPhase::Running && !core.detached
  }

  /// Blocks the caller until the task finishes, then consumes and returns the
  /// result. The task transitions to `Joined`; the result is handed out
  /// exactly once.
  ///
  /// # Errors
  /// Returns `PoolError::TaskNotPushed` if the task was never submitted.
  /// Returns `PoolError::TaskDetached` if the task was detached, even while
  /// this call was blocked.
  /// Returns `PoolError::ResultUnavailable` if an earlier join already
  /// consumed the result.
  /// Returns `PoolError::TaskPanicked` if the callable panicked.
  pub fn join(&self) -> Result<R, PoolError> {
    let mut core = self.shared.core.lock();
    Self::check_joinable(&core)?;
    while !core.detached && matches!(core.phase, TaskPhase::Queued | TaskPhase::Running) {
      self.shared.finished.wait(&mut core);
    }
    Self::take_result(&mut core)
  }

  /// Identical contract to [`join`](Task::join), but gives up once `timeout`
  /// elapses, returning `PoolError::JoinTimeout` and leaving the task's state
  /// untouched so the join can be retried later.
  pub fn join_timeout(&self, timeout: Duration) -> Result<R, PoolError> {
    let deadline = Instant::now() + timeout;
    let mut core = self.shared.core.lock();
    Self::check_joinable(&core)?;
    while !core.detached && matches!(core.phase, TaskPhase::Queued | TaskPhase::Running) {
      let timed_out = self.shared.finished.wait_until(&mut core, deadline).timed_out();
      // Re-check the phase before giving up: the worker may have published
      // between the wake-up and the deadline.
      if timed_out {
        if !core.detached && matches!(core.phase, TaskPhase::Queued | TaskPhase::Running) {
          return Err(PoolError::JoinTimeout);
        }
        break;
      }
    }
    Self::take_result(&mut core)
  }

  /// Relinquishes interest in the task's result. If the task already
  /// finished, it is reclaimed immediately; otherwise the worker loop
  /// reclaims it on completion with no further client action. Any joiner
  /// currently blocked on this task is woken and observes the detachment.
  ///
  /// # Errors
  /// Returns `PoolError::TaskNotPushed` if the task was never submitted.
  /// Returns `PoolError::TaskDetached` if the task was already detached.
  pub fn detach(&self) -> Result<(), PoolError> {
    let mut core = self.shared.core.lock();
    if core.detached {
      return Err(PoolError::TaskDetached);
    }
    match core.phase {
      TaskPhase::Created => Err(PoolError::TaskNotPushed),
      // Already consumed; nothing left to disclaim.
      TaskPhase::Joined => Ok(()),
      TaskPhase::Finished => {
        core.detached = true;
        core.result = None;
        core.phase = TaskPhase::Joined;
        trace!(task_id = self.shared.task_id, "finished task reclaimed by detach");
        self.shared.finished.notify_all();
        Ok(())
      }
      TaskPhase::Queued | TaskPhase::Running => {
        core.detached = true;
        self.shared.finished.notify_all();
        Ok(())
      }
    }
  }

  /// Explicit manual reclamation. Succeeds only for a task the pool does not
  /// own: one never submitted, or one already joined. The handle stays valid
  /// but inert; backing memory is released when the last reference drops.
  ///
  /// # Errors
  /// Returns `PoolError::TaskDetached` if ownership already passed to the
  /// worker loop.
  /// Returns `PoolError::TaskInPool` while the task is queued, running, or
  /// finished-but-unjoined; join or detach it first.
  pub fn delete(&self) -> Result<(), PoolError> {
    let mut core = self.shared.core.lock();
    if core.detached {
      return Err(PoolError::TaskDetached);
    }
    match core.phase {
      TaskPhase::Created => {
        core.callable = None;
        core.phase = TaskPhase::Joined;
        Ok(())
      }
      TaskPhase::Queued | TaskPhase::Running | TaskPhase::Finished => Err(PoolError::TaskInPool),
      TaskPhase::Joined => Ok(()),
    }
  }

  fn check_joinable(core: &parking_lot::MutexGuard<'_, TaskCore<R>>) -> Result<(), PoolError> {
    if core.detached {
      return Err(PoolError::TaskDetached);
    }
    match core.phase {
      TaskPhase::Created => Err(PoolError::TaskNotPushed),
      TaskPhase::Joined => Err(PoolError::ResultUnavailable),
      _ => Ok(()),
    }
  }

  fn take_result(core: &mut parking_lot::MutexGuard<'_, TaskCore<R>>) -> Result<R, PoolError> {
    if core.detached {
      return Err(PoolError::TaskDetached);
    }
    match core.phase {
      TaskPhase::Finished => {
        core.phase = TaskPhase::Joined;
        core.result.take().unwrap_or(Err(PoolError::ResultUnavailable))
      }
      _ => Err(PoolError::ResultUnavailable),
    }
  }
}

impl<R: Send + 'static> fmt::Debug for Task<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut s = f.debug_struct("Task");
    s.field("task_id", &self.shared.task_id);
    if let Some(core) = self.shared.core.try_lock() {
      s.field("phase", &core.phase).field("detached", &core.detached);
    }
    s.finish_non_exhaustive()
  }
}
