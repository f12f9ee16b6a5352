use thiserror::Error;

/// Errors that can occur within the `thread_mill` pool.
#[derive(Error, Debug, PartialEq)]
pub enum PoolError {
  #[error("Invalid argument (bad pool configuration, or task not in a submittable state)")]
  InvalidArgument,

  #[error("Pool's pending-task queue is at capacity, cannot accept another task")]
  TooManyTasks,

  #[error("Pool still has queued or running tasks, cannot shut down")]
  HasTasks,

  #[error("Task was detached, its result belongs to the worker loop")]
  TaskDetached,

  #[error("Task was never submitted to a pool")]
  TaskNotPushed,

  #[error("Task is still owned by the pool, join or detach it before deleting")]
  TaskInPool,

  #[error("Task result already taken by an earlier join")]
  ResultUnavailable,

  #[error("Timed join elapsed before the task finished")]
  JoinTimeout,

  #[error("Submitted task callable panicked")]
  TaskPanicked,

  #[error("Failed to spawn a worker thread: {0}")]
  SpawnFailed(String),

  #[error("Pool is shutting down or already shut down, cannot accept new tasks")]
  PoolShuttingDown,
}
