use thread_mill::{PoolError, Task, ThreadPoolManager};

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,thread_mill=trace"));

    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

fn gated_task(output: i32) -> (Task<i32>, mpsc::Sender<()>) {
  let (release_tx, release_rx) = mpsc::channel::<()>();
  let task = Task::new(
    move |gate: mpsc::Receiver<()>| {
      let _ = gate.recv();
      output
    },
    release_rx,
  );
  (task, release_tx)
}

fn wait_until(timeout_ms: u64, mut condition: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + Duration::from_millis(timeout_ms);
  while Instant::now() < deadline {
    if condition() {
      return true;
    }
    thread::sleep(Duration::from_millis(5));
  }
  condition()
}

fn shutdown_when_idle<R: Send + 'static>(pool: &ThreadPoolManager<R>) {
  assert!(
    wait_until(2000, || pool.busy_worker_count() == 0 && pool.queued_task_count() == 0),
    "pool did not drain its outstanding work"
  );
  pool.shutdown().expect("idle pool should shut down cleanly");
}

#[test]
fn test_join_returns_the_callable_value() {
  setup_tracing_for_test();
  let pool = ThreadPoolManager::<String>::new(2, 8, "test_task_join_value").unwrap();
  let task = Task::new(|name: &str| format!("{}_done", name), "task1");
  pool.submit(&task).unwrap();
  assert_eq!(task.join(), Ok("task1_done".to_string()));
  shutdown_when_idle(&pool);
}

#[test]
fn test_join_before_submission_fails() {
  setup_tracing_for_test();
  let task = Task::new(|x: i32| x, 1);
  assert_eq!(task.join(), Err(PoolError::TaskNotPushed));
  assert_eq!(task.join_timeout(Duration::from_millis(10)), Err(PoolError::TaskNotPushed));
  assert_eq!(task.detach(), Err(PoolError::TaskNotPushed));
}

#[test]
fn test_second_join_fails() {
  setup_tracing_for_test();
  let pool = ThreadPoolManager::<i32>::new(1, 8, "test_task_second_join").unwrap();
  let task = Task::new(|x: i32| x + 1, 41);
  pool.submit(&task).unwrap();
  assert_eq!(task.join(), Ok(42));
  assert_eq!(task.join(), Err(PoolError::ResultUnavailable));
  shutdown_when_idle(&pool);
}

#[test]
fn test_state_queries_track_the_lifecycle() {
  setup_tracing_for_test();
  let pool = ThreadPoolManager::<i32>::new(1, 8, "test_task_state_queries").unwrap();
  let (task, gate) = gated_task(9);

  assert!(!task.is_running() && !task.is_finished());
  pool.submit(&task).unwrap();
  assert!(wait_until(1000, || task.is_running()));
  assert!(!task.is_finished());

  gate.send(()).unwrap();
  assert!(wait_until(1000, || task.is_finished()));
  assert!(!task.is_running());

  assert_eq!(task.join(), Ok(9));
  assert!(!task.is_finished(), "a joined task no longer reports finished");
  shutdown_when_idle(&pool);
}

#[test]
fn test_detach_running_task_is_reclaimed_automatically() {
  setup_tracing_for_test();
  let pool = ThreadPoolManager::<i32>::new(1, 8, "test_task_detach_running").unwrap();
  let (task, gate) = gated_task(3);
  pool.submit(&task).unwrap();
  assert!(wait_until(1000, || task.is_running()));

  task.detach().unwrap();
  assert_eq!(task.detach(), Err(PoolError::TaskDetached));
  assert_eq!(task.join(), Err(PoolError::TaskDetached));
  assert_eq!(task.delete(), Err(PoolError::TaskDetached));

  gate.send(()).unwrap();
  // The worker reclaims the task on completion; it never becomes joinable.
  assert!(wait_until(1000, || pool.busy_worker_count() == 0));
  assert!(!task.is_finished());
  shutdown_when_idle(&pool);
}

#[test]
fn test_detach_finished_task_reclaims_immediately() {
  setup_tracing_for_test();
  let pool = ThreadPoolManager::<i32>::new(1, 8, "test_task_detach_finished").unwrap();
  let task = Task::new(|x: i32| x * 2, 4);
  pool.submit(&task).unwrap();
  assert!(wait_until(1000, || task.is_finished()));

  task.detach().unwrap();
  assert!(!task.is_finished());
  assert_eq!(task.join(), Err(PoolError::TaskDetached));
  shutdown_when_idle(&pool);
}

#[test]
fn test_detach_wakes_a_blocked_joiner() {
  setup_tracing_for_test();
  let pool = ThreadPoolManager::<i32>::new(1, 8, "test_task_detach_wakes_joiner").unwrap();
  let (task, gate) = gated_task(6);
  pool.submit(&task).unwrap();
  assert!(wait_until(1000, || task.is_running()));

  thread::scope(|s| {
    let joiner = s.spawn(|| task.join());
    thread::sleep(Duration::from_millis(50));
    task.detach().unwrap();
    // The joiner observes the detachment without waiting for the callable.
    assert_eq!(joiner.join().unwrap(), Err(PoolError::TaskDetached));
  });

  gate.send(()).unwrap();
  shutdown_when_idle(&pool);
}

#[test]
fn test_delete_only_outside_pool_ownership() {
  setup_tracing_for_test();
  let pool = ThreadPoolManager::<i32>::new(1, 8, "test_task_delete_ownership").unwrap();

  let never_submitted = Task::new(|x: i32| x, 0);
  assert_eq!(never_submitted.delete(), Ok(()));

  let (pinned, gate) = gated_task(0);
  pool.submit(&pinned).unwrap();
  assert!(wait_until(1000, || pinned.is_running()));
  assert_eq!(pinned.delete(), Err(PoolError::TaskInPool));

  let queued = Task::new(|x: i32| x, 1);
  pool.submit(&queued).unwrap();
  assert_eq!(queued.delete(), Err(PoolError::TaskInPool));

  gate.send(()).unwrap();
  assert!(wait_until(1000, || pinned.is_finished()));
  assert_eq!(pinned.delete(), Err(PoolError::TaskInPool), "a finished-but-unjoined task still belongs to the pool");

  assert_eq!(pinned.join(), Ok(0));
  assert_eq!(pinned.delete(), Ok(()));
  assert_eq!(queued.join(), Ok(1));
  assert_eq!(queued.delete(), Ok(()));
  shutdown_when_idle(&pool);
}

#[test]
fn test_timed_join_times_out_and_can_retry() {
  setup_tracing_for_test();
  let pool = ThreadPoolManager::<i32>::new(1, 8, "test_task_timed_join").unwrap();
  let (task, gate) = gated_task(7);
  pool.submit(&task).unwrap();
  assert!(wait_until(1000, || task.is_running()));

  assert_eq!(task.join_timeout(Duration::from_millis(50)), Err(PoolError::JoinTimeout));
  // The elapsed deadline leaves the task untouched for a later retry.
  assert!(task.is_running());

  gate.send(()).unwrap();
  assert_eq!(task.join_timeout(Duration::from_secs(2)), Ok(7));
  shutdown_when_idle(&pool);
}

#[test]
fn test_panicking_callable_is_contained() {
  setup_tracing_for_test();
  let pool = ThreadPoolManager::<i32>::new(1, 8, "test_task_panic_contained").unwrap();

  let exploding = Task::<i32>::new(|_: ()| panic!("task blew up on purpose"), ());
  pool.submit(&exploding).unwrap();
  assert_eq!(exploding.join(), Err(PoolError::TaskPanicked));

  // The worker survives the panic and keeps serving tasks.
  let follow_up = Task::new(|x: i32| x + 1, 1);
  pool.submit(&follow_up).unwrap();
  assert_eq!(follow_up.join(), Ok(2));
  assert_eq!(pool.worker_count(), 1);
  shutdown_when_idle(&pool);
}
