use thread_mill::{Task, ThreadPoolManager};

use std::thread;
use std::time::Duration;
use tracing::info;

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Detach and Reclaim Demo ---");

  let pool = ThreadPoolManager::<()>::new(4, 32, "fire_and_forget_pool").expect("pool configuration is valid");

  // Fire-and-forget: submit, then detach. The worker loop reclaims each task
  // when it finishes; no join is ever required.
  for i in 0..8usize {
    let task = Task::new(
      move |delay_ms: u64| {
        thread::sleep(Duration::from_millis(delay_ms));
        info!("background task {} done", i);
      },
      20 + (i as u64 * 10),
    );
    pool.submit(&task).expect("capacity is sufficient");
    task.detach().expect("freshly submitted task is detachable");
  }

  info!(
    "8 tasks detached across {} workers; waiting for the pool to drain.",
    pool.worker_count()
  );

  while pool.busy_worker_count() > 0 || pool.queued_task_count() > 0 {
    thread::sleep(Duration::from_millis(10));
  }

  pool.shutdown().expect("Pool shutdown failed");
  info!("Pool drained and shut down.");
  info!("--- Detach and Reclaim Demo End ---");
}
