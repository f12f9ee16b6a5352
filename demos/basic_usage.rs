use thread_mill::{Task, ThreadPoolManager};

use std::thread;
use std::time::Duration;
use tracing::info;

fn my_task_fn(input: (usize, u64)) -> String {
  let (id, delay_ms) = input;
  info!("Task {} starting, will sleep for {}ms", id, delay_ms);
  thread::sleep(Duration::from_millis(delay_ms));
  let result = format!("Task {} finished after {}ms", id, delay_ms);
  info!("{}", result);
  result
}

fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Basic Usage Demo ---");

  let pool = ThreadPoolManager::<String>::new(
    2,  // Maximum workers
    10, // Pending-task capacity
    "basic_pool",
  )
  .expect("pool configuration is valid");

  let mut tasks = Vec::new();
  for i in 0..5 {
    // Alternate sleep times for variety
    let sleep_duration: u64 = 100 + (i as u64 % 3 * 50);
    let task = Task::new(my_task_fn, (i, sleep_duration));
    match pool.submit(&task) {
      Ok(()) => {
        info!("Submitted task {} with id {}", i, task.id());
        tasks.push(task);
      }
      Err(e) => {
        tracing::error!("Failed to submit task {}: {:?}", i, e);
      }
    }
  }

  info!("All tasks submitted, {} workers live. Joining results...", pool.worker_count());

  for task in tasks {
    let task_id = task.id();
    match task.join() {
      Ok(result) => info!("Result for task {}: {}", task_id, result),
      Err(e) => info!("Error for task {}: {:?}", task_id, e),
    }
  }

  info!("All task results processed. Shutting down pool.");
  pool.shutdown().expect("Pool shutdown failed");
  info!("Pool shutdown complete.");
  info!("--- Basic Usage Demo End ---");
}
