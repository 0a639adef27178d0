//! Parallel request fan-out.

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::Result;

/// Runs `task` once per item on a dedicated pool of `threads` threads and
/// returns the results in item order. Returns after every task finished.
///
/// Items are never batched, so with `threads >= items.len()` every task gets
/// its own thread and blocking requests really overlap.
pub fn fan_out<T, R, F>(threads: usize, items: Vec<T>, task: F) -> Result<Vec<R>>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Send + Sync,
{
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("takeoff-fanout-{i}"))
        .build()?;

    Ok(pool.install(|| items.into_par_iter().with_max_len(1).map(task).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier, Mutex};

    #[test]
    fn test_results_keep_item_order() {
        let squares = fan_out(4, (0..20).collect(), |n: u64| n * n).unwrap();
        assert_eq!(squares, (0..20).map(|n| n * n).collect::<Vec<_>>());
    }

    #[test]
    fn test_tasks_run_concurrently() {
        // Deadlocks unless all eight tasks are in flight at once.
        let barrier = Arc::new(Barrier::new(8));
        let threads = Arc::new(Mutex::new(HashSet::new()));

        fan_out(8, (0..8).collect(), |_: usize| {
            threads
                .lock()
                .unwrap()
                .insert(std::thread::current().id());
            barrier.wait();
        })
        .unwrap();

        assert_eq!(threads.lock().unwrap().len(), 8);
    }

    #[test]
    fn test_empty_input() {
        let results: Vec<u8> = fan_out(3, Vec::<u8>::new(), |n| n).unwrap();
        assert!(results.is_empty());
    }
}
