// src/partition.rs
//
// Splits the strategy list into one contiguous batch per worker. The last
// `N % W` items are dealt one each to the first workers, so batch sizes
// differ by at most one.

use tracing::debug;

use crate::error::{BenchError, Result};

/// Partition `items` into exactly `workers` batches (some may be empty)
pub fn create_batches<T: Clone>(items: &[T], workers: usize) -> Result<Vec<Vec<T>>> {
    if workers == 0 {
        return Err(BenchError::Configuration("number of workers must be at least 1".to_string()));
    }

    let base = items.len() / workers;
    let remainder = items.len() % workers;
    debug!(
        "Partitioning {} items over {} workers: base {}, remainder {}",
        items.len(),
        workers,
        base,
        remainder
    );

    let mut batches: Vec<Vec<T>> = (0..workers)
        .map(|i| items[i * base..(i + 1) * base].to_vec())
        .collect();

    let tail = &items[workers * base..];
    for (batch, item) in batches.iter_mut().zip(tail) {
        batch.push(item.clone());
    }

    Ok(batches)
}
