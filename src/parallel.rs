//! Parallel processing configuration and management
//!
//! This module configures Rayon's global thread pool and provides the
//! balanced merge tree used to combine many binned results.

use crate::errors::{ObsBinError, Result};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::info;

/// Thread pool settings taken from `--threads`
#[derive(Debug, Clone, Default)]
pub struct ParallelConfig {
    /// Worker threads; `None` leaves the choice to Rayon (one per core)
    pub threads: Option<usize>,
}

impl ParallelConfig {
    #[must_use]
    pub fn new(threads: Option<usize>) -> Self {
        Self { threads }
    }

    /// Threads binning and merging will run on
    #[must_use]
    pub fn resolved_threads(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get)
    }

    /// Build the global Rayon pool used by record lookup and the merge tree.
    ///
    /// # Errors
    ///
    /// Fails for a zero thread count, or when the global pool has already
    /// been built.
    pub fn setup_global_pool(&self) -> Result<()> {
        let Some(threads) = self.threads else {
            info!("using the default thread pool ({} threads)", self.resolved_threads());
            return Ok(());
        };
        if threads == 0 {
            return Err(ObsBinError::ThreadPoolError(
                "thread count must be at least 1".to_string(),
            ));
        }
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("obsbin-{i}"))
            .build_global()
            .map_err(|e| {
                ObsBinError::ThreadPoolError(format!(
                    "Failed to initialize thread pool with {threads} threads: {e}"
                ))
            })?;
        info!("binning with {threads} threads");
        Ok(())
    }
}

/// Combine `items` pairwise in a balanced tree on the Rayon pool.
///
/// `merge` must be associative; operand order is preserved, so it need not
/// be commutative. Returns `None` for an empty input.
///
/// # Errors
///
/// Returns the first error produced by `merge`.
pub fn merge_tree<T, F>(items: Vec<T>, merge: F) -> Result<Option<T>>
where
    T: Send,
    F: Fn(&T, &T) -> Result<T> + Sync + Send,
{
    items
        .into_par_iter()
        .map(Ok::<T, ObsBinError>)
        .try_reduce_with(|left, right| merge(&left, &right))
        .transpose()
}

/// Snapshot of the pool and the machine, logged with `--verbose`
#[must_use]
pub fn get_parallel_info() -> ParallelInfo {
    ParallelInfo {
        current_threads: rayon::current_num_threads(),
        available_cores: num_cpus::get(),
        available_parallelism: std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1),
    }
}

#[derive(Debug, Clone)]
pub struct ParallelInfo {
    pub current_threads: usize,
    pub available_cores: usize,
    pub available_parallelism: usize,
}

impl ParallelInfo {
    pub fn log(&self) {
        info!(
            current_threads = self.current_threads,
            available_cores = self.available_cores,
            available_parallelism = self.available_parallelism,
            "parallel processing environment"
        );
    }
}
