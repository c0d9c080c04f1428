//! The offline worker pool (`spec.md` §5: "the offline mining stages
//! (C4-C7) run one thread per operator, bounded by a fixed-size pool").
//!
//! Online graph generation (C9) is deliberately single-threaded per
//! generator and does not go through this module (`spec.md` §5, one SMT
//! context per generator).

use rayon::{ThreadPool, ThreadPoolBuildError};

use crate::config::Config;
use crate::error::AutoinfError;

/// Build a fixed-size thread pool sized from `config.parallel`, falling
/// back to the host's logical CPU count when `parallel == 0`.
pub fn build_pool(config: &Config) -> Result<ThreadPool, ThreadPoolBuildError> {
    let threads = if config.parallel == 0 {
        num_cpus::get()
    } else {
        config.parallel
    };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
}

/// Totals from one [`run_all`] pass, logged by the caller once the pool
/// drains (`spec.md` §7: "`<op-name> <op-id> {complete|error}`").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Number of items whose job returned `Ok(())`.
    pub completed: usize,
    /// Number of items whose job returned `Err`.
    pub failed: usize,
}

/// Run `job` over every item in `pool`, logging one `<op-name> <op-id>
/// {complete|error}` line per item as it finishes (`spec.md` §7). `job`
/// returns the label used for that line alongside the per-operator
/// result; errors are caught here rather than propagated, matching the
/// "no error escapes the worker" boundary (`spec.md` §7).
pub fn run_all<T, F>(pool: &ThreadPool, items: &[T], job: F) -> Summary
where
    T: Sync,
    F: Fn(&T) -> (String, Result<(), AutoinfError>) + Sync,
{
    pool.install(|| {
        use rayon::prelude::*;
        items
            .par_iter()
            .map(|item| {
                let (label, result) = job(item);
                match &result {
                    Ok(()) => tracing::info!(%label, "complete"),
                    Err(err) => tracing::warn!(%label, %err, "error"),
                }
                result
            })
            .fold(Summary::default, |mut acc, result| {
                match result {
                    Ok(()) => acc.completed += 1,
                    Err(_) => acc.failed += 1,
                }
                acc
            })
            .reduce(Summary::default, |a, b| Summary {
                completed: a.completed + b.completed,
                failed: a.failed + b.failed,
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_defaults_to_configured_parallel() {
        let config = Config {
            parallel: 3,
            ..Config::default()
        };
        let pool = build_pool(&config).unwrap();
        assert_eq!(pool.current_num_threads(), 3);
    }

    #[test]
    fn run_all_counts_successes_and_failures() {
        let config = Config {
            parallel: 2,
            ..Config::default()
        };
        let pool = build_pool(&config).unwrap();
        let items = vec![1, 2, 3, 4];
        let summary = run_all(&pool, &items, |n| {
            let label = format!("op{n}");
            if *n % 2 == 0 {
                (label, Err(AutoinfError::BudgetExceeded("test".into())))
            } else {
                (label, Ok(()))
            }
        });
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 2);
    }
}
