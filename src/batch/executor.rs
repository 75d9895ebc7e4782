//! Windowed batch executor.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use futures_util::future::join_all;

use crate::config::BatchConfig;
use crate::observability::metrics;

/// Settled results of a batch, one entry per distinct input.
#[derive(Debug)]
pub struct BatchOutcome<K, V, E> {
    order: Vec<K>,
    results: HashMap<K, Result<V, E>>,
}

impl<K, V, E> BatchOutcome<K, V, E>
where
    K: Eq + Hash,
{
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<&Result<V, E>> {
        self.results.get(key)
    }

    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.values().filter(|r| r.is_err()).count()
    }

    /// Results in input order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &Result<V, E>)> {
        self.order
            .iter()
            .filter_map(move |k| self.results.get(k).map(|r| (k, r)))
    }

    pub fn into_results(self) -> HashMap<K, Result<V, E>> {
        self.results
    }
}

/// Runs many operations under a concurrency ceiling with pacing between windows.
#[derive(Debug, Clone, Copy)]
pub struct BatchExecutor {
    concurrency: usize,
    pacing: Duration,
}

impl BatchExecutor {
    /// `concurrency` below 1 is raised to 1.
    pub fn new(concurrency: usize, pacing: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            pacing,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.concurrency, Duration::from_millis(config.pacing_ms))
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Sizes of the windows a batch of `total` items is split into.
    pub fn window_sizes(&self, total: usize) -> Vec<usize> {
        (0..total)
            .step_by(self.concurrency)
            .map(|start| (total - start).min(self.concurrency))
            .collect()
    }

    /// Run `op` for every distinct item, settling all of them.
    pub async fn run<K, V, E, F, Fut>(
        &self,
        items: impl IntoIterator<Item = K>,
        op: F,
    ) -> BatchOutcome<K, V, E>
    where
        K: Eq + Hash + Clone,
        F: Fn(K) -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let mut seen = HashSet::new();
        let order: Vec<K> = items
            .into_iter()
            .filter(|item| seen.insert(item.clone()))
            .collect();

        let mut results = HashMap::with_capacity(order.len());
        let windows = order.len().div_ceil(self.concurrency);

        for (index, window) in order.chunks(self.concurrency).enumerate() {
            if index > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            tracing::debug!(window = index + 1, windows, size = window.len(), "Running batch window");

            let settled = join_all(window.iter().cloned().map(|item| {
                let fut = op(item.clone());
                async move { (item, fut.await) }
            }))
            .await;

            for (item, result) in settled {
                metrics::record_batch_item(if result.is_ok() { "success" } else { "failure" });
                results.insert(item, result);
            }
        }

        BatchOutcome { order, results }
    }
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn test_window_sizes() {
        let executor = BatchExecutor::new(5, Duration::ZERO);
        assert_eq!(executor.window_sizes(12), vec![5, 5, 2]);
        assert_eq!(executor.window_sizes(5), vec![5]);
        assert!(executor.window_sizes(0).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failures_are_collected() {
        let executor = BatchExecutor::new(5, Duration::from_millis(500));
        let items: Vec<u32> = (1..=12).collect();

        let outcome = executor
            .run(items, |n| async move {
                if n == 7 {
                    Err(format!("item {} failed", n))
                } else {
                    Ok(n * 10)
                }
            })
            .await;

        assert_eq!(outcome.len(), 12);
        assert_eq!(outcome.succeeded(), 11);
        assert_eq!(outcome.failed(), 1);
        assert!(outcome.get(&7).unwrap().is_err());
        assert_eq!(outcome.get(&3).unwrap().as_ref().unwrap(), &30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_ceiling_and_pacing() {
        let executor = BatchExecutor::new(5, Duration::from_millis(500));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        let outcome = executor
            .run(0..12u32, |_| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, ()>(())
                }
            })
            .await;

        assert_eq!(outcome.len(), 12);
        assert_eq!(peak.load(Ordering::SeqCst), 5);
        // Three windows of 100ms work, two pacing gaps of 500ms.
        assert_eq!(start.elapsed(), Duration::from_millis(1300));
    }

    #[tokio::test]
    async fn test_duplicates_collapse_and_order_is_kept() {
        let executor = BatchExecutor::new(2, Duration::ZERO);
        let outcome = executor
            .run(vec!["b", "a", "b", "c"], |s| async move { Ok::<_, ()>(s.len()) })
            .await;

        assert_eq!(outcome.len(), 3);
        let keys: Vec<&str> = outcome.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }
}
