//! Single-flight request deduplication
//!
//! Concurrent callers asking for the same key share one underlying execution.
//! The execution runs as its own tokio task, so it completes (and releases its
//! map entry) even if every caller stops waiting.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, error};

type InFlight<V> = Shared<BoxFuture<'static, Option<Arc<V>>>>;

/// Deduplicates concurrent executions by key
pub struct SingleFlight<K, V>
where
    K: Eq + Hash,
{
    inflight: Arc<DashMap<K, InFlight<V>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// Number of executions currently running
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Run `make()` for `key`, or join the execution already running for it.
    ///
    /// Returns `None` only if the execution task panicked or was aborted.
    pub async fn run<F, Fut>(&self, key: K, make: F) -> Option<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let shared = match self.inflight.entry(key.clone()) {
            Entry::Occupied(existing) => {
                debug!(key = ?key, "Joining in-flight execution");
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                let future = make();
                let guard = RemoveOnDrop {
                    map: Arc::clone(&self.inflight),
                    key: key.clone(),
                };

                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    Arc::new(future.await)
                });

                let shared = async move {
                    match handle.await {
                        Ok(value) => Some(value),
                        Err(e) => {
                            error!(error = %e, "Single-flight execution task failed");
                            None
                        }
                    }
                }
                .boxed()
                .shared();

                slot.insert(shared.clone());
                shared
            }
        };

        shared.await
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Removes the map entry when the execution task finishes, panics or is aborted
struct RemoveOnDrop<K, V>
where
    K: Eq + Hash,
{
    map: Arc<DashMap<K, InFlight<V>>>,
    key: K,
}

impl<K, V> Drop for RemoveOnDrop<K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_calls_share_one_execution() {
        let flight: Arc<SingleFlight<String, usize>> = Arc::new(SingleFlight::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = Arc::clone(&flight);
            let runs = Arc::clone(&runs);
            handles.push(tokio::spawn(async move {
                flight
                    .run("same".to_string(), move || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        42
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().as_deref(), Some(&42));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let flight: SingleFlight<u32, u32> = SingleFlight::new();
        let (a, b) = tokio::join!(
            flight.run(1, || async { 10 }),
            flight.run(2, || async { 20 }),
        );
        assert_eq!(a.as_deref(), Some(&10));
        assert_eq!(b.as_deref(), Some(&20));
    }

    #[tokio::test]
    async fn test_entry_removed_after_panic() {
        let flight: SingleFlight<&'static str, u32> = SingleFlight::new();
        let result = flight
            .run("boom", || async {
                if true {
                    panic!("scraper exploded");
                }
                0
            })
            .await;
        assert!(result.is_none());
        assert_eq!(flight.in_flight(), 0);

        // The key is usable again
        let retry = flight.run("boom", || async { 7 }).await;
        assert_eq!(retry.as_deref(), Some(&7));
    }

    #[tokio::test]
    async fn test_sequential_calls_execute_again() {
        let flight: SingleFlight<&'static str, usize> = SingleFlight::new();
        let runs = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let runs = Arc::clone(&runs);
            flight
                .run("k", move || async move { runs.fetch_add(1, Ordering::SeqCst) })
                .await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
