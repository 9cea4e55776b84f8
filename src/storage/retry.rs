//! Bounded retry around a store for busy/locked databases

use super::traits::{GraphStore, NodeFilter, StorageError, StorageResult};
use crate::graph::{Endpoint, Label, Node, Relationship};
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before retry number `retry` (0-based): base, 2x base, 4x base...
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        self.base_delay * (1u32 << retry.min(10))
    }
}

/// Wraps any [`GraphStore`] and retries transient failures.
///
/// Only errors where [`StorageError::is_transient`] holds are retried;
/// everything else is returned on the first attempt.
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: GraphStore> RetryingStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn run<T>(&self, op: &str, f: impl Fn(&S) -> StorageResult<T>) -> StorageResult<T> {
        let mut attempt = 0;
        loop {
            match f(&self.inner) {
                Err(e) if e.is_transient() => {
                    attempt += 1;
                    if attempt >= self.policy.max_attempts {
                        return Err(StorageError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }
                    let delay = self.policy.backoff_delay(attempt - 1);
                    warn!(op, attempt, ?delay, error = %e, "store busy, retrying");
                    backoff(delay);
                }
                other => return other,
            }
        }
    }
}

/// Wait out a backoff delay.
///
/// Store calls are synchronous but reached from async handlers. On a
/// multi-threaded runtime the worker hands its other tasks to a fresh thread
/// for the duration of the sleep, so they keep running.
fn backoff(delay: Duration) {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| std::thread::sleep(delay))
        }
        _ => std::thread::sleep(delay),
    }
}

impl<S: GraphStore> GraphStore for RetryingStore<S> {
    fn ensure_label_schema(&self, label: Label) -> StorageResult<()> {
        self.run("ensure_label_schema", |s| s.ensure_label_schema(label))
    }

    fn upsert_node(&self, node: &Node) -> StorageResult<()> {
        self.run("upsert_node", |s| s.upsert_node(node))
    }

    fn get_node(&self, label: Label, key: &str) -> StorageResult<Option<Node>> {
        self.run("get_node", |s| s.get_node(label, key))
    }

    fn find_nodes(&self, filter: &NodeFilter) -> StorageResult<Vec<Node>> {
        self.run("find_nodes", |s| s.find_nodes(filter))
    }

    fn count_nodes(&self, label: Option<Label>) -> StorageResult<usize> {
        self.run("count_nodes", |s| s.count_nodes(label))
    }

    fn delete_labels(&self, labels: &[Label]) -> StorageResult<usize> {
        self.run("delete_labels", |s| s.delete_labels(labels))
    }

    fn delete_node(&self, label: Label, key: &str) -> StorageResult<bool> {
        self.run("delete_node", |s| s.delete_node(label, key))
    }

    fn upsert_relationship(&self, relationship: &Relationship) -> StorageResult<()> {
        self.run("upsert_relationship", |s| s.upsert_relationship(relationship))
    }

    fn relationships_from(&self, endpoint: &Endpoint) -> StorageResult<Vec<Relationship>> {
        self.run("relationships_from", |s| s.relationships_from(endpoint))
    }

    fn relationships_to(&self, endpoint: &Endpoint) -> StorageResult<Vec<Relationship>> {
        self.run("relationships_to", |s| s.relationships_to(endpoint))
    }

    fn count_relationships(&self) -> StorageResult<usize> {
        self.run("count_relationships", |s| s.count_relationships())
    }

    fn clear(&self) -> StorageResult<()> {
        self.run("clear", |s| s.clear())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{OpenStore, SqliteStore};
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Fails `count_nodes` with SQLITE_BUSY a fixed number of times.
    struct FlakyStore {
        inner: SqliteStore,
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: SqliteStore::open_in_memory().unwrap(),
                failures_left: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }

        fn busy() -> StorageError {
            StorageError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
                None,
            ))
        }
    }

    impl GraphStore for FlakyStore {
        fn ensure_label_schema(&self, label: Label) -> StorageResult<()> {
            self.inner.ensure_label_schema(label)
        }
        fn upsert_node(&self, node: &Node) -> StorageResult<()> {
            self.inner.upsert_node(node)
        }
        fn get_node(&self, label: Label, key: &str) -> StorageResult<Option<Node>> {
            self.inner.get_node(label, key)
        }
        fn find_nodes(&self, filter: &NodeFilter) -> StorageResult<Vec<Node>> {
            self.inner.find_nodes(filter)
        }
        fn count_nodes(&self, label: Option<Label>) -> StorageResult<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(Self::busy());
            }
            self.inner.count_nodes(label)
        }
        fn delete_labels(&self, labels: &[Label]) -> StorageResult<usize> {
            self.inner.delete_labels(labels)
        }
        fn delete_node(&self, label: Label, key: &str) -> StorageResult<bool> {
            self.inner.delete_node(label, key)
        }
        fn upsert_relationship(&self, relationship: &Relationship) -> StorageResult<()> {
            self.inner.upsert_relationship(relationship)
        }
        fn relationships_from(&self, endpoint: &Endpoint) -> StorageResult<Vec<Relationship>> {
            self.inner.relationships_from(endpoint)
        }
        fn relationships_to(&self, endpoint: &Endpoint) -> StorageResult<Vec<Relationship>> {
            self.inner.relationships_to(endpoint)
        }
        fn count_relationships(&self) -> StorageResult<usize> {
            self.inner.count_relationships()
        }
        fn clear(&self) -> StorageResult<()> {
            self.inner.clear()
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_transient_failure_is_retried() {
        let store = RetryingStore::new(FlakyStore::new(2), fast_policy());
        assert_eq!(store.count_nodes(None).unwrap(), 0);
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let store = RetryingStore::new(FlakyStore::new(5), fast_policy());
        let err = store.count_nodes(None).unwrap_err();
        assert!(matches!(err, StorageError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_permanent_failure_is_not_retried() {
        let store = RetryingStore::new(FlakyStore::new(0), fast_policy());
        let rel = Relationship::new(
            crate::graph::RelType::Uses,
            Endpoint::new(Label::ThreatGroup, "intrusion-set--missing"),
            Endpoint::new(Label::Technique, "attack-pattern--missing"),
        );
        let err = store.upsert_relationship(&rel).unwrap_err();
        assert!(matches!(err, StorageError::MissingEndpoint(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_backoff_does_not_stall_other_tasks() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicBool::new(false));
        let ticker = {
            let (ticks, done) = (ticks.clone(), done.clone());
            tokio::spawn(async move {
                while !done.load(Ordering::SeqCst) {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        };
        tokio::task::yield_now().await;

        let store = Arc::new(RetryingStore::new(
            FlakyStore::new(2),
            RetryPolicy::new(3, Duration::from_millis(100)),
        ));
        let before = ticks.load(Ordering::SeqCst);
        let count = tokio::spawn({
            let store = store.clone();
            async move { store.count_nodes(None) }
        })
        .await
        .unwrap()
        .unwrap();
        let during = ticks.load(Ordering::SeqCst) - before;

        done.store(true, Ordering::SeqCst);
        ticker.await.unwrap();
        assert_eq!(count, 0);
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
        // 300ms of backoff at a 5ms tick
        assert!(during >= 10, "ticker advanced only {during} times during backoff");
    }
}
