//! Per-request batching and memoization of point lookups
//!
//! `load` calls issued within one scheduling tick join a single micro-batch.
//! Every caller yields once so sibling futures can enqueue, then the first
//! waiter to find the batch still accepting claims it and dispatches every
//! distinct key to the [`BatchFn`] in one call. A claimed batch never accepts
//! more keys; later calls open a new one.
//!
//! Dropping the dispatching future does not strand its siblings: the batch
//! reopens and the next waiter dispatches it.
//!
//! A loader memoizes every resolved key for its whole lifetime, so it must be
//! created per request and never shared between unrelated requests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::core::{DataError, DataResult};

/// Resolves a batch of distinct keys.
///
/// Must return exactly one value per key, in key order.
#[async_trait]
pub trait BatchFn<K, V>: Send + Sync {
    async fn load(&self, keys: &[K]) -> DataResult<Vec<V>>;
}

/// Lifecycle of one micro-batch
#[derive(Debug)]
enum BatchState<K> {
    Accepting(Vec<K>),
    Dispatched,
}

type Outcome<K, V> = Result<Arc<HashMap<K, V>>, String>;

struct Batch<K, V> {
    state: Mutex<BatchState<K>>,
    outcome: watch::Sender<Option<Outcome<K, V>>>,
}

impl<K, V> Batch<K, V> {
    fn new(first: K) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            state: Mutex::new(BatchState::Accepting(vec![first])),
            outcome,
        }
    }

    /// Add a key; hands it back once the batch has been dispatched
    fn try_push(&self, key: K) -> Result<(), K> {
        match &mut *lock(&self.state) {
            BatchState::Accepting(keys) => {
                keys.push(key);
                Ok(())
            }
            BatchState::Dispatched => Err(key),
        }
    }

    /// Take the keys if nobody has claimed the batch yet
    fn take_keys(&self) -> Option<Vec<K>> {
        match std::mem::replace(&mut *lock(&self.state), BatchState::Dispatched) {
            BatchState::Accepting(keys) => Some(keys),
            BatchState::Dispatched => None,
        }
    }

    /// Put the keys of an abandoned dispatch back and wake the waiters
    fn reopen(&self, keys: Vec<K>) {
        *lock(&self.state) = BatchState::Accepting(keys);
        self.outcome.send_modify(|_| {});
    }
}

/// Reopens the batch unless the dispatch ran to completion
struct ReopenOnDrop<'a, K, V> {
    batch: &'a Batch<K, V>,
    keys: Option<Vec<K>>,
}

impl<K, V> ReopenOnDrop<'_, K, V> {
    fn disarm(mut self) {
        self.keys = None;
    }
}

impl<K, V> Drop for ReopenOnDrop<'_, K, V> {
    fn drop(&mut self) {
        if let Some(keys) = self.keys.take() {
            warn!("Batch dispatch dropped before completing; reopening {} keys", keys.len());
            self.batch.reopen(keys);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Deduplicating, batching, memoizing loader over a [`BatchFn`]
pub struct BatchedLoader<K, V, F> {
    batch_fn: F,
    memo: Mutex<HashMap<K, V>>,
    pending: Mutex<Option<Arc<Batch<K, V>>>>,
    dispatched: AtomicUsize,
}

impl<K, V, F> BatchedLoader<K, V, F>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
    F: BatchFn<K, V>,
{
    pub fn new(batch_fn: F) -> Self {
        Self {
            batch_fn,
            memo: Mutex::new(HashMap::new()),
            pending: Mutex::new(None),
            dispatched: AtomicUsize::new(0),
        }
    }

    /// Resolve one key, coalescing with concurrent calls
    pub async fn load(&self, key: K) -> DataResult<V> {
        if let Some(value) = lock(&self.memo).get(&key) {
            return Ok(value.clone());
        }

        let batch = self.enqueue(key.clone());
        let mut outcome = batch.outcome.subscribe();
        tokio::task::yield_now().await;

        loop {
            // Mark the current version seen before claiming, so a reopen
            // that lands after a failed claim still wakes `changed`
            let settled = outcome.borrow_and_update().clone();
            if let Some(settled) = settled {
                return match settled {
                    Ok(values) => values
                        .get(&key)
                        .cloned()
                        .ok_or_else(|| DataError::Batch("key missing from batch result".into())),
                    Err(reason) => Err(DataError::Batch(reason)),
                };
            }

            if let Some(keys) = self.claim(&batch) {
                self.dispatch(&batch, keys).await;
                continue;
            }

            outcome
                .changed()
                .await
                .map_err(|_| DataError::Batch("batch dropped before dispatch completed".into()))?;
        }
    }

    /// Resolve many keys; output has the same length and order as `keys`
    pub async fn load_many(&self, keys: &[K]) -> DataResult<Vec<V>> {
        futures::future::try_join_all(keys.iter().cloned().map(|key| self.load(key))).await
    }

    /// Number of batches handed to the batch function so far
    pub fn dispatch_count(&self) -> usize {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Already-resolved value, if any
    pub fn cached(&self, key: &K) -> Option<V> {
        lock(&self.memo).get(key).cloned()
    }

    fn enqueue(&self, key: K) -> Arc<Batch<K, V>> {
        let mut pending = lock(&self.pending);
        let key = match pending.as_ref() {
            Some(batch) => match batch.try_push(key) {
                Ok(()) => return batch.clone(),
                Err(key) => key,
            },
            None => key,
        };
        let batch = Arc::new(Batch::new(key));
        *pending = Some(batch.clone());
        batch
    }

    /// Close the batch to new keys and take ownership of its dispatch
    fn claim(&self, batch: &Arc<Batch<K, V>>) -> Option<Vec<K>> {
        let mut pending = lock(&self.pending);
        let keys = batch.take_keys()?;
        if pending.as_ref().is_some_and(|p| Arc::ptr_eq(p, batch)) {
            *pending = None;
        }
        Some(keys)
    }

    async fn dispatch(&self, batch: &Batch<K, V>, keys: Vec<K>) {
        let guard = ReopenOnDrop {
            batch,
            keys: Some(keys.clone()),
        };

        let mut seen = HashSet::new();
        let keys: Vec<K> = keys.into_iter().filter(|k| seen.insert(k.clone())).collect();
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        debug!("Dispatching batch of {} distinct keys", keys.len());

        let outcome = match self.batch_fn.load(&keys).await {
            Ok(values) if values.len() == keys.len() => {
                let resolved: HashMap<K, V> = keys.into_iter().zip(values).collect();
                lock(&self.memo).extend(resolved.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(Arc::new(resolved))
            }
            Ok(values) => Err(format!(
                "batch function returned {} values for {} keys",
                values.len(),
                keys.len()
            )),
            Err(e) => Err(e.to_string()),
        };
        guard.disarm();
        batch.outcome.send_replace(Some(outcome));
    }
}
