use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use querygate_core::QueryError;
use serde::{Deserialize, Serialize};

use crate::normalize::CacheKey;

/// Handle every caller of one computation awaits.
pub type PendingResult<V> = Shared<BoxFuture<'static, Result<V, QueryError>>>;

type Registry<V> = Arc<Mutex<HashMap<CacheKey, PendingResult<V>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightRole {
    /// Registered the computation.
    Leader,
    /// Attached to a computation someone else registered.
    Follower,
}

/// Outcome of [`RequestCoalescer::begin`].
pub enum Flight<V> {
    /// The lookup produced a value; nothing was registered.
    Ready(V),
    Pending {
        role: FlightRole,
        result: PendingResult<V>,
    },
}

impl<V: Clone> Flight<V> {
    pub fn role(&self) -> Option<FlightRole> {
        match self {
            Flight::Ready(_) => None,
            Flight::Pending { role, .. } => Some(*role),
        }
    }

    pub async fn wait(self) -> Result<V, QueryError> {
        match self {
            Flight::Ready(value) => Ok(value),
            Flight::Pending { result, .. } => result.await,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoalescerStats {
    pub in_flight: usize,
    pub coalesced: u64,
    pub executed: u64,
}

/// Collapses concurrent computations for the same key into one.
///
/// The first caller for a key registers a computation and runs it on its own
/// tokio task; later callers for that key attach to the shared result until
/// it completes. Completion removes the registry entry before any waiter
/// sees the result, so a caller arriving afterwards starts fresh instead of
/// replaying a finished (or failed) computation.
///
/// Dropping a waiter, the leader included, never cancels the computation:
/// it runs to completion and its success hook still fires.
pub struct RequestCoalescer<V> {
    in_flight: Registry<V>,
    coalesced: AtomicU64,
    executed: Arc<AtomicU64>,
}

impl<V> RequestCoalescer<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            coalesced: AtomicU64::new(0),
            executed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run `compute` for `key`, or wait for the run already in progress.
    pub async fn run<F, Fut>(&self, key: CacheKey, compute: F) -> Result<V, QueryError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, QueryError>> + Send + 'static,
    {
        self.begin(key, || None, compute, |_| {}).wait().await
    }

    /// Atomically consult `lookup`, attach to an in-flight computation, or
    /// register a new one.
    ///
    /// All three steps happen under the registry lock. `on_success` runs under
    /// the same lock right before the registry entry is removed, which is
    /// where cache fills belong: no caller can observe the gap between "no
    /// longer in flight" and "cached".
    ///
    /// Lock order is registry first, then whatever `lookup` and `on_success`
    /// take.
    pub fn begin<L, F, Fut, S>(&self, key: CacheKey, lookup: L, compute: F, on_success: S) -> Flight<V>
    where
        L: FnOnce() -> Option<V>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, QueryError>> + Send + 'static,
        S: FnOnce(&V) + Send + 'static,
    {
        let mut registry = lock(&self.in_flight);

        if let Some(value) = lookup() {
            return Flight::Ready(value);
        }

        if let Some(pending) = registry.get(&key) {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "attached to in-flight computation");
            return Flight::Pending {
                role: FlightRole::Follower,
                result: pending.clone(),
            };
        }

        let computation = compute();
        let guard = InFlightGuard {
            registry: Arc::clone(&self.in_flight),
            executed: Arc::clone(&self.executed),
            key: Some(key.clone()),
        };
        let task = tokio::spawn(async move {
            let outcome = computation.await;
            guard.complete(|| {
                if let Ok(value) = &outcome {
                    on_success(value);
                }
            });
            outcome
        });

        let result = task
            .map(|joined| match joined {
                Ok(outcome) => outcome,
                Err(e) => Err(QueryError::Internal(format!("computation task failed: {e}"))),
            })
            .boxed()
            .shared();
        registry.insert(key.clone(), result.clone());
        tracing::debug!(key = %key, in_flight = registry.len(), "registered computation");

        Flight::Pending {
            role: FlightRole::Leader,
            result,
        }
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        lock(&self.in_flight).contains_key(key)
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    pub fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            in_flight: self.in_flight(),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
        }
    }
}

impl<V> Default for RequestCoalescer<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn lock<V>(registry: &Registry<V>) -> MutexGuard<'_, HashMap<CacheKey, PendingResult<V>>> {
    registry.lock().expect("in-flight registry lock poisoned")
}

/// Removes the registry entry and counts the execution when the computation
/// finishes, including when it panics or its task is torn down.
struct InFlightGuard<V> {
    registry: Registry<V>,
    executed: Arc<AtomicU64>,
    key: Option<CacheKey>,
}

impl<V> InFlightGuard<V> {
    fn complete(mut self, fill: impl FnOnce()) {
        let mut registry = lock(&self.registry);
        fill();
        if let Some(key) = self.key.take() {
            registry.remove(&key);
            self.executed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl<V> Drop for InFlightGuard<V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
            self.executed.fetch_add(1, Ordering::Relaxed);
        }
    }
}
