use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use querygate_core::QueryError;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemaphoreStats {
    pub max_concurrent: usize,
    pub current: usize,
    pub total_acquired: u64,
    /// Acquisitions that had to queue before getting a slot.
    pub total_waited: u64,
    pub total_timeouts: u64,
    pub utilization: f64,
}

/// A slot granted by [`AdmissionSemaphore::acquire`]. The slot frees when the
/// permit is released or dropped.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    acquired_at: Instant,
}

impl AdmissionPermit {
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

/// Caps how many expensive calls run at once.
///
/// Waiters are served first come, first served. A wait that times out leaves
/// nothing behind: the caller is simply removed from the queue.
pub struct AdmissionSemaphore {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    total_acquired: AtomicU64,
    total_waited: AtomicU64,
    total_timeouts: AtomicU64,
}

impl AdmissionSemaphore {
    pub fn new(max_concurrent: usize) -> Result<Self, QueryError> {
        if max_concurrent == 0 {
            return Err(QueryError::Configuration(
                "max_concurrent must be greater than zero".to_string(),
            ));
        }
        if max_concurrent > Semaphore::MAX_PERMITS {
            return Err(QueryError::Configuration(format!(
                "max_concurrent must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            total_acquired: AtomicU64::new(0),
            total_waited: AtomicU64::new(0),
            total_timeouts: AtomicU64::new(0),
        })
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Wait for a free slot, giving up after `timeout` if one is set.
    pub async fn acquire(&self, timeout: Option<Duration>) -> Result<AdmissionPermit, QueryError> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => return Ok(self.granted(permit)),
            Err(TryAcquireError::Closed) => {
                return Err(QueryError::Internal(
                    "admission semaphore closed".to_string(),
                ))
            }
            Err(TryAcquireError::NoPermits) => {}
        }

        let started = Instant::now();
        tracing::debug!(
            max_concurrent = self.max_concurrent,
            ?timeout,
            "waiting for admission slot"
        );
        let acquire = Arc::clone(&self.semaphore).acquire_owned();
        let acquired = match timeout {
            Some(limit) => match tokio::time::timeout(limit, acquire).await {
                Ok(acquired) => acquired,
                Err(_) => {
                    self.total_timeouts.fetch_add(1, Ordering::Relaxed);
                    let waited_ms = started.elapsed().as_millis() as u64;
                    tracing::warn!(waited_ms, "admission wait timed out");
                    return Err(QueryError::AdmissionTimeout { waited_ms });
                }
            },
            None => acquire.await,
        };
        let permit = acquired
            .map_err(|e| QueryError::Internal(format!("admission semaphore closed: {e}")))?;

        self.total_waited.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(waited = ?started.elapsed(), "admission slot granted after wait");
        Ok(self.granted(permit))
    }

    /// Return a slot. Consuming the permit makes a second release impossible.
    pub fn release(&self, permit: AdmissionPermit) {
        tracing::trace!(held_for = ?permit.held_for(), "admission slot released");
        drop(permit);
    }

    /// Slots currently handed out.
    pub fn current(&self) -> usize {
        self.max_concurrent
            .saturating_sub(self.semaphore.available_permits())
    }

    pub fn stats(&self) -> SemaphoreStats {
        let current = self.current();
        SemaphoreStats {
            max_concurrent: self.max_concurrent,
            current,
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_waited: self.total_waited.load(Ordering::Relaxed),
            total_timeouts: self.total_timeouts.load(Ordering::Relaxed),
            utilization: current as f64 / self.max_concurrent as f64,
        }
    }

    fn granted(&self, permit: OwnedSemaphorePermit) -> AdmissionPermit {
        self.total_acquired.fetch_add(1, Ordering::Relaxed);
        AdmissionPermit {
            _permit: permit,
            acquired_at: Instant::now(),
        }
    }
}
