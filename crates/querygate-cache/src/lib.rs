//! Caching, request coalescing and admission control in front of an
//! expensive [`QueryPipeline`](querygate_core::QueryPipeline).
//!
//! [`QueryGate`] ties the pieces together; each piece is also usable alone:
//!
//! - [`QueryNormalizer`] maps near-duplicate phrasings to one [`CacheKey`].
//! - [`BoundedCache`] is an LRU store with per-entry TTL.
//! - [`RequestCoalescer`] runs one computation per key at a time.
//! - [`AdmissionSemaphore`] bounds concurrent pipeline calls.

mod admission;
mod cached_pipeline;
mod coalescer;
mod config;
mod gate;
mod global;
mod normalize;
mod store;

pub use admission::{AdmissionPermit, AdmissionSemaphore, SemaphoreStats};
pub use cached_pipeline::CachedPipeline;
pub use coalescer::{CoalescerStats, Flight, FlightRole, PendingResult, RequestCoalescer};
pub use config::{
    QueryGateConfig, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_SIZE, DEFAULT_SCHEMA_TTL, DEFAULT_TTL,
};
pub use gate::{GateStats, QueryGate};
pub use global::{global, init_global};
pub use normalize::{normalize, CacheKey, NormalizerConfig, QueryNormalizer, DIGIT_PLACEHOLDER};
pub use store::{BoundedCache, CacheEntry, CacheStats};
