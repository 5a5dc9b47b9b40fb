//! Querygate: caching, request coalescing and admission control in front of
//! expensive query pipelines.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `default` | `cache` |
//! | `cache` | `QueryGate`, normalizer, bounded cache, coalescer, admission semaphore |
//! | `pipelines` | `ScriptedPipeline`, `FnPipeline`, `RetryPipeline` |
//! | `full` | All features enabled |
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use querygate::cache::{QueryGate, QueryGateConfig};
//! use querygate::core::{QueryOptions, SessionContext};
//! ```

/// Core traits and types: QueryPipeline, QueryError, SessionContext, QueryOptions.
/// Always available.
pub use querygate_core as core;

/// Query normalization, result cache, request coalescing and admission control.
#[cfg(feature = "cache")]
pub use querygate_cache as cache;

/// Pipeline helpers for tests and composition (scripted, closure, retry).
#[cfg(feature = "pipelines")]
pub use querygate_pipelines as pipelines;
