use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use querygate_core::{
    QueryError, QueryOptions, QueryPipeline, QueryResponse, QueryStream, SessionContext,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::admission::{AdmissionSemaphore, SemaphoreStats};
use crate::coalescer::{CoalescerStats, FlightRole, RequestCoalescer};
use crate::config::QueryGateConfig;
use crate::normalize::{CacheKey, QueryNormalizer};
use crate::store::{BoundedCache, CacheStats};

/// Snapshot of every component's counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateStats {
    pub cache: CacheStats,
    pub coalescer: CoalescerStats,
    pub semaphore: SemaphoreStats,
}

/// Caching, coalescing and admission-controlled front for a [`QueryPipeline`].
///
/// A query is normalized into a [`CacheKey`]. A live cache entry answers
/// immediately. Otherwise the query joins the computation already running for
/// that key, or starts one; a started computation waits for an admission slot,
/// runs the pipeline with the caller's raw text and, on success, fills the
/// cache before anyone else can look the key up again.
///
/// ```ignore
/// let gate = QueryGate::new(Arc::new(pipeline), QueryGateConfig::default())?;
/// let answer = gate
///     .query("서울 센터 재고 보여줘", &SessionContext::default(), &QueryOptions::default())
///     .await?;
/// ```
pub struct QueryGate {
    pipeline: Arc<dyn QueryPipeline>,
    normalizer: QueryNormalizer,
    cache: Arc<BoundedCache<Value>>,
    coalescer: RequestCoalescer<Value>,
    admission: Arc<AdmissionSemaphore>,
    config: QueryGateConfig,
}

impl QueryGate {
    pub fn new(pipeline: Arc<dyn QueryPipeline>, config: QueryGateConfig) -> Result<Self, QueryError> {
        config.validate()?;
        let normalizer = QueryNormalizer::new(config.normalizer.clone())?;
        let cache = BoundedCache::new(config.max_size, config.default_ttl, config.schema_ttl)?;
        let admission = AdmissionSemaphore::new(config.max_concurrent)?;
        tracing::info!(
            max_size = config.max_size,
            default_ttl = ?config.default_ttl,
            max_concurrent = config.max_concurrent,
            cache_enabled = config.cache_enabled,
            coalescing_enabled = config.coalescing_enabled,
            "query gate initialized"
        );
        Ok(Self {
            pipeline,
            normalizer,
            cache: Arc::new(cache),
            coalescer: RequestCoalescer::new(),
            admission: Arc::new(admission),
            config,
        })
    }

    pub fn with_defaults(pipeline: Arc<dyn QueryPipeline>) -> Result<Self, QueryError> {
        Self::new(pipeline, QueryGateConfig::default())
    }

    pub fn config(&self) -> &QueryGateConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &QueryNormalizer {
        &self.normalizer
    }

    pub fn cache(&self) -> &BoundedCache<Value> {
        &self.cache
    }

    pub fn coalescer(&self) -> &RequestCoalescer<Value> {
        &self.coalescer
    }

    pub fn admission(&self) -> &AdmissionSemaphore {
        &self.admission
    }

    pub fn key_for(&self, raw_input: &str) -> CacheKey {
        self.normalizer.key(raw_input)
    }

    pub async fn query(
        &self,
        raw_input: &str,
        session: &SessionContext,
        options: &QueryOptions,
    ) -> Result<QueryResponse, QueryError> {
        let use_cache = options.use_cache && self.config.cache_enabled;
        let key = self.key_for(raw_input);
        let execution = self.execution(raw_input, session, options);

        if !self.config.coalescing_enabled {
            if use_cache {
                if let Some(output) = self.cache.get(&key) {
                    return Ok(respond(output, key, true, false));
                }
            }
            let output = execution.await?;
            if use_cache {
                self.cache.set_default(key.clone(), output.clone())?;
            }
            return Ok(respond(output, key, false, false));
        }

        let cache = Arc::clone(&self.cache);
        let fill_key = key.clone();
        let flight = self.coalescer.begin(
            key.clone(),
            || if use_cache { self.cache.get(&key) } else { None },
            move || execution,
            move |output: &Value| {
                if !use_cache {
                    return;
                }
                if let Err(e) = cache.set_default(fill_key.clone(), output.clone()) {
                    tracing::warn!(key = %fill_key, error = %e, "failed to cache query result");
                }
            },
        );

        match flight.role() {
            None => {
                let output = flight.wait().await?;
                Ok(respond(output, key, true, false))
            }
            Some(role) => {
                let coalesced = role == FlightRole::Follower;
                if coalesced {
                    self.cache.record_coalesced();
                }
                let output = flight.wait().await?;
                Ok(respond(output, key, false, coalesced))
            }
        }
    }

    /// Stream the pipeline's output for `raw_input`.
    ///
    /// Streams never read or fill the cache and are never shared between
    /// callers. The admission slot is held until the stream ends or is dropped.
    pub fn stream(&self, raw_input: &str, session: SessionContext) -> QueryStream<'static> {
        let pipeline = Arc::clone(&self.pipeline);
        let admission = Arc::clone(&self.admission);
        let timeout = self.config.admission_timeout;
        let query = raw_input.to_string();
        Box::pin(async_stream::stream! {
            let permit = match admission.acquire(timeout).await {
                Ok(permit) => permit,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            tracing::debug!(session_id = %session.session_id, "streaming query admitted");
            let mut events = pipeline.stream(query, session);
            while let Some(event) = events.next().await {
                yield event;
            }
            admission.release(permit);
        })
    }

    /// Drop every cached result. Computations in flight keep running.
    pub fn clear(&self) -> usize {
        let removed = self.cache.clear();
        tracing::info!(removed, "query cache cleared");
        removed
    }

    /// Drop the entry `raw_input` normalizes to. Returns whether one existed.
    pub fn invalidate(&self, raw_input: &str) -> bool {
        let key = self.key_for(raw_input);
        let removed = self.cache.remove(&key);
        tracing::info!(key = %key, removed, "query cache entry invalidated");
        removed
    }

    pub fn cleanup_expired(&self) -> usize {
        let removed = self.cache.cleanup_expired();
        if removed > 0 {
            tracing::debug!(removed, "expired cache entries swept");
        }
        removed
    }

    pub fn schema(&self) -> Option<String> {
        self.cache
            .get_schema()
            .and_then(|value| value.as_str().map(str::to_string))
    }

    pub fn set_schema(&self, schema: impl Into<String>) -> Result<(), QueryError> {
        self.cache.set_schema(Value::String(schema.into()))
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            cache: self.cache.stats(),
            coalescer: self.coalescer.stats(),
            semaphore: self.admission.stats(),
        }
    }

    pub fn stats_json(&self) -> Value {
        serde_json::to_value(self.stats()).unwrap_or_default()
    }

    /// The admitted pipeline call, detached from `self` so it can outlive the
    /// caller that started it.
    fn execution(
        &self,
        raw_input: &str,
        session: &SessionContext,
        options: &QueryOptions,
    ) -> impl std::future::Future<Output = Result<Value, QueryError>> + Send + 'static {
        let pipeline = Arc::clone(&self.pipeline);
        let admission = Arc::clone(&self.admission);
        let timeout = options.admission_timeout.or(self.config.admission_timeout);
        let query = raw_input.to_string();
        let session = session.clone();
        async move {
            let permit = admission.acquire(timeout).await?;
            let started = Instant::now();
            let result = pipeline.execute(&query, &session).await;
            admission.release(permit);
            let elapsed = started.elapsed();
            match &result {
                Ok(_) => tracing::debug!(
                    session_id = %session.session_id,
                    ?elapsed,
                    "pipeline call completed"
                ),
                Err(e) => tracing::warn!(
                    session_id = %session.session_id,
                    ?elapsed,
                    error = %e,
                    "pipeline call failed"
                ),
            }
            result
        }
    }
}

fn respond(output: Value, key: CacheKey, from_cache: bool, coalesced: bool) -> QueryResponse {
    QueryResponse {
        output,
        key: key.into_string(),
        from_cache,
        coalesced,
    }
}
