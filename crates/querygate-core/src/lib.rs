use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Session the query arrives in.
///
/// Sessions are passed through to the pipeline untouched. They never take part
/// in cache keys: identical questions from different sessions share one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new("default")
    }
}

/// Per-call switches for [`QueryPipeline`] fronts such as the query gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Read from and write to the result cache. Coalescing and admission
    /// control stay active when this is off.
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
    /// Upper bound on the wait for an admission slot. `None` waits indefinitely
    /// unless the gate is configured with its own default.
    #[serde(default)]
    pub admission_timeout: Option<Duration>,
}

fn default_use_cache() -> bool {
    true
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = Some(timeout);
        self
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            admission_timeout: None,
        }
    }
}

/// Result of a gated query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub output: Value,
    /// Hex cache key the query normalized to.
    pub key: String,
    /// Served straight from the cache without touching the pipeline.
    pub from_cache: bool,
    /// Attached to a computation another caller had already started.
    pub coalesced: bool,
}

/// Incremental output of a streaming query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Token { content: String },
    Done { output: Value },
}

impl StreamEvent {
    pub fn token(content: impl Into<String>) -> Self {
        StreamEvent::Token {
            content: content.into(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StreamEvent::Done { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("admission timeout after {waited_ms}ms")]
    AdmissionTimeout { waited_ms: u64 },
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("rate limit: {0}")]
    RateLimit(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl QueryError {
    /// Whether an identical retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QueryError::AdmissionTimeout { .. } | QueryError::RateLimit(_) | QueryError::Timeout(_)
        )
    }
}

pub type QueryStream<'a> =
    Pin<Box<dyn Stream<Item = Result<StreamEvent, QueryError>> + Send + 'a>>;

/// The expensive operation being fronted: typically an LLM-backed
/// question-answering pipeline that takes seconds per call.
#[async_trait]
pub trait QueryPipeline: Send + Sync {
    async fn execute(&self, query: &str, session: &SessionContext) -> Result<Value, QueryError>;

    fn stream(&self, query: String, session: SessionContext) -> QueryStream<'_> {
        Box::pin(async_stream::stream! {
            match self.execute(&query, &session).await {
                Ok(output) => yield Ok(StreamEvent::Done { output }),
                Err(e) => yield Err(e),
            }
        })
    }
}
