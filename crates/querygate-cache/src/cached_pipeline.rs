use std::sync::Arc;

use async_trait::async_trait;
use querygate_core::{QueryError, QueryOptions, QueryPipeline, QueryStream, SessionContext};
use serde_json::Value;

use crate::gate::QueryGate;

/// A [`QueryPipeline`] whose calls go through a [`QueryGate`].
///
/// Lets code written against the plain trait pick up caching, coalescing and
/// admission control without changing call sites.
pub struct CachedPipeline {
    gate: Arc<QueryGate>,
    options: QueryOptions,
}

impl CachedPipeline {
    pub fn new(gate: Arc<QueryGate>) -> Self {
        Self {
            gate,
            options: QueryOptions::default(),
        }
    }

    /// Options applied to every call made through this pipeline.
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn gate(&self) -> &Arc<QueryGate> {
        &self.gate
    }
}

#[async_trait]
impl QueryPipeline for CachedPipeline {
    async fn execute(&self, query: &str, session: &SessionContext) -> Result<Value, QueryError> {
        let response = self.gate.query(query, session, &self.options).await?;
        Ok(response.output)
    }

    fn stream(&self, query: String, session: SessionContext) -> QueryStream<'_> {
        self.gate.stream(&query, session)
    }
}
