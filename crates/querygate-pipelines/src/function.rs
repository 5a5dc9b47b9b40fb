use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use querygate_core::{QueryError, QueryPipeline, SessionContext};
use serde_json::Value;

type AsyncQueryFn = dyn Fn(String, SessionContext) -> Pin<Box<dyn Future<Output = Result<Value, QueryError>> + Send>>
    + Send
    + Sync;

/// Wraps an async closure as a `QueryPipeline`.
///
/// ```ignore
/// let pipeline = FnPipeline::new(|query, _session| async move {
///     Ok(serde_json::json!({ "answer": query.to_uppercase() }))
/// });
/// ```
pub struct FnPipeline {
    func: Box<AsyncQueryFn>,
}

impl FnPipeline {
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(String, SessionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, QueryError>> + Send + 'static,
    {
        Self {
            func: Box::new(move |query, session| Box::pin(func(query, session))),
        }
    }
}

#[async_trait]
impl QueryPipeline for FnPipeline {
    async fn execute(&self, query: &str, session: &SessionContext) -> Result<Value, QueryError> {
        (self.func)(query.to_string(), session.clone()).await
    }
}
