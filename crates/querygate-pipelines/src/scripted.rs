use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use querygate_core::{QueryError, QueryPipeline, QueryStream, SessionContext, StreamEvent};
use serde_json::Value;
use tokio::sync::Mutex;

/// Pipeline that replays a fixed script of results, one per call.
///
/// Once the script runs out every call fails with an upstream error, which
/// makes it easy to assert that a cached or coalesced path never reached
/// the pipeline.
#[derive(Clone)]
pub struct ScriptedPipeline {
    responses: Arc<Mutex<VecDeque<Result<Value, QueryError>>>>,
    received: Arc<Mutex<Vec<String>>>,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
    stream_tokens: bool,
}

impl ScriptedPipeline {
    pub fn new(responses: Vec<Value>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<Value, QueryError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(results))),
            received: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: None,
            stream_tokens: false,
        }
    }

    /// Sleep this long inside every call, simulating a slow upstream.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Stream string results word by word as tokens before the final event.
    pub fn with_streamed_tokens(mut self) -> Self {
        self.stream_tokens = true;
        self
    }

    /// Number of times `execute` was entered.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Queries in the order they reached the pipeline.
    pub async fn received(&self) -> Vec<String> {
        self.received.lock().await.clone()
    }
}

#[async_trait]
impl QueryPipeline for ScriptedPipeline {
    async fn execute(&self, query: &str, _session: &SessionContext) -> Result<Value, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received.lock().await.push(query.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut responses = self.responses.lock().await;
        responses.pop_front().unwrap_or_else(|| {
            Err(QueryError::Upstream(
                "scripted pipeline exhausted responses".to_string(),
            ))
        })
    }

    fn stream(&self, query: String, session: SessionContext) -> QueryStream<'_> {
        Box::pin(async_stream::stream! {
            match self.execute(&query, &session).await {
                Ok(output) => {
                    if self.stream_tokens {
                        if let Some(text) = output.as_str() {
                            for word in text.split_inclusive(' ') {
                                yield Ok(StreamEvent::token(word));
                            }
                        }
                    }
                    yield Ok(StreamEvent::Done { output });
                }
                Err(e) => yield Err(e),
            }
        })
    }
}
