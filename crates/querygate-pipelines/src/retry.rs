use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use querygate_core::{QueryError, QueryPipeline, QueryStream, SessionContext};
use serde_json::Value;

/// Backoff schedule for [`RetryPipeline`].
///
/// Attempt `n` (zero based) that fails with a retryable error sleeps
/// `base_delay * 2^n`, capped at `max_delay`, before attempt `n + 1`. The
/// first attempt always runs.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Retry [`QueryError::AdmissionTimeout`]. Only a gated pipeline (such as a
    /// `CachedPipeline`) reports it; a pipeline sitting behind a gate runs
    /// while already admitted and never does. Turn this off when the caller
    /// would rather shed load than queue again.
    pub retry_admission_timeouts: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            retry_admission_timeouts: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn without_admission_retries(mut self) -> Self {
        self.retry_admission_timeouts = false;
        self
    }

    /// How long to wait before retrying after `error` ended attempt `attempt`,
    /// or `None` if the error should be returned as is.
    pub fn backoff(&self, error: &QueryError, attempt: usize) -> Option<Duration> {
        if attempt + 1 >= self.max_attempts {
            return None;
        }
        let retryable = match error {
            QueryError::AdmissionTimeout { .. } => self.retry_admission_timeouts,
            other => other.is_retryable(),
        };
        retryable.then(|| {
            self.base_delay
                .saturating_mul(2u32.saturating_pow(attempt as u32))
                .min(self.max_delay)
        })
    }
}

/// Retries the inner pipeline according to a [`RetryPolicy`].
///
/// Streams are retried only while nothing has been emitted yet. Once a token
/// has reached the caller a later failure is passed through, so output is
/// never repeated.
pub struct RetryPipeline {
    inner: Arc<dyn QueryPipeline>,
    policy: RetryPolicy,
}

impl RetryPipeline {
    pub fn new(inner: Arc<dyn QueryPipeline>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl QueryPipeline for RetryPipeline {
    async fn execute(&self, query: &str, session: &SessionContext) -> Result<Value, QueryError> {
        let mut attempt = 0;
        loop {
            let error = match self.inner.execute(query, session).await {
                Ok(output) => return Ok(output),
                Err(e) => e,
            };
            let Some(delay) = self.policy.backoff(&error, attempt) else {
                return Err(error);
            };
            attempt += 1;
            tracing::warn!(attempt, error = %error, ?delay, "retrying query");
            tokio::time::sleep(delay).await;
        }
    }

    fn stream(&self, query: String, session: SessionContext) -> QueryStream<'_> {
        let inner = self.inner.clone();
        let policy = self.policy.clone();

        Box::pin(async_stream::stream! {
            let mut attempt = 0;
            'attempts: loop {
                let mut events = inner.stream(query.clone(), session.clone());
                let mut emitted = false;
                while let Some(event) = events.next().await {
                    match event {
                        Ok(event) => {
                            emitted = true;
                            yield Ok(event);
                        }
                        Err(e) => {
                            let delay = if emitted { None } else { policy.backoff(&e, attempt) };
                            match delay {
                                Some(delay) => {
                                    attempt += 1;
                                    tracing::warn!(attempt, error = %e, ?delay, "retrying query stream");
                                    tokio::time::sleep(delay).await;
                                    continue 'attempts;
                                }
                                None => {
                                    yield Err(e);
                                    return;
                                }
                            }
                        }
                    }
                }
                return;
            }
        })
    }
}
