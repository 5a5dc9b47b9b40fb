use std::sync::Arc;

use futures::StreamExt;
use querygate_cache::{CachedPipeline, QueryGate, QueryGateConfig};
use querygate_core::{QueryOptions, QueryPipeline, SessionContext, StreamEvent};
use querygate_pipelines::ScriptedPipeline;
use serde_json::json;

fn cached(pipeline: &ScriptedPipeline) -> CachedPipeline {
    let gate = QueryGate::new(Arc::new(pipeline.clone()), QueryGateConfig::default()).unwrap();
    CachedPipeline::new(Arc::new(gate))
}

#[tokio::test]
async fn second_call_not_forwarded() {
    let scripted = ScriptedPipeline::new(vec![json!("first only")]);
    let pipeline = cached(&scripted);
    let session = SessionContext::default();

    assert_eq!(pipeline.execute("재고 알려줘", &session).await.unwrap(), json!("first only"));
    assert_eq!(pipeline.execute("재고를 보여줘", &session).await.unwrap(), json!("first only"));
    assert_eq!(scripted.calls(), 1);
    assert_eq!(pipeline.gate().stats().cache.hits, 1);
}

#[tokio::test]
async fn error_not_cached() {
    let scripted = ScriptedPipeline::new(vec![]);
    let pipeline = cached(&scripted);

    let err = pipeline
        .execute("will fail", &SessionContext::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("exhausted"));
    assert!(pipeline.gate().cache().is_empty());
}

#[tokio::test]
async fn options_apply_to_every_call() {
    let scripted = ScriptedPipeline::new(vec![json!("a"), json!("b")]);
    let pipeline = cached(&scripted).with_options(QueryOptions::default().without_cache());
    let session = SessionContext::default();

    assert_eq!(pipeline.execute("find X", &session).await.unwrap(), json!("a"));
    assert_eq!(pipeline.execute("find X", &session).await.unwrap(), json!("b"));
}

#[tokio::test]
async fn usable_as_trait_object() {
    let scripted = ScriptedPipeline::new(vec![json!("streamed")]);
    let pipeline: Arc<dyn QueryPipeline> = Arc::new(cached(&scripted));

    let events: Vec<_> = pipeline
        .stream("find X".to_string(), SessionContext::default())
        .collect()
        .await;
    assert_eq!(events, vec![Ok(StreamEvent::Done { output: json!("streamed") })]);
}
