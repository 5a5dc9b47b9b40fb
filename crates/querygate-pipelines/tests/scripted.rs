use std::time::{Duration, Instant};

use futures::StreamExt;
use querygate_core::{QueryError, QueryPipeline, SessionContext, StreamEvent};
use querygate_pipelines::ScriptedPipeline;
use serde_json::json;

#[tokio::test]
async fn replays_responses_in_order() {
    let pipeline = ScriptedPipeline::new(vec![json!("first"), json!("second")]);
    let session = SessionContext::default();

    assert_eq!(pipeline.execute("a", &session).await.unwrap(), json!("first"));
    assert_eq!(pipeline.execute("b", &session).await.unwrap(), json!("second"));
    assert_eq!(pipeline.calls(), 2);
    assert_eq!(pipeline.received().await, vec!["a", "b"]);
}

#[tokio::test]
async fn exhausted_script_fails_upstream() {
    let pipeline = ScriptedPipeline::new(vec![]);
    let err = pipeline
        .execute("anything", &SessionContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Upstream(_)));
    assert!(err.to_string().contains("exhausted"));
}

#[tokio::test]
async fn scripted_errors_are_returned() {
    let pipeline = ScriptedPipeline::with_results(vec![
        Err(QueryError::Timeout("upstream slow".into())),
        Ok(json!("ok")),
    ]);
    let session = SessionContext::default();

    let err = pipeline.execute("q", &session).await.unwrap_err();
    assert_eq!(err, QueryError::Timeout("upstream slow".into()));
    assert_eq!(pipeline.execute("q", &session).await.unwrap(), json!("ok"));
}

#[tokio::test]
async fn delay_slows_each_call() {
    let pipeline = ScriptedPipeline::new(vec![json!(1)]).with_delay(Duration::from_millis(50));
    let start = Instant::now();
    pipeline.execute("q", &SessionContext::default()).await.unwrap();
    assert!(start.elapsed().as_millis() >= 45);
}

#[tokio::test]
async fn clones_share_the_script() {
    let pipeline = ScriptedPipeline::new(vec![json!("only")]);
    let clone = pipeline.clone();
    let session = SessionContext::default();

    clone.execute("q", &session).await.unwrap();
    assert!(pipeline.execute("q", &session).await.is_err());
    assert_eq!(pipeline.calls(), 2);
}

#[tokio::test]
async fn streams_words_as_tokens_when_asked() {
    let pipeline = ScriptedPipeline::new(vec![json!("three pallets left")]).with_streamed_tokens();

    let events: Vec<_> = pipeline
        .stream("q".to_string(), SessionContext::default())
        .collect()
        .await;

    assert_eq!(
        events,
        vec![
            Ok(StreamEvent::token("three ")),
            Ok(StreamEvent::token("pallets ")),
            Ok(StreamEvent::token("left")),
            Ok(StreamEvent::Done {
                output: json!("three pallets left")
            }),
        ]
    );
    assert_eq!(pipeline.calls(), 1);
}
