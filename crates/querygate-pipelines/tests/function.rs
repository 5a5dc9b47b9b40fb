use querygate_core::{QueryError, QueryPipeline, SessionContext};
use querygate_pipelines::FnPipeline;
use serde_json::json;

#[tokio::test]
async fn closure_receives_query_and_session() {
    let pipeline = FnPipeline::new(|query, session| async move {
        Ok(json!({ "query": query, "session": session.session_id }))
    });

    let output = pipeline
        .execute("배송 현황", &SessionContext::new("s-7"))
        .await
        .unwrap();
    assert_eq!(output, json!({ "query": "배송 현황", "session": "s-7" }));
}

#[tokio::test]
async fn closure_errors_propagate() {
    let pipeline = FnPipeline::new(|_query, _session| async move {
        Err(QueryError::Upstream("cypher generation failed".into()))
    });

    let err = pipeline
        .execute("q", &SessionContext::default())
        .await
        .unwrap_err();
    assert_eq!(err, QueryError::Upstream("cypher generation failed".into()));
}
