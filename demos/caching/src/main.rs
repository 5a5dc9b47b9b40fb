use std::sync::Arc;
use std::time::Duration;

use querygate::cache::{QueryGate, QueryGateConfig};
use querygate::core::{QueryError, QueryOptions, SessionContext};
use querygate::pipelines::ScriptedPipeline;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), QueryError> {
    tracing_subscriber::fmt::init();

    // --- Setup: slow pipeline with only two answers ---
    // Anything past the second real execution fails, so every extra answer
    // below must have come from the cache or a shared computation.
    let pipeline = ScriptedPipeline::new(vec![
        json!({"answer": "12 shipments in transit"}),
        json!({"answer": "Seoul DC holds 340 pallets"}),
    ])
    .with_delay(Duration::from_millis(200));

    let config = QueryGateConfig::default()
        .with_max_concurrent(2)
        .with_default_ttl(Duration::from_secs(60));
    let gate = QueryGate::new(Arc::new(pipeline.clone()), config)?;
    let session = SessionContext::new("demo");
    let options = QueryOptions::default();

    // --- First call: cache miss ---
    println!("=== Cache Miss (first call) ===");
    let first = gate.query("배송 현황 알려줘", &session, &options).await?;
    println!("Response: {} (from_cache: {})", first.output, first.from_cache);

    // --- Different phrasing, same meaning: cache hit ---
    println!("\n=== Cache Hit (rephrased) ===");
    let rephrased = gate.query("배송현황을 조회해줘", &session, &options).await?;
    println!(
        "Response: {} (from_cache: {})",
        rephrased.output, rephrased.from_cache
    );

    // --- Two simultaneous identical questions: one execution ---
    println!("\n=== Coalesced (concurrent duplicates) ===");
    let (a, b) = tokio::join!(
        gate.query("서울 물류센터 재고 보여줘", &session, &options),
        gate.query("서울 물류센터의 재고를 보여줘", &session, &options),
    );
    let (a, b) = (a?, b?);
    println!("Response: {} (coalesced: {})", a.output, a.coalesced);
    println!("Response: {} (coalesced: {})", b.output, b.coalesced);
    println!("Pipeline executions so far: {}", pipeline.calls());

    // --- Stats ---
    println!("\n=== Stats ===");
    println!(
        "{}",
        serde_json::to_string_pretty(&gate.stats_json()).unwrap_or_default()
    );

    // --- Clear cache ---
    println!("\n=== Clear Cache ===");
    println!("Removed {} entries", gate.clear());

    println!("\nQuery gate demo completed successfully!");
    Ok(())
}
