//! Guarding an expensive task with an admission gate.
//!
//! Two gate instances share one document store, the way two stateless
//! replicas would share Redis. The demo shows local and durable cache hits,
//! a rate-limited caller, loop detection and a forced call.

use admission_gate::{
    AdmissionGate, EvaluateOptions, Execution, Fingerprint, InMemoryDocumentStore, Operation,
    OperationOutcome,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::prelude::*;

/// Pretend report builder that takes a while and costs money.
#[derive(Default)]
struct BuildReport {
    runs: AtomicUsize,
}

#[async_trait]
impl Operation for BuildReport {
    async fn run(&self, identity: &str, params: &Value) -> OperationOutcome {
        self.runs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;

        match params.get("month").and_then(Value::as_str) {
            Some(month) => OperationOutcome::success(json!({
                "owner": identity,
                "month": month,
                "total": 1234,
            })),
            None => OperationOutcome::failure("missing month"),
        }
    }
}

/// Dedupe key for a monthly report request.
fn report_key(identity: &str, month: &str) -> Fingerprint {
    let params = BTreeMap::from([("month".to_string(), month.to_string())]);
    Fingerprint::new("build_report", identity, &params)
}

fn describe(label: &str, result: &Execution) {
    match result {
        Execution::Ran(outcome) => println!("{:<28} ran       -> {}", label, outcome.payload),
        Execution::Cached { outcome, source } => {
            println!("{:<28} cached    -> {} ({:?})", label, outcome.payload, source)
        }
        Execution::Rejected { reason, meta } => {
            println!("{:<28} rejected  -> {} {:?}", label, reason, meta.retry_after)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = InMemoryDocumentStore::new();
    let replica_a = AdmissionGate::builder()
        .with_store(Arc::new(store.clone()))
        .with_rate_limits(3, 1_000)
        .build()?;
    let replica_b = AdmissionGate::builder()
        .with_store(Arc::new(store.clone()))
        .with_rate_limits(3, 1_000)
        .build()?;
    let report = BuildReport::default();
    let march = json!({ "month": "2024-03" });
    let alice_march = report_key("alice", "2024-03");

    println!("=== Guarded Task Demo ===\n");

    let result = replica_a
        .execute("alice", alice_march.as_str(), EvaluateOptions::default(), &march, &report)
        .await?;
    describe("alice, replica A", &result);

    let result = replica_a
        .execute("alice", alice_march.as_str(), EvaluateOptions::default(), &march, &report)
        .await?;
    describe("alice again, replica A", &result);

    let result = replica_b
        .execute("alice", alice_march.as_str(), EvaluateOptions::default(), &march, &report)
        .await?;
    describe("alice, replica B", &result);

    let result = replica_a
        .execute("alice", alice_march.as_str(), EvaluateOptions::forced(), &march, &report)
        .await?;
    describe("alice forced, replica A", &result);

    println!("\nHammering replica B as bob:");
    for i in 0..8 {
        let month = format!("2024-{:02}", i + 1);
        let key = report_key("bob", &month);
        let params = json!({ "month": month });
        let result = replica_b
            .execute("bob", key.as_str(), EvaluateOptions::default(), &params, &report)
            .await?;
        describe(&format!("bob call {}", i + 1), &result);
    }

    println!("\nBad request:");
    let no_month = Fingerprint::simple("build_report", "carol");
    let result = replica_a
        .execute("carol", no_month.as_str(), EvaluateOptions::default(), &json!({}), &report)
        .await?;
    describe("carol, no month", &result);
    let result = replica_a
        .execute("carol", no_month.as_str(), EvaluateOptions::default(), &json!({}), &report)
        .await?;
    describe("carol, no month again", &result);

    println!("\nReport builder ran {} times", report.runs.load(Ordering::SeqCst));
    println!("Replica A: {:?}", replica_a.metrics().snapshot());
    println!("Replica B: {:?}", replica_b.metrics().snapshot());
    println!("Durable documents: {}", store.len());

    println!("\n=== Demo Complete ===");
    Ok(())
}
