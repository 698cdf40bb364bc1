use admission_gate::infrastructure::mocks::{
    CountingOperation, MockCaptureLayer, MockClock, MockDocumentStore,
};
use admission_gate::{
    AdmissionGate, CacheSource, CircuitBreakerConfig, CircuitState, Decision, EvaluateOptions,
    Execution, Fingerprint, InMemoryDocumentStore, OperationOutcome, Timestamp,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

fn instance(clock: &MockClock, store: Arc<dyn admission_gate::DurableStore>) -> AdmissionGate {
    AdmissionGate::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_sweep_probability(0.0)
        .with_store(store)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_second_instance_serves_recorded_outcome() {
    let clock = MockClock::new(Timestamp::from_millis(0));
    let shared = InMemoryDocumentStore::new();
    let a = instance(&clock, Arc::new(shared.clone()));
    let b = instance(&clock, Arc::new(shared.clone()));
    let payload = OperationOutcome::success(json!({ "invoice": 42, "paid": true }));

    match a.evaluate("u1", "invoice/42", EvaluateOptions::default()).await.unwrap() {
        Decision::Proceed(token) => a.record(token, payload.clone()).await,
        other => panic!("expected proceed, got {:?}", other),
    }
    assert_eq!(shared.len(), 1);

    clock.advance(Duration::from_secs(2));
    let decision = b
        .evaluate("u1", "invoice/42", EvaluateOptions::default())
        .await
        .unwrap();
    assert_eq!(
        decision,
        Decision::ServeCached {
            outcome: payload.clone(),
            source: CacheSource::Durable,
        }
    );
    assert_eq!(b.cache_len(), 1);
    assert_eq!(b.calls_this_hour("u1"), 0);

    // warmed locally, no second store read needed
    clock.advance(Duration::from_secs(2));
    let decision = b
        .evaluate("u1", "invoice/42", EvaluateOptions::default())
        .await
        .unwrap();
    assert!(matches!(
        decision,
        Decision::ServeCached {
            source: CacheSource::Local,
            ..
        }
    ));
    assert_eq!(b.metrics().snapshot().served_durable, 1);
    assert_eq!(b.metrics().snapshot().served_local, 1);
}

#[tokio::test]
async fn test_instances_agree_on_derived_keys() {
    let clock = MockClock::new(Timestamp::from_millis(0));
    let shared = InMemoryDocumentStore::new();
    let a = instance(&clock, Arc::new(shared.clone()));
    let b = instance(&clock, Arc::new(shared.clone()));

    let mut params_a = BTreeMap::new();
    params_a.insert("region".to_string(), "eu/west".to_string());
    params_a.insert("month".to_string(), "2024-03".to_string());
    let key_a = Fingerprint::new("build_report", "u1", &params_a);

    let mut params_b = BTreeMap::new();
    params_b.insert("month".to_string(), "2024-03".to_string());
    params_b.insert("region".to_string(), "eu/west".to_string());
    let key_b = Fingerprint::new("build_report", "u1", &params_b);
    assert_eq!(key_a, key_b);

    if let Decision::Proceed(token) = a.evaluate("u1", key_a.as_str(), EvaluateOptions::default()).await.unwrap() {
        a.record(token, OperationOutcome::success(json!("march"))).await;
    }
    assert!(shared.get(key_a.as_str()).is_some());

    clock.advance(Duration::from_secs(2));
    assert!(matches!(
        b.evaluate("u1", key_b.as_str(), EvaluateOptions::default()).await.unwrap(),
        Decision::ServeCached {
            source: CacheSource::Durable,
            ..
        }
    ));
    let other_identity = Fingerprint::simple("build_report", "u2");
    assert!(b
        .evaluate("u2", other_identity.as_str(), EvaluateOptions::default())
        .await
        .unwrap()
        .is_proceed());
}

#[tokio::test]
async fn test_warmed_entry_keeps_durable_age() {
    let clock = MockClock::new(Timestamp::from_millis(0));
    let shared = InMemoryDocumentStore::new();
    let a = instance(&clock, Arc::new(shared.clone()));
    let b = instance(&clock, Arc::new(shared.clone()));
    let ttl = a.config().cache_ttl;

    if let Decision::Proceed(token) = a.evaluate("u1", "k", EvaluateOptions::default()).await.unwrap() {
        a.record(token, OperationOutcome::success(json!(1))).await;
    }

    clock.set(Timestamp::from_millis(ttl.as_millis() as u64 - 1_000));
    assert!(b
        .evaluate("u1", "k", EvaluateOptions::default())
        .await
        .unwrap()
        .is_cached());

    clock.set(Timestamp::from_millis(ttl.as_millis() as u64 + 1));
    assert!(b
        .evaluate("u1", "k", EvaluateOptions::default())
        .await
        .unwrap()
        .is_proceed());
}

#[tokio::test]
async fn test_durable_hit_survives_full_local_cache() {
    let clock = MockClock::new(Timestamp::from_millis(0));
    let shared = InMemoryDocumentStore::new();
    let a = instance(&clock, Arc::new(shared.clone()));
    let b = AdmissionGate::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_sweep_probability(0.0)
        .with_cache_max_size(3)
        .with_store(Arc::new(shared.clone()))
        .build()
        .unwrap();

    if let Decision::Proceed(token) = a.evaluate("u1", "x", EvaluateOptions::default()).await.unwrap() {
        a.record(token, OperationOutcome::success(json!("x"))).await;
    }
    for i in 1..=3 {
        clock.advance(Duration::from_secs(2));
        if let Decision::Proceed(token) = b
            .evaluate("u2", &format!("k{}", i), EvaluateOptions::default())
            .await
            .unwrap()
        {
            b.record(token, OperationOutcome::success(json!(i))).await;
        }
    }
    assert_eq!(b.cache_len(), 3);

    clock.advance(Duration::from_secs(2));
    let first = b.evaluate("u2", "x", EvaluateOptions::default()).await.unwrap();
    assert!(matches!(
        first,
        Decision::ServeCached {
            source: CacheSource::Durable,
            ..
        }
    ));

    clock.advance(Duration::from_secs(2));
    let second = b.evaluate("u2", "x", EvaluateOptions::default()).await.unwrap();
    assert!(matches!(
        second,
        Decision::ServeCached {
            source: CacheSource::Local,
            ..
        }
    ));
    assert!(b.cache_len() <= 3);
}

#[tokio::test]
async fn test_sweep_bounds_default_store() {
    let clock = MockClock::new(Timestamp::from_millis(0));
    let shared = InMemoryDocumentStore::new();
    let gate = AdmissionGate::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_sweep_probability(0.0)
        .with_cache_max_size(10)
        .with_cache_ttl(Duration::from_secs(1))
        .with_rate_limits(10_000, 10_000)
        .with_burst_detection(Duration::ZERO, 5)
        .with_store(Arc::new(shared.clone()))
        .build()
        .unwrap();

    for i in 0..2_000 {
        if let Decision::Proceed(token) = gate
            .evaluate("u1", &format!("k{}", i), EvaluateOptions::default())
            .await
            .unwrap()
        {
            gate.record(token, OperationOutcome::success(json!(i))).await;
        }
    }
    assert_eq!(shared.len(), 2_000);

    clock.advance(Duration::from_secs(2));
    let stats = gate.sweep();
    assert_eq!(stats.durable_documents, 2_000);
    assert_eq!(gate.cache_len(), 0);
    assert!(shared.is_empty());
}

#[tokio::test]
async fn test_sweep_keeps_fresh_documents() {
    let clock = MockClock::new(Timestamp::from_millis(0));
    let shared = InMemoryDocumentStore::new();
    let gate = instance(&clock, Arc::new(shared.clone()));

    if let Decision::Proceed(token) = gate.evaluate("u1", "old", EvaluateOptions::default()).await.unwrap() {
        gate.record(token, OperationOutcome::success(json!(1))).await;
    }
    clock.advance(gate.config().cache_ttl);
    if let Decision::Proceed(token) = gate.evaluate("u1", "new", EvaluateOptions::default()).await.unwrap() {
        gate.record(token, OperationOutcome::success(json!(2))).await;
    }

    clock.advance(Duration::from_secs(1));
    assert_eq!(gate.sweep().durable_documents, 1);
    assert!(shared.get("old").is_none());
    assert!(shared.get("new").is_some());
}

#[tokio::test]
async fn test_stale_durable_record_is_ignored() {
    let clock = MockClock::new(Timestamp::from_millis(0));
    let shared = InMemoryDocumentStore::new();
    let writer = instance(&clock, Arc::new(shared.clone()));
    let strict = AdmissionGate::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_sweep_probability(0.0)
        .with_dedupe_ttl(Duration::from_secs(30))
        .with_store(Arc::new(shared.clone()))
        .build()
        .unwrap();
    let lenient = instance(&clock, Arc::new(shared.clone()));

    if let Decision::Proceed(token) = writer
        .evaluate("u1", "k", EvaluateOptions::default())
        .await
        .unwrap()
    {
        writer.record(token, OperationOutcome::success(json!(1))).await;
    }

    clock.advance(Duration::from_secs(31));
    assert!(strict
        .evaluate("u1", "k", EvaluateOptions::default())
        .await
        .unwrap()
        .is_proceed());
    assert!(lenient
        .evaluate("u1", "k", EvaluateOptions::default())
        .await
        .unwrap()
        .is_cached());
}

#[tokio::test]
async fn test_failing_store_fails_open_with_warning() {
    let capture = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let clock = MockClock::new(Timestamp::from_millis(0));
    let store = MockDocumentStore::new();
    store.set_failing(true);
    let gate = instance(&clock, Arc::new(store.clone()));
    let operation = CountingOperation::returning(OperationOutcome::success(json!("fresh")));

    let result = gate
        .execute("u1", "k", EvaluateOptions::default(), &json!({}), &operation)
        .await
        .unwrap();
    assert_eq!(result, Execution::Ran(OperationOutcome::success(json!("fresh"))));
    assert_eq!(operation.calls(), 1);
    assert_eq!(gate.metrics().store_failures(), 2);

    let warnings = capture.at_level(Level::WARN);
    assert_eq!(warnings.len(), 2);
    assert!(warnings
        .iter()
        .any(|e| e.message.contains("read failed") && e.field("key") == Some("k")));
    assert!(warnings.iter().any(|e| e.message.contains("write failed")));

    // the local cache still works
    clock.advance(Duration::from_secs(2));
    let result = gate
        .execute("u1", "k", EvaluateOptions::default(), &json!({}), &operation)
        .await
        .unwrap();
    assert!(matches!(result, Execution::Cached { source: CacheSource::Local, .. }));
    assert_eq!(operation.calls(), 1);
}

#[tokio::test]
async fn test_circuit_opens_and_recovers() {
    let clock = MockClock::new(Timestamp::from_millis(0));
    let store = MockDocumentStore::new();
    store.set_failing(true);
    let gate = AdmissionGate::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_sweep_probability(0.0)
        .with_store(Arc::new(store.clone()))
        .with_circuit_breaker(CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_secs(10),
        })
        .build()
        .unwrap();

    for i in 0..2 {
        gate.evaluate("u1", &format!("k{}", i), EvaluateOptions::default())
            .await
            .unwrap();
        clock.advance(Duration::from_secs(2));
    }
    assert_eq!(gate.circuit_breaker().state(), CircuitState::Open);

    let loads = store.load_calls();
    let decision = gate
        .evaluate("u1", "k9", EvaluateOptions::default())
        .await
        .unwrap();
    assert!(decision.is_proceed());
    assert_eq!(store.load_calls(), loads);

    store.set_failing(false);
    clock.advance(Duration::from_secs(11));
    gate.evaluate("u1", "k10", EvaluateOptions::default())
        .await
        .unwrap();
    assert_eq!(store.load_calls(), loads + 1);
    assert_eq!(gate.circuit_breaker().state(), CircuitState::Closed);
}

#[cfg(feature = "async")]
#[tokio::test]
async fn test_detached_record_reaches_store() {
    let clock = MockClock::new(Timestamp::from_millis(0));
    let store = MockDocumentStore::new();
    let gate = instance(&clock, Arc::new(store.clone()));

    let token = match gate.evaluate("u1", "k", EvaluateOptions::default()).await.unwrap() {
        Decision::Proceed(token) => token,
        other => panic!("expected proceed, got {:?}", other),
    };
    let handle = gate.record_detached(token, OperationOutcome::success(json!(5)));
    assert_eq!(gate.cache_len(), 1);

    handle.await.unwrap();
    assert_eq!(store.upsert_calls(), 1);
    let record = store.documents().get("k").unwrap();
    assert_eq!(record.payload, OperationOutcome::success(json!(5)));
    assert_eq!(record.updated_at, Timestamp::from_millis(0));
}
