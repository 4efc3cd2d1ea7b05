//! Ingestion end-to-end tests.
//!
//! Drives the full router in-process with an in-memory store and a manual
//! clock, then runs the aggregation engine against the same store.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use lifeline_aggregate::AggregationEngine;
use lifeline_api::{ApiState, build_router};
use lifeline_core::{EventKind, ManualClock};
use lifeline_state::{StateStore, TelemetryRepository};

const T0: u64 = 1_700_000_000_000;

struct Harness {
    router: Router,
    store: Arc<StateStore>,
    clock: ManualClock,
    engine: AggregationEngine,
}

fn harness() -> Harness {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let clock = ManualClock::new(T0);
    let router = build_router(ApiState::new(store.clone(), Arc::new(clock.clone())));
    let engine = AggregationEngine::new(store.clone(), Arc::new(clock.clone()));
    Harness {
        router,
        store,
        clock,
        engine,
    }
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let content_type = resp
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();

    if status != StatusCode::METHOD_NOT_ALLOWED {
        assert_eq!(content_type.as_deref(), Some("application/json"));
    }
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn post(router: &Router, path: &str, body: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, req).await
}

async fn post_json(router: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    post(router, path, &body.to_string()).await
}

async fn get(router: &Router, path: &str) -> (StatusCode, Value) {
    let req = Request::builder().uri(path).body(Body::empty()).unwrap();
    send(router, req).await
}

#[tokio::test]
async fn install_start_aggregate_then_go_stale() {
    let h = harness();

    let (status, body) = post(&h.router, "/on-post-install", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["birthDate"], T0);
    let id = body["instanceID"].as_str().unwrap().to_string();
    assert!(!id.is_empty());

    h.clock.advance(Duration::from_secs(60));
    let (status, body) = post_json(
        &h.router,
        "/on-start",
        json!({"instanceID": id, "data": {"version": "1.0"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));
    assert!(h.store.find_instance(&id).unwrap().unwrap().is_online);

    h.clock.advance(Duration::from_secs(3_600));
    let metric = h.engine.run().unwrap().metric;
    assert!(metric.instances_nb >= 1);
    assert!(metric.setups_nb >= 1);

    h.clock.advance(Duration::from_secs(25 * 3_600));
    let report = h.engine.run().unwrap();
    assert_eq!(report.flipped_offline, vec![id.clone()]);
    assert!(!h.store.find_instance(&id).unwrap().unwrap().is_online);

    let (status, body) = get(&h.router, &format!("/instances/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isOnline"], false);
    assert_eq!(body["data"]["attributes"]["version"], "1.0");
}

#[tokio::test]
async fn install_twice_keeps_one_instance() {
    let h = harness();

    for _ in 0..2 {
        let (status, body) = post_json(&h.router, "/on-post-install", json!({"instanceID": "dup"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["instanceID"], "dup");
    }

    assert_eq!(h.store.list_instances().unwrap().len(), 1);
    let kinds: Vec<_> = h
        .store
        .list_events_for_instance("dup")
        .unwrap()
        .into_iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(kinds, vec![EventKind::Setup, EventKind::Setup]);
}

#[tokio::test]
async fn invalid_json_counts_as_empty_body() {
    let h = harness();

    let (status, body) = post(&h.router, "/on-post-install", "{not json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["instanceID"].as_str().is_some());

    let (status, body) = post(&h.router, "/on-start", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"success": false, "error": "Missing required fields"}));
}

#[tokio::test]
async fn unknown_instance_is_404_without_side_effects() {
    let h = harness();

    let cases = [
        ("/on-utterance", json!({"instanceID": "ghost", "data": {"text": "hi"}})),
        ("/on-event", json!({"instanceID": "ghost", "eventName": "HEARTBEAT"})),
        ("/on-event", json!({"instanceID": "ghost", "eventName": "STOPPED"})),
        ("/on-error", json!({"instanceID": "ghost", "error": "boom"})),
    ];
    for (path, body) in cases {
        let (status, resp) = post_json(&h.router, path, body).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
        assert_eq!(resp, json!({"success": false, "error": "Instance not found"}));
    }

    assert!(h.store.list_instances().unwrap().is_empty());
    assert!(h.store.list_events_for_instance("ghost").unwrap().is_empty());
    assert!(h.store.list_utterances_for_instance("ghost").unwrap().is_empty());
    assert!(h.store.list_errors_for_instance("ghost").unwrap().is_empty());

    let (status, _) = get(&h.router, "/instances/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bogus_event_name_is_rejected_without_side_effects() {
    let h = harness();
    post_json(&h.router, "/on-post-install", json!({"instanceID": "a"})).await;
    let before = h.store.find_instance("a").unwrap().unwrap();

    let (status, body) = post_json(
        &h.router,
        "/on-event",
        json!({"instanceID": "a", "eventName": "BOGUS"}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"success": false, "error": "Invalid event name"}));
    assert_eq!(h.store.find_instance("a").unwrap().unwrap(), before);
    assert_eq!(h.store.list_events_for_instance("a").unwrap().len(), 1);
}

#[tokio::test]
async fn missing_fields_are_400() {
    let h = harness();

    let cases = [
        ("/on-start", json!({"data": {}})),
        ("/on-start", json!({"instanceID": "a"})),
        ("/on-utterance", json!({"instanceID": "a"})),
        ("/on-event", json!({"instanceID": "a"})),
        ("/on-event", json!({"eventName": "HEARTBEAT"})),
        ("/on-error", json!({"instanceID": "a"})),
        ("/on-error", json!({"instanceID": "a", "error": null})),
    ];
    for (path, body) in cases {
        let (status, resp) = post_json(&h.router, path, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(resp["error"], "Missing required fields");
    }
}

#[tokio::test]
async fn heartbeat_uptime_and_stop_through_events() {
    let h = harness();
    post_json(&h.router, "/on-start", json!({"instanceID": "a", "data": {}})).await;

    h.clock.advance(Duration::from_secs(125));
    let (status, _) = post_json(
        &h.router,
        "/on-event",
        json!({"instanceID": "a", "eventName": "HEARTBEAT"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.store.find_instance("a").unwrap().unwrap().last_uptime, 125);

    let (status, _) = post_json(
        &h.router,
        "/on-event",
        json!({"instanceID": "a", "eventName": "STOPPED"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!h.store.find_instance("a").unwrap().unwrap().is_online);
}

#[tokio::test]
async fn utterances_and_errors_are_recorded() {
    let h = harness();
    post_json(&h.router, "/on-post-install", json!({"instanceID": "a"})).await;

    let (status, _) = post_json(
        &h.router,
        "/on-utterance",
        json!({"instanceID": "a", "data": {"text": "hello"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post_json(
        &h.router,
        "/on-error",
        json!({"instanceID": "a", "error": "model failed to load"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(h.store.list_utterances_for_instance("a").unwrap()[0].data["text"], "hello");
    assert_eq!(
        h.store.list_errors_for_instance("a").unwrap()[0].message,
        "model failed to load"
    );

    let metric = h.engine.run().unwrap().metric;
    assert_eq!(metric.utterances_nb, 1);
    assert_eq!(metric.active_instances_nb, 1);
}

#[tokio::test]
async fn daily_metrics_and_prometheus_reflect_latest_run() {
    let h = harness();
    post_json(&h.router, "/on-post-install", json!({"instanceID": "a"})).await;
    h.engine.run().unwrap();
    h.clock.advance(Duration::from_secs(60));
    h.engine.run().unwrap();

    let (status, body) = get(&h.router, "/daily-metrics?limit=1").await;
    assert_eq!(status, StatusCode::OK);
    let metrics = body["data"].as_array().unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0]["createdAt"], T0 + 60_000);

    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let resp = h.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("lifeline_instances 1\n"));
    assert!(text.contains("lifeline_setups 1\n"));
}

#[tokio::test]
async fn malformed_limit_uses_json_envelope() {
    let h = harness();

    let (status, body) = get(&h.router, "/daily-metrics?limit=abc").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"success": false, "error": "Invalid limit"}));
}

#[tokio::test]
async fn numeric_instance_id_is_kept() {
    let h = harness();

    let (status, body) = post_json(&h.router, "/on-post-install", json!({"instanceID": 42})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["instanceID"], "42");

    let (status, _) = post_json(&h.router, "/on-start", json!({"instanceID": 42, "data": {}})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(h.store.find_instance("42").unwrap().unwrap().is_online);
}

#[tokio::test]
async fn get_on_ingestion_route_is_rejected() {
    let h = harness();
    let (status, _) = get(&h.router, "/on-start").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}
