//! End-to-end reconciliation runs driven through the HTTP surface with a
//! scripted detector and tokio's paused clock.

mod common;

use common::{build_state, call, detection, router, ScriptedSource};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use watchlist_camserver::Error;

fn drain_types(rx: &mut UnboundedReceiver<String>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(raw) = rx.try_recv() {
        out.push(serde_json::from_str(&raw).unwrap());
    }
    out
}

fn alarm_events(events: &[Value]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| e["type"].as_str())
        .filter(|t| t.starts_with("alarm_"))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_item_goes_missing_then_recovers() {
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(vec![detection("person", 0, (200.0, 200.0, 260.0, 320.0))]),
        Ok(vec![]),
        Ok(vec![detection("A", 3, (12.0, 12.0, 52.0, 52.0))]),
    ]));
    let state = build_state(source.clone());
    let (_id, mut rx) = state.realtime.register().await;
    let app = router(state);

    let (status, body) = call(
        &app,
        "POST",
        "/tracking/add",
        Some(json!({"detection": {"label": "A", "class_id": 3, "confidence": 0.87,
                                  "bbox": [10, 10, 50, 50]}})),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert!(body["data"]["id"].as_str().unwrap().starts_with("track_"));

    let (status, _) = call(&app, "POST", "/tracking/interval", Some(json!({"interval": 1}))).await;
    assert_eq!(status, 200);
    let (status, body) = call(&app, "POST", "/tracking/start", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["interval"], 1);

    // Cycles at 1s and 2s see no class 3 object
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(source.calls(), 2);

    let (_, status) = call(&app, "GET", "/tracking/status", None).await;
    assert_eq!(status["tracking_active"], true);
    assert_eq!(status["alarm_active"], true);
    assert_eq!(status["alarm_state"], "active");
    assert_eq!(status["count"], 1);
    assert_eq!(status["tracked_items"][0]["label"], "A");
    assert_eq!(status["tracked_items"][0]["is_present"], false);
    assert_eq!(status["missing_items"][0]["label"], "A");

    // Cycle at 3s sees it again
    tokio::time::sleep(Duration::from_secs(1)).await;
    let (_, status) = call(&app, "GET", "/tracking/status", None).await;
    assert_eq!(status["alarm_active"], false);
    assert_eq!(status["alarm_state"], "idle");
    assert_eq!(status["tracked_items"][0]["is_present"], true);
    assert_eq!(status["tracked_items"][0]["bbox"]["x1"], 12.0);

    let events = drain_types(&mut rx);
    assert_eq!(alarm_events(&events), vec!["alarm_triggered", "alarm_cleared"]);
    let cleared = events.iter().find(|e| e["type"] == "alarm_cleared").unwrap();
    assert_eq!(cleared["data"]["reason"], "recovered");

    let (status, _) = call(&app, "POST", "/tracking/stop", None).await;
    assert_eq!(status, 200);
}

#[tokio::test(start_paused = true)]
async fn test_acknowledged_alarm_absorbs_new_missing_item() {
    let a = detection("laptop", 63, (10.0, 10.0, 110.0, 80.0));
    let b = detection("mug", 41, (300.0, 300.0, 340.0, 350.0));
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(vec![b.clone()]),
        Ok(vec![b.clone()]),
        Ok(vec![]),
    ]));
    let state = build_state(source.clone());
    let (_id, mut rx) = state.realtime.register().await;
    let app = router(state);

    for det in [&a, &b] {
        let (status, _) = call(&app, "POST", "/tracking/add", Some(json!({ "detection": det }))).await;
        assert_eq!(status, 200);
    }

    let (status, body) = call(&app, "POST", "/tracking/alarm/acknowledge", None).await;
    assert_eq!(status, 409);
    assert_eq!(body["error_code"], "NOT_ACTIVE");

    call(&app, "POST", "/tracking/interval", Some(json!({"interval": 2}))).await;
    call(&app, "POST", "/tracking/start", None).await;

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    let (status, _) = call(&app, "POST", "/tracking/alarm/acknowledge", None).await;
    assert_eq!(status, 200);

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(source.calls(), 3);

    let (_, status) = call(&app, "GET", "/tracking/status", None).await;
    assert_eq!(status["alarm_active"], true);
    assert_eq!(status["alarm_acknowledged"], true);
    assert_eq!(status["missing_items"].as_array().unwrap().len(), 2);

    let events = drain_types(&mut rx);
    assert_eq!(
        alarm_events(&events),
        vec!["alarm_triggered", "alarm_acknowledged"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_stop_and_restart_keep_watch_list() {
    let source = Arc::new(ScriptedSource::new(vec![Ok(vec![])]));
    let state = build_state(source.clone());
    let app = router(state);

    call(
        &app,
        "POST",
        "/tracking/add",
        Some(json!({"detection": detection("A", 3, (10.0, 10.0, 50.0, 50.0))})),
    )
    .await;
    call(&app, "POST", "/tracking/interval", Some(json!({"interval": 1}))).await;
    call(&app, "POST", "/tracking/start", None).await;

    let (status, body) = call(&app, "POST", "/tracking/start", None).await;
    assert_eq!(status, 409);
    assert_eq!(body["success"], false);

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let (status, _) = call(&app, "POST", "/tracking/stop", None).await;
    assert_eq!(status, 200);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(source.calls(), 1);

    let (_, status) = call(&app, "GET", "/tracking/status", None).await;
    assert_eq!(status["tracking_active"], false);
    assert_eq!(status["alarm_active"], true);
    assert_eq!(status["count"], 1);

    let (status, _) = call(&app, "POST", "/tracking/start", None).await;
    assert_eq!(status, 200);
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_detector_failure_marks_source_degraded() {
    let unavailable = || Err(Error::DetectionSourceUnavailable("no frame".into()));
    let source = Arc::new(ScriptedSource::new(vec![
        unavailable(),
        unavailable(),
        unavailable(),
    ]));
    let state = build_state(source.clone());
    let app = router(state);

    call(
        &app,
        "POST",
        "/tracking/add",
        Some(json!({"detection": detection("A", 3, (10.0, 10.0, 50.0, 50.0))})),
    )
    .await;
    call(&app, "POST", "/tracking/interval", Some(json!({"interval": 1}))).await;
    call(&app, "POST", "/tracking/start", None).await;

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    let (_, status) = call(&app, "GET", "/tracking/status", None).await;
    assert_eq!(status["source_degraded"], false);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let (_, status) = call(&app, "GET", "/tracking/status", None).await;
    assert_eq!(status["source_degraded"], true);
    assert_eq!(status["tracking_active"], true);
    // Skipped cycles never count as misses
    assert_eq!(status["alarm_active"], false);
    assert_eq!(status["tracked_items"][0]["is_present"], true);
}
