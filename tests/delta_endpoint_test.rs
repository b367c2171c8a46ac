mod common;

use axum::http::StatusCode;
use serde_json::json;
use tidepool::Version;

#[tokio::test]
async fn fresh_tenant_returns_empty_array_and_creates_the_store() {
    let app = common::test_app();
    let token = app.token("acme", "user-1");

    let (status, body) = app.get("/api/sync?since=0", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    // First access materialized the store file.
    let store = app
        .state
        .stores
        .open(&app.tenant("acme"))
        .await
        .expect("store");
    assert!(store.path().exists());
}

#[tokio::test]
async fn since_defaults_to_zero_when_missing_or_garbage() {
    let app = common::test_app();
    let token = app.token("acme", "user-1");
    app.post("/api/projects", &token, json!({"name": "One"}))
        .await;

    for uri in ["/api/sync", "/api/sync?since=", "/api/sync?since=banana"] {
        let (status, body) = app.get(uri, &token).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body.as_array().unwrap().len(), 1, "{uri} should return the full journal");
    }
}

#[tokio::test]
async fn since_at_or_past_the_head_is_empty() {
    let app = common::test_app();
    let token = app.token("acme", "user-1");
    app.post("/api/projects", &token, json!({"name": "One"}))
        .await;
    app.post("/api/projects", &token, json!({"name": "Two"}))
        .await;

    assert!(app.deltas(&token, 2).await.is_empty());
    assert!(app.deltas(&token, 99).await.is_empty());
}

#[tokio::test]
async fn rows_come_back_strictly_ascending_by_version() {
    let app = common::test_app();
    let token = app.token("acme", "user-1");
    for i in 0..5 {
        app.post("/api/projects", &token, json!({"name": format!("p{i}")}))
            .await;
    }

    let entries = app.deltas(&token, 0).await;
    let versions: Vec<i64> = entries.iter().map(|e| e.version.as_raw()).collect();
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn subscriber_overflow_loses_pushes_but_never_pulls() {
    let app = common::test_app();
    let token = app.token("acme", "user-1");
    let mut sub = app.hub.clone().subscribe(app.tenant("acme"));

    // More writes than the subscriber queue can hold.
    let writes = tidepool::hub::SUBSCRIBER_QUEUE_DEPTH + 5;
    for i in 0..writes {
        let (status, _) = app
            .post("/api/projects", &token, json!({"name": format!("p{i}")}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let mut pushed = Vec::new();
    while let Some(v) = sub.try_recv() {
        pushed.push(v);
    }
    assert!(pushed.len() <= tidepool::hub::SUBSCRIBER_QUEUE_DEPTH);

    // Everything is still there to pull from the last version received.
    let last = pushed.last().copied().unwrap_or(Version::ZERO);
    let entries = app.deltas(&token, last.as_raw()).await;
    assert_eq!(
        last.as_raw() + entries.len() as i64,
        writes as i64,
        "pull recovers every version the push path dropped"
    );
}

#[tokio::test]
async fn payloads_pass_through_opaque() {
    let app = common::test_app();
    let token = app.token("acme", "user-1");

    let name = r#"quo"tes & <tags> and ünïcode"#;
    let (status, created) = app
        .post("/api/projects", &token, json!({"name": name}))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let entries = app.deltas(&token, 0).await;
    let payload: serde_json::Value = serde_json::from_str(&entries[0].payload).unwrap();
    assert_eq!(payload["name"], name);
    assert_eq!(payload["id"], created["id"]);
}
