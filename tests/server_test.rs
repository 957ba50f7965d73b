//! Integration tests for the analytics HTTP server

use futures_util::StreamExt;
use pageview_analytics::config::Config;
use pageview_analytics::server::run;
use std::collections::HashMap;
use std::time::Duration;

fn test_config() -> Config {
    Config {
        // Random port so tests can run in parallel
        port: 0,
        tick_interval: Duration::from_millis(100),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let (addr, shutdown_tx) = run(test_config()).await.expect("Failed to start server");

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
    assert!(body["version"].as_str().is_some());

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_publish_returns_synthetic_event() {
    let config = test_config();
    let users = config.synthetic_users.clone();
    let value_min = config.synthetic_value_min;
    let value_max = config.synthetic_value_max;

    let (addr, shutdown_tx) = run(config).await.expect("Failed to start server");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/publish?name=home&topic=events", addr))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["key"], "home");
    let user = body["user"].as_str().expect("user missing");
    assert!(users.iter().any(|u| u == user), "unexpected user {user}");
    let value = body["value"].as_u64().expect("value missing");
    assert!(value >= value_min && value < value_max);
    assert!(body["timestamp"].as_str().is_some());

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_publish_requires_params() {
    let (addr, shutdown_tx) = run(test_config()).await.expect("Failed to start server");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/publish?name=home", addr))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "MISSING_PARAMS");

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_ingest_endpoint_validation() {
    let (addr, shutdown_tx) = run(test_config()).await.expect("Failed to start server");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();

    // A well-formed event is accepted and echoed back
    let event = serde_json::json!({
        "key": "docs",
        "user": "U1",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "value": 120
    });
    let response = client
        .post(format!("http://{}/ingest", addr))
        .json(&event)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["key"], "docs");

    // An empty key is rejected with a validation error
    let bad_event = serde_json::json!({
        "key": "",
        "user": "U1",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "value": 120
    });
    let response = client
        .post(format!("http://{}/ingest", addr))
        .json(&bad_event)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_analytics_stream_reflects_published_events() {
    // Wide trailing range so just-published events stay visible on every
    // tick, whatever the wall-clock window alignment
    let config = Config {
        trailing_window_secs: 60,
        retention_horizon: Duration::from_secs(120),
        ..test_config()
    };
    let (addr, shutdown_tx) = run(config).await.expect("Failed to start server");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let client = reqwest::Client::new();

    // Publish a few events for one page
    for _ in 0..3 {
        let response = client
            .get(format!("http://{}/publish?name=P1&topic=events", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());
    }

    // Open the SSE stream and read frames until P1 shows up
    let response = client
        .get(format!("http://{}/analytics", addr))
        .send()
        .await
        .expect("Failed to open stream");
    assert!(response.status().is_success());
    assert!(response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/event-stream"))
        .unwrap_or(false));

    let mut stream = response.bytes_stream();
    let counts = tokio::time::timeout(Duration::from_secs(5), async {
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.expect("stream error");
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            for line in buffer.clone().lines() {
                if let Some(data) = line.strip_prefix("data:") {
                    if let Ok(counts) = serde_json::from_str::<HashMap<String, u64>>(data.trim()) {
                        if counts.contains_key("P1") {
                            return counts;
                        }
                    }
                }
            }
        }
        panic!("stream ended before a P1 frame arrived");
    })
    .await
    .expect("timed out waiting for analytics frame");

    assert_eq!(counts.get("P1"), Some(&3));

    let _ = shutdown_tx.send(());
}
