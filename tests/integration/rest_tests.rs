//! REST transport tests against a local mock server.

use std::time::Duration;

use ambit::{Client, FlagConfig, FlagValue, Properties};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{API_KEY, bodies_at, fast_retries, init_tracing, manual_flush, rest_client};

async fn mount_batch_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/batch/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 1})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_batch_carries_api_key_and_events() {
    let server = MockServer::start().await;
    mount_batch_ok(&server).await;
    let client = rest_client(&server).await.expect("client should build");

    client.capture("signed_up").distinct_id("user-1").property("plan", "pro").send();
    client.capture("page_viewed").send();
    client.flush().await;

    let bodies = bodies_at(&server, "/batch/").await;
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert_eq!(body["api_key"], json!(API_KEY));

    let batch = body["batch"].as_array().expect("batch should be an array");
    assert_eq!(batch.len(), 2);

    assert_eq!(batch[0]["event"], json!("signed_up"));
    assert_eq!(batch[0]["distinct_id"], json!("user-1"));
    assert_eq!(batch[0]["properties"]["plan"], json!("pro"));
    assert_eq!(batch[0]["properties"]["$lib"], json!("ambit-rust"));
    assert!(batch[0]["uuid"].is_string());
    assert!(batch[0]["timestamp"].is_string());

    // Anonymous events still carry a distinct id on the wire.
    assert!(batch[1]["distinct_id"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(batch[1]["properties"]["$process_person_profile"], json!(false));

    assert_eq!(client.stats().sent, 2);
}

#[tokio::test]
async fn test_requests_identify_the_library() {
    let server = MockServer::start().await;
    mount_batch_ok(&server).await;
    let client = rest_client(&server).await.expect("client should build");

    client.capture("x").distinct_id("u").send();
    client.flush().await;

    let requests = server.received_requests().await.unwrap_or_default();
    let user_agent = requests[0]
        .headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(user_agent.starts_with("ambit-rust/"), "unexpected user agent {user_agent}");
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/batch/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_batch_ok(&server).await;

    let client = rest_client(&server).await.expect("client should build");
    client.capture("retry_me").distinct_id("u").send();
    client.flush().await;

    assert_eq!(bodies_at(&server, "/batch/").await.len(), 3);
    assert_eq!(client.stats().sent, 1);
    assert_eq!(client.stats().failed, 0);
    assert_eq!(client.transport_stats().map(|s| s.retries), Some(2));
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/batch/"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "invalid project api key"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = rest_client(&server).await.expect("client should build");
    let id = client.capture("x").distinct_id("u").send();
    assert!(id.is_some(), "capture succeeds even though delivery will fail");
    client.flush().await;

    assert_eq!(client.stats().failed, 1);
    assert_eq!(client.transport_stats().map(|s| s.requests_failed), Some(1));
}

#[tokio::test]
async fn test_retries_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/batch/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let client = rest_client(&server).await.expect("client should build");
    client.capture("x").distinct_id("u").send();
    client.flush().await;

    assert_eq!(client.stats().failed, 1);
}

#[tokio::test]
async fn test_rate_limit_honours_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/batch/"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_batch_ok(&server).await;

    let client = rest_client(&server).await.expect("client should build");
    client.capture("x").distinct_id("u").send();
    client.flush().await;

    assert_eq!(client.stats().sent, 1);
    assert_eq!(bodies_at(&server, "/batch/").await.len(), 2);
}

#[tokio::test]
async fn test_connection_failure_is_counted() {
    init_tracing();
    let client = Client::builder()
        .api_key(API_KEY)
        .host("http://127.0.0.1:1")
        .batch_config(manual_flush())
        .retry_config(fast_retries())
        .timeout(Duration::from_millis(500))
        .build()
        .await
        .expect("client should build");

    client.capture("x").distinct_id("u").send();
    client.flush().await;

    assert_eq!(client.stats().failed, 1);
    assert!(!client.flag_enabled("beta", "u", &Properties::new()).await);
}

#[tokio::test]
async fn test_local_evaluation_uses_personal_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/feature_flag/local_evaluation/"))
        .and(query_param("token", API_KEY))
        .and(header("authorization", "Bearer phx_personal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "flags": [{
                "key": "new-dashboard",
                "active": true,
                "filters": {
                    "groups": [{
                        "properties": [{"key": "plan", "value": ["pro", "enterprise"], "operator": "exact", "type": "person"}],
                        "rollout_percentage": 100
                    }],
                    "payloads": {"true": "{\"columns\": 3}"}
                }
            }],
            "group_type_mapping": {}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/decide/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let client = Client::builder()
        .api_key(API_KEY)
        .personal_api_key("phx_personal")
        .host(server.uri())
        .batch_config(manual_flush())
        .flag_config(FlagConfig::builder().send_flag_called_events(false).build())
        .build()
        .await
        .expect("client should build");

    let mut pro = Properties::new();
    pro.insert("plan".into(), json!("pro"));
    let mut free = Properties::new();
    free.insert("plan".into(), json!("free"));

    assert!(client.flag_enabled("new-dashboard", "user-1", &pro).await);
    assert!(!client.flag_enabled("new-dashboard", "user-2", &free).await);
    assert_eq!(client.local_flag_count(), 1);
}

#[tokio::test]
async fn test_decide_fallback_with_variant_and_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/decide/"))
        .and(query_param("v", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "featureFlags": {"checkout-copy": "variant-b", "off": false},
            "featureFlagPayloads": {"checkout-copy": "{\"headline\": \"Buy now\"}"}
        })))
        .mount(&server)
        .await;

    let client = rest_client(&server).await.expect("client should build");

    let value = client.flag_value("checkout-copy", "user-1", &Properties::new()).await;
    assert_eq!(value, FlagValue::Variant("variant-b".into()));
    assert_eq!(
        client.flag_payload("checkout-copy", "user-1").await,
        Some(json!({"headline": "Buy now"}))
    );
    assert!(!client.flag_enabled("off", "user-1", &Properties::new()).await);

    // One decide call per distinct id while the cache is fresh.
    let decide_bodies = bodies_at(&server, "/decide/").await;
    assert_eq!(decide_bodies.len(), 1);
    assert_eq!(decide_bodies[0]["api_key"], json!(API_KEY));
    assert_eq!(decide_bodies[0]["distinct_id"], json!("user-1"));
}

#[tokio::test]
async fn test_decide_failure_reads_disabled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/decide/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = rest_client(&server).await.expect("client should build");
    assert_eq!(client.flag_value("beta", "user-1", &Properties::new()).await, FlagValue::Disabled);
    assert!(client.flag_payload("beta", "user-1").await.is_none());
}
