//! Client setup, processors and shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ambit::ai::Generation;
use ambit::pipeline::{PropertyFilter, StaticProperties};
use ambit::testing::TestClient;
use ambit::{Client, ErrorKind, Event, MockTransport, Properties, Settings};
use serde_json::json;

use crate::common::{API_KEY, init_tracing, manual_flush};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> =
        vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key| vars.get(key).cloned()
}

#[tokio::test]
async fn test_client_from_settings() {
    init_tracing();
    let settings = Settings::from_lookup(lookup(&[
        ("POSTHOG_API_KEY", API_KEY),
        ("POSTHOG_HOST", "https://eu.i.posthog.com/"),
    ]))
    .expect("settings should load");

    let client = Client::from_settings(&settings).await.expect("client should build");
    assert_eq!(client.host(), "https://eu.i.posthog.com");
    assert!(!client.is_disabled());
    client.shutdown().await;
}

#[tokio::test]
async fn test_missing_api_key_is_a_configuration_error() {
    let err = Settings::from_lookup(lookup(&[])).expect_err("api key is required");
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_disabled_client_is_silent() {
    init_tracing();
    let settings = Settings::from_lookup(lookup(&[("POSTHOG_DISABLED", "true")]))
        .expect("a disabled client needs no api key");
    let transport = Arc::new(MockTransport::new());
    let client = settings
        .client_builder()
        .transport(transport.clone())
        .build()
        .await
        .expect("client should build");

    assert!(client.is_disabled());
    assert!(client.capture("ignored").distinct_id("user-1").send().is_none());

    let ctx = client.new_context();
    ctx.identify("user-1");
    let error_id = ctx.capture_exception(&std::io::Error::other("boom"));
    assert!(!error_id.as_str().is_empty());
    assert!(!ctx.flag_enabled("beta").await);

    client.flush().await;
    client.shutdown().await;
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_shutdown_flushes_and_closes() {
    init_tracing();
    let transport = Arc::new(MockTransport::new());
    let client = Client::builder()
        .api_key(API_KEY)
        .batch_config(manual_flush())
        .transport(transport.clone())
        .build()
        .await
        .expect("client should build");

    for i in 0..5 {
        client.capture("queued").distinct_id(format!("user-{i}")).send();
    }
    client.shutdown().await;

    assert!(client.is_shut_down());
    assert_eq!(transport.events_named("queued").len(), 5);

    // Closed clients drop new events without failing.
    assert!(client.capture("too_late").distinct_id("user-1").send().is_none());
    client.shutdown().await;
    assert!(transport.events_named("too_late").is_empty());
    assert_eq!(client.stats().sent, 5);
}

#[tokio::test]
async fn test_shutdown_timeout_reports_completion() {
    let test = TestClient::new().await.expect("client should build");
    test.client().capture("x").distinct_id("u").send();
    assert!(test.client().shutdown_timeout(Duration::from_secs(5)).await);
    assert_eq!(test.transport().events_named("x").len(), 1);
}

#[tokio::test]
async fn test_processors_run_before_delivery() {
    let test = TestClient::with_builder(|b| {
        b.processor(StaticProperties::new().with("service", "checkout").with("plan", "default"))
            .processor(PropertyFilter::new(["password"]))
            .processor(|event: Event| (event.event() != "healthcheck").then_some(event))
    })
    .await
    .expect("client should build");

    let ctx = test.client().new_context();
    ctx.identify("user-1");
    ctx.capture("signed_up").property("plan", "pro").property("password", "hunter2").send();
    ctx.capture("healthcheck").send();

    let event = test.assert_captured("signed_up").await;
    assert_eq!(event.property("service"), Some(&json!("checkout")));
    assert_eq!(event.property("plan"), Some(&json!("pro")));
    assert!(event.property("password").is_none());
    test.assert_not_captured("healthcheck").await;
}

#[tokio::test]
async fn test_identity_calls() {
    let test = TestClient::new().await.expect("client should build");
    let client = test.client();

    let mut traits = Properties::new();
    traits.insert("email".into(), json!("ada@example.com"));
    client.identify("user-1", traits);
    client.alias("anon-42", "user-1");

    let mut company = Properties::new();
    company.insert("seats".into(), json!(40));
    client.group_identify("company", "acme", company);

    let identify = test.assert_captured("$identify").await;
    assert_eq!(identify.distinct_id(), Some("user-1"));
    assert_eq!(identify.property("$set"), Some(&json!({"email": "ada@example.com"})));

    let alias = test.assert_captured("$create_alias").await;
    assert_eq!(alias.distinct_id(), Some("user-1"));
    assert_eq!(alias.property("alias"), Some(&json!("anon-42")));

    let group = test.assert_captured("$groupidentify").await;
    assert_eq!(group.property("$group_type"), Some(&json!("company")));
    assert_eq!(group.property("$group_key"), Some(&json!("acme")));
}

#[tokio::test]
async fn test_generation_through_context() {
    let test = TestClient::new().await.expect("client should build");
    let guard = test.client().new_context();
    guard.identify("user-1");
    guard.tag("conversation", "c-9");

    Generation::new("anthropic", "claude-haiku")
        .trace_id("trace-1")
        .input(json!([{"role": "user", "content": "hi"}]))
        .output_choices(json!([{"role": "assistant", "content": "hello"}]))
        .input_tokens(3)
        .output_tokens(2)
        .latency(Duration::from_millis(250))
        .capture(&guard);

    Generation::new("anthropic", "claude-haiku").http_status(529).capture(&guard);

    let events = test.captured_named("$ai_generation").await;
    assert_eq!(events.len(), 2);

    let ok = &events[0];
    assert_eq!(ok.distinct_id(), Some("user-1"));
    assert_eq!(ok.property("conversation"), Some(&json!("c-9")));
    assert_eq!(ok.property("$ai_trace_id"), Some(&json!("trace-1")));
    assert_eq!(ok.property("$ai_input_tokens"), Some(&json!(3)));
    assert_eq!(ok.property("$ai_latency"), Some(&json!(0.25)));
    assert_eq!(ok.property("$ai_is_error"), Some(&json!(false)));

    let failed = &events[1];
    assert_eq!(failed.property("$ai_is_error"), Some(&json!(true)));
    assert!(failed.property("$ai_trace_id").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_failed_delivery_is_counted_not_raised() {
    let test = TestClient::new().await.expect("client should build");
    test.transport().fail_all(ErrorKind::Unavailable);

    test.client().capture("lost").distinct_id("u").send();
    test.client().flush().await;

    assert_eq!(test.client().stats().failed, 1);
    test.transport().clear_failure();
    test.reset();
    test.client().capture("kept").distinct_id("u").send();
    test.assert_captured("kept").await;
}
