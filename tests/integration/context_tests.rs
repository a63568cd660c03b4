//! Request-scoped context behavior seen from application code.

use std::time::Duration;

use ambit::triage::{ErrorBoundary, capture_if_server_fault};
use ambit::{AnalyticsContext, Error};
use serde_json::json;

use crate::common::mock_client;

/// Stand-in for a request handler that tags and captures through its context.
async fn handle_request(ctx: AnalyticsContext, user: &str, items: u32) {
    ctx.identify(user);
    ctx.tag("route", "/checkout");
    tokio::task::yield_now().await;
    ctx.capture("checkout_completed").property("items", items).send();
}

#[tokio::test]
async fn test_concurrent_requests_do_not_share_identity() {
    let (client, transport) = mock_client().await.expect("client should build");

    let mut handles = Vec::new();
    for i in 0..20u32 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let guard = client.new_context();
            handle_request(guard.context(), &format!("user-{i}"), i).await;
        }));
    }
    for handle in handles {
        handle.await.expect("task should not panic");
    }
    client.flush().await;

    let events = transport.events_named("checkout_completed");
    assert_eq!(events.len(), 20);
    for event in events {
        let items = event.property("items").and_then(|v| v.as_u64()).expect("items set");
        assert_eq!(event.distinct_id(), Some(format!("user-{items}").as_str()));
        assert_eq!(event.property("route"), Some(&json!("/checkout")));
    }
}

#[tokio::test]
async fn test_subtasks_share_the_request_context() {
    let (client, transport) = mock_client().await.expect("client should build");
    let ctx = client.new_context();
    ctx.identify("user-1");

    let handle = ctx.context();
    tokio::spawn(async move {
        handle.tag("step", "background");
        handle.capture("background_job").send();
    })
    .await
    .expect("task should not panic");

    assert_eq!(ctx.tags().get("step"), Some(&json!("background")));
    client.flush().await;
    assert_eq!(transport.events_named("background_job")[0].distinct_id(), Some("user-1"));
}

#[tokio::test]
async fn test_released_context_captures_anonymously() {
    let (client, transport) = mock_client().await.expect("client should build");
    let guard = client.new_context();
    guard.identify("user-1");
    guard.tag("secret", "x");
    let handle = guard.context();
    drop(guard);

    handle.capture("late").send();
    client.flush().await;

    let event = &transport.events_named("late")[0];
    assert!(event.is_anonymous());
    assert!(event.property("secret").is_none());
}

#[tokio::test]
async fn test_cancelled_request_releases_context() {
    let (client, _) = mock_client().await.expect("client should build");
    let (tx, rx) = tokio::sync::oneshot::channel::<AnalyticsContext>();

    let task = tokio::spawn({
        let client = client.clone();
        async move {
            let guard = client.new_context();
            guard.identify("user-1");
            let _ = tx.send(guard.context());
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    });

    let ctx = rx.await.expect("context handed out");
    assert!(ctx.is_active());
    task.abort();
    let _ = task.await;

    assert!(!ctx.is_active());
    assert_eq!(ctx.distinct_id(), None);
}

#[tokio::test]
async fn test_triaged_exceptions() {
    let (client, transport) = mock_client().await.expect("client should build");
    let ctx = client.new_context();
    ctx.identify("user-5");
    ctx.tag("route", "/orders");

    assert!(capture_if_server_fault(&ctx, &Error::invalid_argument("page must be positive")).is_none());

    let boundary = ErrorBoundary::new(&ctx);
    let reported = boundary
        .run(async { Err::<(), _>(Error::unavailable("orders database unreachable")) })
        .await
        .expect_err("error passes through");
    let error_id = reported.error_id.expect("server faults are captured");

    client.flush().await;
    let exceptions = transport.events_named("$exception");
    assert_eq!(exceptions.len(), 1);
    let exception = &exceptions[0];
    assert_eq!(exception.distinct_id(), Some("user-5"));
    assert_eq!(exception.property("route"), Some(&json!("/orders")));
    assert_eq!(exception.property("$exception_id"), Some(&json!(error_id.as_str())));
    assert_eq!(exception.property("$exception_type"), Some(&json!("Error")));
    assert_eq!(exception.property("$exception_kind"), Some(&json!("Unavailable")));
}
