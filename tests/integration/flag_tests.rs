//! Feature flag resolution through the public client API.

use std::collections::HashSet;

use ambit::flags::{DecideResponse, FlagDefinitions};
use ambit::testing::TestClient;
use ambit::{FlagConfig, FlagValue, Properties};
use serde_json::{Value, json};

fn definitions(value: Value) -> FlagDefinitions {
    serde_json::from_value(value).expect("definitions should parse")
}

fn props(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => Properties::new(),
    }
}

async fn test_client() -> TestClient {
    TestClient::with_builder(|b| {
        b.personal_api_key("phx_test")
            .flag_config(FlagConfig::builder().send_flag_called_events(false).build())
    })
    .await
    .expect("client should build")
}

fn experiment() -> FlagDefinitions {
    definitions(json!({
        "flags": [{
            "key": "pricing-page",
            "active": true,
            "filters": {
                "groups": [
                    {"properties": [{"key": "email", "value": "@acme.com", "operator": "icontains", "type": "person"}],
                     "rollout_percentage": 100, "variant": "test"},
                    {"properties": [], "rollout_percentage": 100}
                ],
                "multivariate": {"variants": [
                    {"key": "control", "rollout_percentage": 50},
                    {"key": "test", "rollout_percentage": 50}
                ]},
                "payloads": {"control": "{\"price\": 10}", "test": "{\"price\": 12}"}
            }
        }, {
            "key": "retired",
            "active": false,
            "filters": {"groups": [{"properties": [], "rollout_percentage": 100}]}
        }]
    }))
}

#[tokio::test]
async fn test_variants_are_sticky_and_distributed() {
    let test = test_client().await;
    test.set_flag_definitions(experiment()).await;
    let client = test.client();

    let mut seen = HashSet::new();
    for i in 0..200 {
        let user = format!("user-{i}");
        let first = client.flag_value("pricing-page", &user, &Properties::new()).await;
        let second = client.flag_value("pricing-page", &user, &Properties::new()).await;
        assert_eq!(first, second, "variant for {user} changed between reads");
        if let FlagValue::Variant(variant) = first {
            seen.insert(variant);
        }
    }

    assert_eq!(seen, HashSet::from(["control".to_string(), "test".to_string()]));
    assert!(test.transport().decide_requests().is_empty());
}

#[tokio::test]
async fn test_condition_variant_override() {
    let test = test_client().await;
    test.set_flag_definitions(experiment()).await;

    for i in 0..20 {
        let value = test
            .client()
            .flag_value("pricing-page", &format!("staff-{i}"), &props(json!({"email": "dev@ACME.com"})))
            .await;
        assert_eq!(value, FlagValue::Variant("test".into()));
    }
}

#[tokio::test]
async fn test_payload_follows_variant() {
    let test = test_client().await;
    test.set_flag_definitions(experiment()).await;
    let client = test.client();

    for i in 0..20 {
        let user = format!("user-{i}");
        let value = client.flag_value("pricing-page", &user, &Properties::new()).await;
        let payload = client.flag_payload("pricing-page", &user).await;
        let expected = match value.variant() {
            Some("control") => Some(json!({"price": 10})),
            Some("test") => Some(json!({"price": 12})),
            _ => None,
        };
        assert!(expected.is_some(), "unexpected value {value:?} for {user}");
        assert_eq!(payload, expected);
    }
}

#[tokio::test]
async fn test_inactive_flag_is_disabled() {
    let test = test_client().await;
    test.set_flag_definitions(experiment()).await;

    assert!(!test.client().flag_enabled("retired", "user-1", &Properties::new()).await);
    assert!(test.client().flag_payload("retired", "user-1").await.is_none());
    assert!(test.transport().decide_requests().is_empty());
}

#[tokio::test]
async fn test_missing_property_falls_back_to_remote() {
    let test = test_client().await;
    test.set_flag_definitions(definitions(json!({
        "flags": [{
            "key": "enterprise-export",
            "filters": {"groups": [{
                "properties": [{"key": "seats", "value": 50, "operator": "gte", "type": "person"}],
                "rollout_percentage": 100
            }]}
        }]
    })))
    .await;
    let decide: DecideResponse = serde_json::from_value(json!({
        "featureFlags": {"enterprise-export": true}
    }))
    .expect("decide response should parse");
    test.set_decide_response("user-1", decide);

    let client = test.client();

    // Supplied property: settled locally.
    assert!(client.flag_enabled("enterprise-export", "user-2", &props(json!({"seats": 75}))).await);
    assert!(!client.flag_enabled("enterprise-export", "user-3", &props(json!({"seats": 5}))).await);
    assert!(test.transport().decide_requests().is_empty());

    // Missing property: the backend decides.
    assert!(client.flag_enabled("enterprise-export", "user-1", &Properties::new()).await);
    let requests = test.transport().decide_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].distinct_id, "user-1");
}

#[tokio::test]
async fn test_context_flags_use_tags_as_person_properties() {
    let test = test_client().await;
    test.set_flag_definitions(definitions(json!({
        "flags": [{
            "key": "beta-reports",
            "filters": {"groups": [{
                "properties": [{"key": "plan", "value": "pro", "type": "person"}],
                "rollout_percentage": 100
            }],
            "payloads": {"true": "{\"export\": \"pdf\"}"}}
        }]
    })))
    .await;

    let ctx = test.client().new_context();
    ctx.identify("user-1");
    ctx.tag("plan", "pro");
    assert!(ctx.flag_enabled("beta-reports").await);
    assert_eq!(ctx.flag_payload("beta-reports").await, Some(json!({"export": "pdf"})));
    assert!(test.transport().decide_requests().is_empty());

    ctx.tag("plan", "free");
    assert!(!ctx.flag_enabled("beta-reports").await);

    // Flag reads never change the context.
    assert_eq!(ctx.tags().len(), 1);
    assert_eq!(ctx.distinct_id().as_deref(), Some("user-1"));
}

#[tokio::test]
async fn test_reload_picks_up_new_definitions() {
    let test = test_client().await;
    test.set_flag_definitions(experiment()).await;
    assert_eq!(test.client().local_flag_count(), 2);

    test.set_flag_definitions(FlagDefinitions::default()).await;
    assert_eq!(test.client().local_flag_count(), 0);
}
