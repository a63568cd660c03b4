//! Common test harness for ambit integration tests.

use std::sync::{Arc, Once};
use std::time::Duration;

use ambit::{BatchConfig, Client, MockTransport, RetryConfig};
use anyhow::Result;
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use wiremock::MockServer;

/// Project key used by every test client.
pub const API_KEY: &str = "phc_integration";

static TRACING: Once = Once::new();

/// Installs a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
            .with_test_writer()
            .try_init();
    });
}

/// Batch settings that only deliver on explicit flush or shutdown.
pub fn manual_flush() -> BatchConfig {
    BatchConfig::builder().flush_at(10_000).flush_interval(Duration::from_secs(3600)).build()
}

/// Fast retries so failure tests do not sleep for long.
pub fn fast_retries() -> RetryConfig {
    RetryConfig::new()
        .with_max_retries(2)
        .with_initial_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(20))
        .with_jitter(0.0)
}

/// A client backed by the in-memory transport.
pub async fn mock_client() -> Result<(Client, Arc<MockTransport>)> {
    init_tracing();
    let transport = Arc::new(MockTransport::new());
    let client = Client::builder()
        .api_key(API_KEY)
        .batch_config(manual_flush())
        .transport(transport.clone())
        .build()
        .await?;
    Ok((client, transport))
}

/// A client using the REST transport against `server`.
pub async fn rest_client(server: &MockServer) -> Result<Client> {
    init_tracing();
    let client = Client::builder()
        .api_key(API_KEY)
        .host(server.uri())
        .batch_config(manual_flush())
        .retry_config(fast_retries())
        .timeout(Duration::from_secs(2))
        .build()
        .await?;
    Ok(client)
}

/// Parsed JSON bodies of every request the server received at `path`.
pub async fn bodies_at(server: &MockServer, path: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == path)
        .filter_map(|r| serde_json::from_slice(&r.body).ok())
        .collect()
}
