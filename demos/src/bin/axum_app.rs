//! Axum web framework integration demo.
//!
//! This demo gives every request its own analytics context through a
//! middleware, so handlers capture events and read flags for the right user
//! without passing ids around.
//!
//! # Running
//!
//! ```bash
//! export POSTHOG_API_KEY="phc_..."
//! export POSTHOG_PERSONAL_API_KEY="phx_..."   # optional, enables local flags
//! export RUST_LOG="ambit=debug,axum_app=debug"
//!
//! cargo run -p ambit-demos --bin axum_app
//! ```
//!
//! Then try:
//! ```bash
//! curl -H 'x-user-id: user-1' http://localhost:3000/dashboard
//! curl -X POST -b 'session_user=user-2' http://localhost:3000/burritos \
//!      -H 'content-type: application/json' -d '{"filling": "carnitas", "size": "large"}'
//! curl -H 'x-user-id: user-1' http://localhost:3000/orders/0     # client fault, not captured
//! curl -H 'x-user-id: user-1' http://localhost:3000/orders/500   # server fault, Reference ID
//! ```

use std::net::SocketAddr;

use ambit::prelude::*;
use ambit::triage::Reported;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// Header carrying the caller's id, set by an upstream gateway.
const USER_HEADER: &str = "x-user-id";

/// Cookie carrying the signed-in user for browser sessions.
const SESSION_COOKIE: &str = "session_user";

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    analytics: Client,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // POSTHOG_DISABLED=1 runs the demo without a project.
    let settings = Settings::from_env()?;
    let analytics = Client::from_settings(&settings).await?;

    let state = AppState { analytics: analytics.clone() };

    let app = Router::new()
        .route("/dashboard", get(dashboard))
        .route("/burritos", post(consider_burrito))
        .route("/orders/{id}", get(show_order))
        .route("/health", get(health_check))
        .layer(middleware::from_fn_with_state(state.clone(), analytics_context))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!(%addr, "server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // Deliver whatever is still queued before exiting.
    analytics.shutdown().await;
    Ok(())
}

/// Opens an analytics context for the request and releases it when the
/// response is produced or the request is dropped.
async fn analytics_context(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let guard = state.analytics.new_context();
    if let Some(user) = user_id(request.headers(), &jar) {
        guard.identify(user);
    }
    guard.tag("$current_url", request.uri().path().to_string());
    guard.tag("$request_method", request.method().as_str().to_string());

    request.extensions_mut().insert(guard.context());
    next.run(request).await
}

/// The header wins over the session cookie.
fn user_id(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    let from_header = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(user) = from_header {
        return Some(user.to_string());
    }

    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Serves the new dashboard to users in the `new-dashboard` rollout.
async fn dashboard(Extension(ctx): Extension<AnalyticsContext>) -> impl IntoResponse {
    let layout = if ctx.flag_enabled("new-dashboard").await {
        let settings = ctx.flag_payload("new-dashboard").await.unwrap_or_else(|| json!({}));
        json!({"layout": "new", "settings": settings})
    } else {
        json!({"layout": "classic"})
    };

    ctx.capture("dashboard_viewed").property("layout", layout["layout"].clone()).send();
    Json(layout)
}

#[derive(Debug, Deserialize)]
struct BurritoOrder {
    filling: String,
    #[serde(default)]
    size: Option<String>,
}

/// Records interest in a burrito.
async fn consider_burrito(
    Extension(ctx): Extension<AnalyticsContext>,
    Json(order): Json<BurritoOrder>,
) -> impl IntoResponse {
    ctx.tag("filling", order.filling.clone());
    let event_id = ctx
        .capture("burrito_considered")
        .property("filling", order.filling)
        .property("size", order.size.unwrap_or_else(|| "regular".to_string()))
        .send();

    let body = json!({
        "recorded": event_id.is_some(),
        "event_id": event_id.map(|id| id.to_string()),
    });
    (StatusCode::ACCEPTED, Json(body))
}

/// Looks up an order. Bad ids are the caller's fault; id 500 simulates an
/// outage in the order store.
async fn show_order(
    Extension(ctx): Extension<AnalyticsContext>,
    Path(id): Path<u64>,
) -> std::result::Result<impl IntoResponse, AppError> {
    let boundary = ErrorBoundary::new(&ctx);
    let order = boundary.run(load_order(id)).await?;
    Ok(Json(order))
}

async fn load_order(id: u64) -> Result<serde_json::Value> {
    match id {
        0 => Err(Error::invalid_argument("order ids start at 1")),
        500 => Err(Error::unavailable("order store unreachable")),
        id => Ok(json!({"id": id, "items": ["carnitas burrito"], "status": "delivered"})),
    }
}

/// Health check endpoint (no context needed)
async fn health_check() -> impl IntoResponse {
    "OK"
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Handling
// ─────────────────────────────────────────────────────────────────────────────

/// Application error carrying the correlation id of captured failures.
struct AppError(Reported<Error>);

impl From<Reported<Error>> for AppError {
    fn from(reported: Reported<Error>) -> Self {
        AppError(reported)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let Reported { error, error_id } = self.0;
        match error_id {
            // Server faults: hide details, hand out the reference for support.
            Some(id) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Something went wrong. Reference ID: {id}"),
            )
                .into_response(),
            None => {
                let status = match error.kind() {
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
                    ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, error.to_string()).into_response()
            },
        }
    }
}
