//! Incidental HTTP listener: a liveness endpoint behind a fixed-window rate
//! limit. It shares no state with the responder loop and serves no mail
//! logic.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tracing::info;

use crate::config::Config;

/// Fixed-window request throttle.
pub struct Throttle {
    max_requests: u32,
    window: Duration,
    window_start: Instant,
    seen: u32,
}

impl Throttle {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            window_start: Instant::now(),
            seen: 0,
        }
    }

    /// Count one request against the current window, opening a new window
    /// once the old one has elapsed.
    pub fn allow(&mut self, now: Instant) -> bool {
        if now.duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.seen = 0;
        }
        self.seen += 1;
        self.seen <= self.max_requests
    }
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn throttle_requests(
    State(throttle): State<Arc<Mutex<Throttle>>>,
    request: Request,
    next: Next,
) -> Response {
    let allowed = throttle
        .lock()
        .map(|mut t| t.allow(Instant::now()))
        .unwrap_or(false);
    if !allowed {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }
    next.run(request).await
}

pub fn routes(config: &Config) -> Router {
    let throttle = Arc::new(Mutex::new(Throttle::new(
        config.rate_limit_max_requests,
        Duration::from_secs(config.rate_limit_window_secs),
    )));

    Router::new()
        .route("/healthz", get(healthz))
        .layer(middleware::from_fn_with_state(throttle, throttle_requests))
}

/// Bind and serve until the process exits.
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let app = routes(config);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.listen_port)).await?;
    info!(port = config.listen_port, "health listener started");
    axum::serve(listener, app).await?;
    Ok(())
}
