//! HTTP + WebSocket control surface: `POST /audit` starts a run, `GET
//! /health`/`GET /status` report process-level state, `GET /ws` streams the
//! event bus.
//!
//! The teacher's own `cli.rs::run_server` was a stub ("Server mode not yet
//! implemented"); this is grounded instead on the `axum` router/handler
//! shape used across the pack's service manifests (`foofork-riptidecrawler`,
//! `huisnotacouncillor-momentum-backend`): a `Router` built from an
//! `Arc`-wrapped shared state, JSON in/out via `axum::Json`, and a
//! `ws.on_upgrade(...)` handler spawning a per-connection forwarding task.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AuditError;
use crate::events::{Delivery, EventBus};
use crate::health::{HealthThresholds, SystemHealthChecker};
use crate::run::RunManager;

const SERVICE_NAME: &str = "site-auditor";
const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");
const FEATURES: &[&str] = &[
    "sitemap-crawl",
    "performance-audit",
    "accessibility-audit",
    "seo-audit",
    "content-weight-audit",
    "mobile-audit",
    "websocket-events",
];

#[derive(Clone)]
struct AppState {
    runs: RunManager,
    bus: EventBus,
    checker: SystemHealthChecker,
    started_requests: Arc<AtomicUsize>,
}

pub fn build_router(runs: RunManager, bus: EventBus) -> Router {
    let state = AppState {
        checker: SystemHealthChecker::new(runs.clone(), HealthThresholds::default()),
        runs,
        bus,
        started_requests: Arc::new(AtomicUsize::new(0)),
    };

    Router::new()
        .route("/audit", post(start_audit))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/ws", get(websocket_upgrade))
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetail {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

fn error_response(status: StatusCode, code: &'static str, message: String) -> Response {
    (
        status,
        Json(ErrorBody {
            error: ErrorDetail {
                code,
                message,
                details: None,
            },
        }),
    )
        .into_response()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuditStartedBody {
    run_id: String,
    status: &'static str,
    sitemap_url: Option<String>,
    configuration: Config,
    timestamp: chrono::DateTime<chrono::Utc>,
}

/// `POST /audit`: validates the body as a `Configuration` (spec.md §3),
/// starts a run, and returns immediately. 400 on missing `sitemapUrl`/`urls`
/// or a malformed include/exclude regex; 500 if the browser pool fails to
/// launch.
async fn start_audit(
    State(state): State<AppState>,
    Json(config): Json<Config>,
) -> Response {
    state.started_requests.fetch_add(1, Ordering::Relaxed);

    match state.runs.start(config.clone()).await {
        Ok(handle) => {
            info!("started run {}", handle.run_id);
            Json(AuditStartedBody {
                run_id: handle.run_id,
                status: "started",
                sitemap_url: config.sitemap_url.clone(),
                configuration: config,
                timestamp: chrono::Utc::now(),
            })
            .into_response()
        }
        Err(e @ AuditError::ConfigError(_)) => {
            error_response(StatusCode::BAD_REQUEST, "INVALID_REQUEST", e.to_string())
        }
        Err(e @ AuditError::SitemapFetchError(_)) => {
            error_response(StatusCode::BAD_REQUEST, "INVALID_SITEMAP", e.to_string())
        }
        Err(e) => {
            warn!("failed to start run: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", e.to_string())
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthBody {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
    active_runs: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    let status = state.checker.check_system_health();
    Json(HealthBody {
        status: status.overall.as_wire_str(),
        timestamp: chrono::Utc::now(),
        active_runs: status.active_runs,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    service: &'static str,
    version: &'static str,
    features: &'static [&'static str],
    active_runs: usize,
    timestamp: chrono::DateTime<chrono::Utc>,
}

async fn status(State(state): State<AppState>) -> Json<StatusBody> {
    Json(StatusBody {
        service: SERVICE_NAME,
        version: SERVICE_VERSION,
        features: FEATURES,
        active_runs: state.runs.active_runs(),
        timestamp: chrono::Utc::now(),
    })
}

#[derive(Serialize)]
struct ConnectionAck {
    #[serde(rename = "type")]
    kind: &'static str,
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
}

async fn websocket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| forward_events(socket, state.bus))
}

/// Forwards every bus event to one WebSocket connection as a JSON text
/// frame, until the client disconnects or its channel is pruned.
async fn forward_events(mut socket: WebSocket, bus: EventBus) {
    let ack = serde_json::to_string(&ConnectionAck {
        kind: "connection",
        status: "connected",
        timestamp: chrono::Utc::now(),
    })
    .expect("ConnectionAck always serializes");
    if socket.send(Message::Text(ack)).await.is_err() {
        return;
    }

    let (subscriber_id, mut rx) = bus.subscribe();
    while let Some(delivery) = rx.recv().await {
        let text = match &delivery {
            Delivery::Event(event) => serde_json::to_string(event),
            Delivery::Lagged(lagged) => serde_json::to_string(lagged),
        };
        let text = match text {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to serialize event for websocket client: {e}");
                continue;
            }
        };
        if socket.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
    bus.unsubscribe(subscriber_id);
}
