//! The shard's RPC surface and metrics endpoint.
//!
//! Three unary operations over HTTP/JSON. Operation failures are reported
//! in-band (`success = false` with a human-readable message) with the
//! transport status left OK; a missing key is `found = false`, not an
//! error. The server never panics on input.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::warn;

use kura_core::metrics::{Method, Metrics, Status};
use kura_storage::Engine;

// ========== API Types ==========

#[derive(Debug, Serialize, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetRequest {
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetResponse {
    pub found: bool,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

// ========== Server State ==========

pub struct AppState {
    pub engine: Arc<Engine>,
    pub metrics: Metrics,
    pub shard_id: u32,
}

// ========== Routes ==========

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/set", post(set_key))
        .route("/get", post(get_key))
        .route("/delete", post(delete_key))
        .with_state(state)
}

/// Separate router served on the metrics port.
pub fn create_metrics_router(metrics: Metrics) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics)
}

async fn health() -> &'static str {
    "ok"
}

async fn render_metrics(State(metrics): State<Metrics>) -> String {
    metrics.render()
}

async fn set_key(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetRequest>,
) -> Json<SetResponse> {
    let start = Instant::now();
    let result = state
        .engine
        .put(Bytes::from(req.key), Bytes::from(req.value));
    state
        .metrics
        .observe_latency(Method::Set, start.elapsed().as_secs_f64());

    match result {
        Ok(()) => {
            state.metrics.record_request(Method::Set, Status::Success);
            Json(SetResponse {
                success: true,
                message: String::new(),
            })
        }
        Err(e) => {
            warn!(shard = state.shard_id, code = e.error_code(), "Set failed: {e}");
            state.metrics.record_request(Method::Set, Status::Error);
            Json(SetResponse {
                success: false,
                message: e.to_string(),
            })
        }
    }
}

async fn get_key(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GetRequest>,
) -> Json<GetResponse> {
    let start = Instant::now();
    let result = state.engine.get(req.key.as_bytes());
    state
        .metrics
        .observe_latency(Method::Get, start.elapsed().as_secs_f64());

    match result {
        Ok(Some(value)) => {
            state.metrics.record_request(Method::Get, Status::Success);
            Json(GetResponse {
                found: true,
                value: String::from_utf8_lossy(&value).into_owned(),
                message: String::new(),
            })
        }
        Ok(None) => {
            state.metrics.record_request(Method::Get, Status::NotFound);
            Json(GetResponse {
                found: false,
                value: String::new(),
                message: String::new(),
            })
        }
        Err(e) => {
            warn!(shard = state.shard_id, code = e.error_code(), "Get failed: {e}");
            state.metrics.record_request(Method::Get, Status::Error);
            Json(GetResponse {
                found: false,
                value: String::new(),
                message: e.to_string(),
            })
        }
    }
}

async fn delete_key(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeleteRequest>,
) -> Json<DeleteResponse> {
    let start = Instant::now();
    let result = state.engine.delete(Bytes::from(req.key));
    state
        .metrics
        .observe_latency(Method::Delete, start.elapsed().as_secs_f64());

    match result {
        Ok(()) => {
            state.metrics.record_request(Method::Delete, Status::Success);
            Json(DeleteResponse {
                success: true,
                message: String::new(),
            })
        }
        Err(e) => {
            warn!(shard = state.shard_id, code = e.error_code(), "Delete failed: {e}");
            state.metrics.record_request(Method::Delete, Status::Error);
            Json(DeleteResponse {
                success: false,
                message: e.to_string(),
            })
        }
    }
}
