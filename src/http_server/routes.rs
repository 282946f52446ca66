//! # Routes
//!
//! - `GET /work`: throttled demo workload, tenant from `x-tenant-id`
//! - `GET /stats`: throttle accounting snapshot
//! - `GET /health`: liveness, never throttled

use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{Extensions, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use super::tenant_guard::require_tenant;
use crate::middleware::ThrottleLayer;
use crate::queue_wait::QueueWait;
use crate::tenant::TenantId;
use crate::throttle::{Throttle, ThrottleStats};

/// Upper bound on the simulated work per request
const MAX_SLEEP_MS: u64 = 60_000;

#[derive(Debug, Default, Deserialize)]
pub struct WorkParams {
    /// Simulated handler time
    #[serde(default)]
    pub sleep_ms: u64,
    /// Status code to answer with, 200 when absent
    pub status: Option<u16>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkResponse {
    pub tenant_id: TenantId,
    pub queue_wait_ms: u64,
    pub slept_ms: u64,
}

#[derive(Debug, Serialize)]
struct BadRequestResponse {
    error: String,
    code: &'static str,
}

fn bad_request(error: String) -> Response {
    let body = BadRequestResponse {
        error,
        code: "BAD_REQUEST",
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

/// Build the full route table. The tenant guard runs before the throttle.
pub fn routes(throttle: Throttle) -> Router {
    let throttled: Router = Router::new()
        .route("/work", get(work))
        .layer(ThrottleLayer::new(throttle.clone()))
        .layer(middleware::from_fn(require_tenant));

    Router::new()
        .route("/stats", get(stats))
        .route("/health", get(health))
        .with_state(throttle)
        .merge(throttled)
}

async fn work(
    Query(params): Query<WorkParams>,
    Extension(tenant): Extension<TenantId>,
    extensions: Extensions,
) -> Response {
    let status = match params.status.map(StatusCode::from_u16) {
        None => StatusCode::OK,
        Some(Ok(status)) => status,
        Some(Err(_)) => return bad_request(format!("Invalid status: {:?}", params.status)),
    };
    if params.sleep_ms > MAX_SLEEP_MS {
        return bad_request(format!("sleep_ms must be at most {}", MAX_SLEEP_MS));
    }

    tokio::time::sleep(Duration::from_millis(params.sleep_ms)).await;

    let body = WorkResponse {
        tenant_id: tenant,
        queue_wait_ms: QueueWait::from_extensions(&extensions).as_millis() as u64,
        slept_ms: params.sleep_ms,
    };
    (status, Json(body)).into_response()
}

async fn stats(State(throttle): State<Throttle>) -> Json<ThrottleStats> {
    Json(throttle.stats())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
