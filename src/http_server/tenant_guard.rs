//! # Tenant Guard Middleware
//!
//! Resolves the tenant from the `x-tenant-id` header before a request reaches
//! the throttle. Requests without a valid tenant are rejected with 400 and
//! never consume admission capacity.

use axum::{
    body::Body,
    http::{HeaderName, Request, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use serde::Serialize;

use crate::middleware::{FromHeader, TenantResolver};

/// Header carrying the tenant UUID
pub const TENANT_HEADER: &str = "x-tenant-id";

#[derive(Debug, Serialize)]
pub struct TenantRequiredResponse {
    pub error: &'static str,
    pub code: &'static str,
}

impl TenantRequiredResponse {
    pub fn new() -> Self {
        Self {
            error: "Missing or invalid x-tenant-id header.",
            code: "TENANT_REQUIRED",
        }
    }
}

impl Default for TenantRequiredResponse {
    fn default() -> Self {
        Self::new()
    }
}

/// Inserts the resolved [`crate::tenant::TenantId`] into the request extensions
pub async fn require_tenant(
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, Json<TenantRequiredResponse>)> {
    let resolver = FromHeader(HeaderName::from_static(TENANT_HEADER));
    let Some(tenant) = resolver.resolve(request.headers(), request.extensions()) else {
        return Err((StatusCode::BAD_REQUEST, Json(TenantRequiredResponse::new())));
    };

    request.extensions_mut().insert(tenant);
    Ok(next.run(request).await)
}
