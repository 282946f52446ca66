//! # Throttle Middleware
//!
//! Tower layer that runs every request through a [`Throttle`].
//!
//! - The tenant must already be resolved upstream (see [`TenantResolver`])
//! - A [`CancellationToken`] in the request extensions is the caller's context;
//!   dropping the response future counts as cancellation too
//! - Rejections become `429 Too Many Requests` with an optional `Retry-After`
//! - Admitted requests carry a [`QueueWait`] extension downstream

use std::str::FromStr;
use std::task::{Context, Poll};

use axum::{
    http::{header, Extensions, HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};
use tracing::error;

use crate::queue_wait::QueueWait;
use crate::tenant::TenantId;
use crate::throttle::{Rejection, Throttle};

/// Resolves the tenant of a request. Runs before admission.
pub trait TenantResolver: Clone + Send + Sync + 'static {
    fn resolve(&self, headers: &HeaderMap, extensions: &Extensions) -> Option<TenantId>;
}

impl<F> TenantResolver for F
where
    F: Fn(&HeaderMap, &Extensions) -> Option<TenantId> + Clone + Send + Sync + 'static,
{
    fn resolve(&self, headers: &HeaderMap, extensions: &Extensions) -> Option<TenantId> {
        (self)(headers, extensions)
    }
}

/// Reads a [`TenantId`] inserted into the extensions by an earlier layer
#[derive(Debug, Clone, Copy, Default)]
pub struct FromExtension;

impl TenantResolver for FromExtension {
    fn resolve(&self, _headers: &HeaderMap, extensions: &Extensions) -> Option<TenantId> {
        extensions.get::<TenantId>().copied()
    }
}

/// Parses a UUID tenant ID from a request header
#[derive(Debug, Clone)]
pub struct FromHeader(pub HeaderName);

impl TenantResolver for FromHeader {
    fn resolve(&self, headers: &HeaderMap, _extensions: &Extensions) -> Option<TenantId> {
        headers
            .get(&self.0)
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| TenantId::from_str(raw).ok())
    }
}

/// JSON body returned with a throttle rejection
#[derive(Debug, Serialize)]
pub struct ThrottleErrorResponse {
    pub error: String,
    pub code: &'static str,
}

/// Build the HTTP response for a rejection
pub fn rejection_response(throttle: &Throttle, rejection: Rejection) -> Response {
    let status = StatusCode::from_u16(rejection.status_code())
        .unwrap_or(StatusCode::TOO_MANY_REQUESTS);
    let body = ThrottleErrorResponse {
        error: rejection.to_string(),
        code: rejection.code(),
    };

    let mut response = (status, Json(body)).into_response();
    if let Some(retry_after) = throttle.retry_after(rejection) {
        response.headers_mut().insert(
            header::RETRY_AFTER,
            HeaderValue::from(retry_after.as_secs()),
        );
    }
    response
}

fn unresolved_tenant_response() -> Response {
    let body = ThrottleErrorResponse {
        error: "Tenant could not be resolved for this request.".to_string(),
        code: "TENANT_UNRESOLVED",
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

/// Layer producing [`ThrottleService`]
#[derive(Debug, Clone)]
pub struct ThrottleLayer<R = FromExtension> {
    throttle: Throttle,
    resolver: R,
}

impl ThrottleLayer<FromExtension> {
    pub fn new(throttle: Throttle) -> Self {
        Self {
            throttle,
            resolver: FromExtension,
        }
    }
}

impl<R> ThrottleLayer<R> {
    /// Replace the tenant resolver
    pub fn with_resolver<R2: TenantResolver>(self, resolver: R2) -> ThrottleLayer<R2> {
        ThrottleLayer {
            throttle: self.throttle,
            resolver,
        }
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }
}

impl<S, R: Clone> Layer<S> for ThrottleLayer<R> {
    type Service = ThrottleService<S, R>;

    fn layer(&self, inner: S) -> Self::Service {
        ThrottleService {
            inner,
            throttle: self.throttle.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

/// Service wrapping `S` with admission control
#[derive(Debug, Clone)]
pub struct ThrottleService<S, R = FromExtension> {
    inner: S,
    throttle: Throttle,
    resolver: R,
}

impl<S, R, B> Service<Request<B>> for ThrottleService<S, R>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Response: IntoResponse,
    S::Future: Send + 'static,
    R: TenantResolver,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        // Keep the service that was polled ready; leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let throttle = self.throttle.clone();
        let tenant = self.resolver.resolve(req.headers(), req.extensions());
        let cancel = req.extensions().get::<CancellationToken>().cloned();

        Box::pin(async move {
            let Some(tenant) = tenant else {
                error!(uri = %req.uri(), "throttle invoked without a resolved tenant");
                return Ok(unresolved_tenant_response());
            };

            let admission = match throttle.admit(tenant, cancel.as_ref()).await {
                Ok(admission) => admission,
                Err(rejection) => return Ok(rejection_response(&throttle, rejection)),
            };

            req.extensions_mut()
                .insert(QueueWait::new(admission.queue_wait()));
            let response = inner.call(req).await;
            drop(admission);

            response.map(IntoResponse::into_response)
        })
    }
}
