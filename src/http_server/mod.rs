//! # HTTP Server
//!
//! Axum front end for the throttle. Every request is traced; only `/work`
//! goes through the tenant guard and admission control.

mod routes;
mod tenant_guard;

pub use routes::{routes, WorkParams, WorkResponse};
pub use tenant_guard::{require_tenant, TenantRequiredResponse, TENANT_HEADER};

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::throttle::Throttle;

pub struct HttpServer {
    config: ServerConfig,
    throttle: Throttle,
}

impl HttpServer {
    pub fn new(config: ServerConfig, throttle: Throttle) -> Self {
        Self { config, throttle }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind, self.config.port)
    }

    pub fn router(&self) -> Router {
        routes(self.throttle.clone()).layer(TraceLayer::new_for_http())
    }

    /// Bind and serve until Ctrl-C
    pub async fn start(self) -> std::io::Result<()> {
        let addr = self.addr();
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "HTTP server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::ThrottleConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[test]
    fn test_addr() {
        let throttle = Throttle::new(ThrottleConfig::default()).unwrap();
        let server = HttpServer::new(ServerConfig::default(), throttle);
        assert_eq!(server.addr().to_string(), "127.0.0.1:8080");
    }

    #[tokio::test]
    async fn test_traced_router_serves_health() {
        let throttle = Throttle::new(ThrottleConfig::default()).unwrap();
        let server = HttpServer::new(ServerConfig::default(), throttle);
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = server.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
