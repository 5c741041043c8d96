//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the axum `Router` from the application's mounted routes
//! - Merge the admin API when enabled
//! - Wire up middleware (tracing, timeout, CORS, request ID)
//! - Run application startup, serve until shutdown, run application shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::app::Application;
use crate::http::response::not_found;
use crate::lifecycle::shutdown;

/// HTTP front of an [`Application`].
pub struct HttpServer {
    app: Arc<Application>,
    router: Router,
}

impl HttpServer {
    /// Create a server for an application whose units are already loaded.
    pub fn new(app: Arc<Application>) -> Self {
        let router = Self::build_router(&app);
        Self { app, router }
    }

    /// Router with every layer applied.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(app: &Arc<Application>) -> Router {
        let config = app.config();

        let mut router = app.router().fallback(not_found);
        if config.admin.enabled {
            router = router.merge(setup_admin_router(app.clone()));
        }

        router
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.request_timeout_secs,
            )))
            .layer(cors_layer(&config.allow_origins))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run startup hooks, serve until `shutdown_rx` fires, then run
    /// shutdown hooks.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let startup = self.app.startup().await;

        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            units = startup.total,
            degraded = startup.failed,
            routes = self.app.routes().len(),
            "HTTP server starting"
        );

        let service = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, service)
            .with_graceful_shutdown(shutdown::wait(shutdown_rx))
            .await?;

        tracing::info!("HTTP server stopped");
        self.app.shutdown().await;
        Ok(())
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}
