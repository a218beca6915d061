//! API server: router assembly plus the HTTP and metrics listeners.

use std::net::SocketAddr;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use liyaqa_core::config::AppConfig;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::rest::{self, AppState};
use crate::{
    auth, billing_rest, directory_rest, marketing_rest, organization_rest, platform_rest, shop_rest, team_rest,
};

/// Builds the full router: public, tenant (API key) and platform (admin
/// token) routes.
pub fn build_router(state: AppState) -> Router {
    let tenant = Router::new()
        .merge(marketing_rest::routes())
        .merge(directory_rest::routes())
        .merge(shop_rest::routes())
        .merge(billing_rest::routes())
        .merge(organization_rest::routes())
        .merge(team_rest::routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key));

    let platform = platform_rest::routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_platform_admin,
    ));

    Router::new()
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        .merge(marketing_rest::public_routes())
        .merge(team_rest::public_routes())
        .merge(tenant)
        .merge(platform)
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Main API server.
pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: AppConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = build_router(self.state.clone());
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the Prometheus exporter on the metrics port.
    pub fn start_metrics(&self) -> anyhow::Result<()> {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
