//! HTTP server implementation using Axum.

use axum::http::{HeaderValue, header};
use axum::{Router, routing::{get, post}};
use scorehall_core::ScoreHallConfig;
use scorehall_platform::Platform;
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub platform: Arc<Platform>,
    /// Host the billing report is served on.
    pub admin_hostname: String,
}

impl AppState {
    pub fn new(platform: Arc<Platform>, config: &ScoreHallConfig) -> Self {
        Self { platform, admin_hostname: config.auth.admin_hostname.clone() }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/initialize", post(super::routes::initialize))
        .route("/api/admin/tenants/add", post(super::routes::tenants_add))
        .route("/api/admin/tenants/billing", get(super::routes::tenants_billing))
        .route("/api/me", get(super::routes::me))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("private"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Start the HTTP server and run until Ctrl-C.
pub async fn start(config: &ScoreHallConfig, platform: Arc<Platform>) -> anyhow::Result<()> {
    let app = build_router(AppState::new(platform, config));
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Gateway server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("failed to listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
            tracing::info!("⏹ Shutting down gateway");
        })
        .await?;
    Ok(())
}
