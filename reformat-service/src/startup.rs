//! Application startup and lifecycle management.

use crate::config::ReformatConfig;
use crate::handlers;
use crate::services::TemplateStore;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::genai::{GeminiClient, GeminiConfig, TextProvider};
use service_core::middleware::{metrics_middleware, request_id_middleware};
use service_core::shutdown::shutdown_signal;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub templates: Arc<TemplateStore>,
    pub provider: Arc<dyn TextProvider>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/format-data", post(handlers::format_data))
        .route("/template", get(handlers::get_template))
        .route("/refresh-template", post(handlers::refresh_template))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the Gemini provider.
    ///
    /// Credentials come with each request, so the client carries no key.
    pub async fn build(config: ReformatConfig) -> Result<Self, AppError> {
        let gemini = GeminiClient::new(
            GeminiConfig::new(String::new()).with_base_url(config.gemini.api_base.clone()),
        )
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;

        Self::build_with(config, Arc::new(gemini)).await
    }

    /// Build the application around an explicit text provider.
    pub async fn build_with(
        config: ReformatConfig,
        provider: Arc<dyn TextProvider>,
    ) -> Result<Self, AppError> {
        let templates = Arc::new(TemplateStore::new(
            config.template.url.clone(),
            config.template.refresh,
        ));
        templates.initialize().await;
        if templates.spawn_refresh_task().is_some() {
            tracing::info!(policy = ?config.template.refresh, "Started template refresh task");
        }

        let state = AppState {
            templates,
            provider,
        };

        // Port 0 = random port for testing
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Reformat service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until SIGINT/SIGTERM.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);
        axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}
