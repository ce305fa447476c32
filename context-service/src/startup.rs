//! Application startup and lifecycle management.

use crate::config::ContextConfig;
use crate::handlers;
use crate::services::{build_storage, CacheSettings, ContextCache, Storage};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use service_core::error::AppError;
use service_core::genai::{GeminiClient, GeminiConfig, GenAiProvider};
use service_core::middleware::{metrics_middleware, request_id_middleware};
use service_core::shutdown::shutdown_signal;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ContextCache>,
}

impl AppState {
    /// Assemble the context cache from configuration and collaborators.
    pub fn new(
        config: &ContextConfig,
        storage: Arc<dyn Storage>,
        provider: Arc<dyn GenAiProvider>,
    ) -> Self {
        let settings = CacheSettings {
            model: config.cache.model.clone(),
            ttl: Duration::from_secs(config.cache.ttl_seconds),
            object_key: config.storage.object_key.clone(),
            scratch_dir: PathBuf::from(&config.cache.scratch_dir),
            display_name: config.cache.display_name.clone(),
        };

        let cache = ContextCache::new(settings, storage, provider)
            .with_initial_handle(config.cache.initial_name.clone());

        Self {
            cache: Arc::new(cache),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/load-context", post(handlers::load_context))
        .route("/delete-context", delete(handlers::delete_context))
        .route("/find-match", post(handlers::find_match))
        .route("/context", get(handlers::context_status))
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
    /// Build the application with the Gemini provider and configured storage.
    pub async fn build(config: ContextConfig) -> Result<Self, AppError> {
        let storage = build_storage(&config.storage).await?;

        let gemini = GeminiClient::new(
            GeminiConfig::new(config.google.api_key.clone())
                .with_base_url(config.google.api_base.clone()),
        )
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;
        tracing::info!(model = %config.cache.model, "Initialized Gemini provider");

        Self::build_with(config, storage, Arc::new(gemini)).await
    }

    /// Build the application around explicit collaborators.
    pub async fn build_with(
        config: ContextConfig,
        storage: Arc<dyn Storage>,
        provider: Arc<dyn GenAiProvider>,
    ) -> Result<Self, AppError> {
        let state = AppState::new(&config, storage, provider);
        if let Some(handle) = state.cache.current().await {
            tracing::info!(handle = %handle, "Adopted context cache from configuration");
        }

        // Port 0 = random port for testing
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Context service listening on port {}", port);

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
