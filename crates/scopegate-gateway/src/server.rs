//! Gateway server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::FromRef,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, patch},
};
use scopegate_auth::AuthGuard;
use serde_json::{Value, json};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::GatewayError;
use crate::config::GatewayConfig;
use crate::drinks::{self, DrinkStore};
use crate::error::ApiError;

/// State shared across handlers.
#[derive(Debug, Clone, FromRef)]
pub struct GatewayState {
    /// Authorization pipeline.
    pub guard: AuthGuard,
    /// Drinks resource.
    pub drinks: Arc<DrinkStore>,
}

impl GatewayState {
    /// State with an empty drinks store.
    #[must_use]
    pub fn new(guard: AuthGuard) -> Self {
        Self {
            guard,
            drinks: Arc::new(DrinkStore::new()),
        }
    }
}

/// Gateway server.
#[derive(Debug)]
pub struct Gateway {
    config: GatewayConfig,
    state: GatewayState,
}

impl Gateway {
    /// Validate `config` and build the auth guard it describes.
    ///
    /// # Errors
    ///
    /// Returns error if gateway or auth settings are missing or invalid.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let guard = AuthGuard::from_config(&config.auth)?;
        Ok(Self::with_state(config, GatewayState::new(guard)))
    }

    /// Use pre-built state.
    #[must_use]
    pub const fn with_state(config: GatewayConfig, state: GatewayState) -> Self {
        Self { config, state }
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Shared handler state.
    #[must_use]
    pub const fn state(&self) -> &GatewayState {
        &self.state
    }

    /// The full router with middleware applied.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), &self.config)
    }

    /// Warm the key set, bind, and serve until Ctrl-C.
    ///
    /// A key-set fetch failure here is logged, not fatal; the first
    /// request retries it.
    ///
    /// # Errors
    ///
    /// Returns error if the address is invalid or the listener fails.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let resolver = self.state.guard.verifier().resolver();
        match resolver.warm().await {
            Ok(count) => tracing::info!(keys = count, "Key set loaded"),
            Err(e) => tracing::warn!("Key set not loaded at startup, will retry on demand: {e}"),
        }

        let addr: SocketAddr = self
            .config
            .listen_address()
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Gateway listening on http://{}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| GatewayError::Server(e.to_string()))?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Build the router for `state`.
pub fn build_router(state: GatewayState, config: &GatewayConfig) -> Router {
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/drinks", get(drinks::list_drinks).post(drinks::create_drink))
        .route("/drinks-detail", get(drinks::drinks_detail))
        .route(
            "/drinks/{id}",
            patch(drinks::update_drink).delete(drinks::delete_drink),
        )
        .fallback(not_found_handler)
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http());

    if config.cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE]),
        )
    } else {
        router
    }
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn not_found_handler() -> ApiError {
    ApiError::NotFound
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
