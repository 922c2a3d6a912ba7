//! # Scopegate Gateway
//!
//! HTTP boundary for scopegate: a small drinks API whose routes each
//! demand one scope, enforced by an axum extractor over
//! [`scopegate_auth::AuthGuard`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Scope-guarded request extraction.
pub mod auth;
/// Gateway configuration.
pub mod config;
/// Drinks resource.
pub mod drinks;
/// Boundary errors.
pub mod error;
mod server;

pub use auth::{Authorized, RequiredScope};
pub use config::GatewayConfig;
pub use drinks::{Drink, DrinkStore, Ingredient};
pub use error::ApiError;
pub use server::{Gateway, GatewayState, build_router};

/// Build the gateway from `config` and serve until shutdown.
///
/// # Errors
///
/// Returns error if the config is invalid or the server fails to start.
pub async fn start(config: GatewayConfig) -> Result<(), GatewayError> {
    let gateway = Gateway::new(config)?;
    gateway.run().await
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Auth configuration error.
    #[error("Auth config error: {0}")]
    Auth(#[from] scopegate_auth::ConfigError),

    /// Config file parse error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
