//! CLI command implementations.

pub mod config;
pub mod keys;
pub mod serve;
pub mod verify;

use std::path::Path;

use anyhow::{Context, Result};
use scopegate_gateway::GatewayConfig;

pub use config::run_config;
pub use keys::run_keys;
pub use serve::run_serve;
pub use verify::run_verify;

/// Load config from `path`, or from the default location when `None`.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig> {
    match path {
        Some(path) => GatewayConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => GatewayConfig::load_default().context("Failed to load default config"),
    }
}
