//! Serve command - start the gateway server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use scopegate_gateway::{Gateway, GatewayConfig};

use crate::ui;

/// Serve command arguments.
#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    /// Config file override.
    pub config: Option<PathBuf>,
    /// Port override.
    pub port: Option<u16>,
    /// Bind address override.
    pub bind: Option<String>,
}

/// Validate config, warm the key set, and serve until Ctrl+C.
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    if args.config.is_none() && !GatewayConfig::default_path().exists() {
        ui::warning("No config file found, using defaults and SCOPEGATE_* variables");
        ui::info("Run 'scopegate config init' to create one");
    }

    let mut config = super::load_config(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    let gateway = Gateway::new(config).context("Refusing to start with invalid configuration")?;
    let verifier = gateway.state().guard.verifier();

    ui::header("Starting Scopegate Gateway");
    ui::kv("Address", &gateway.config().listen_address());
    ui::kv("Issuer", verifier.issuer());
    ui::kv("Audience", verifier.audience());
    if let Some(url) = &gateway.config().auth.jwks_url {
        ui::kv("Key set", url);
    }
    eprintln!();
    ui::info("Press Ctrl+C to stop");
    eprintln!();

    gateway.run().await?;

    Ok(())
}
