//! Config command - show, validate, and create the config file.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Result, bail};
use scopegate_auth::AuthConfig;
use scopegate_gateway::GatewayConfig;

use crate::ui::{self, CheckStatus};

/// Config command arguments.
#[derive(Debug, Clone)]
pub struct ConfigArgs {
    /// Config file override.
    pub path: Option<PathBuf>,
    /// Subcommand.
    pub action: ConfigAction,
}

/// Config actions.
#[derive(Debug, Clone)]
pub enum ConfigAction {
    Show,
    Validate,
    Init {
        /// Auth0 tenant domain.
        auth0_domain: Option<String>,
        /// API audience.
        audience: Option<String>,
        /// Overwrite an existing file.
        force: bool,
    },
}

/// Run the config command.
pub fn run_config(args: ConfigArgs) -> Result<ExitCode> {
    match args.action {
        ConfigAction::Show => show_config(args.path.as_deref()).map(|()| ExitCode::SUCCESS),
        ConfigAction::Validate => Ok(validate_config(args.path.as_deref())),
        ConfigAction::Init {
            auth0_domain,
            audience,
            force,
        } => {
            let path = args.path.unwrap_or_else(GatewayConfig::default_path);
            init_config(&path, auth0_domain.as_deref(), audience, force)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Print the effective configuration, overrides applied.
fn show_config(path: Option<&Path>) -> Result<()> {
    let config = super::load_config(path)?;
    let source = path.map_or_else(GatewayConfig::default_path, Path::to_path_buf);

    ui::kv("Source", &source.display().to_string());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Run every check and report each one.
fn validate_config(path: Option<&Path>) -> ExitCode {
    ui::header("Configuration Check");

    let config = match super::load_config(path) {
        Ok(config) => {
            ui::check("Config file", CheckStatus::Ok, None);
            config
        }
        Err(e) => {
            ui::check("Config file", CheckStatus::Error, Some(&format!("{e:#}")));
            return ExitCode::FAILURE;
        }
    };

    let gateway = config.validate().map_err(|e| e.to_string());
    let auth = config.auth.validate().map(|_| ()).map_err(|e| e.to_string());

    let mut ok = true;
    for (name, result) in [("Gateway", gateway), ("Auth", auth)] {
        match result {
            Ok(()) => ui::check(name, CheckStatus::Ok, None),
            Err(e) => {
                ok = false;
                ui::check(name, CheckStatus::Error, Some(&e));
            }
        }
    }

    eprintln!();
    if ok {
        ui::success("Configuration is valid");
        ExitCode::SUCCESS
    } else {
        ui::error("Configuration has errors");
        ExitCode::FAILURE
    }
}

/// Write a starter config to `path`.
fn init_config(
    path: &Path,
    auth0_domain: Option<&str>,
    audience: Option<String>,
    force: bool,
) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    let auth = match (auth0_domain, audience) {
        (Some(domain), Some(audience)) => AuthConfig::for_auth0_domain(domain, audience),
        (None, audience) => AuthConfig {
            audience,
            ..AuthConfig::default()
        },
        (Some(_), None) => bail!("--auth0-domain requires --audience"),
    };

    let config = GatewayConfig {
        auth,
        ..GatewayConfig::default()
    };
    config.save(path)?;

    ui::success(&format!("Wrote {}", path.display()));
    if config.auth.validate().is_err() {
        ui::info("Fill in jwksUrl, issuer and audience before running 'scopegate serve'");
    }
    Ok(())
}
