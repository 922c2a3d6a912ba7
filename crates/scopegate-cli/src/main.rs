//! Scopegate CLI - run and exercise the scope-guarded gateway.

mod commands;
mod ui;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "scopegate")]
#[command(about = "Scopegate - bearer-token authorization gateway")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to $SCOPEGATE_CONFIG or ~/.scopegate/scopegate.json5)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(long)]
        bind: Option<String>,
    },

    /// Verify a token once and print its claims
    Verify {
        /// Raw token
        #[arg(long, conflicts_with = "header", required_unless_present = "header")]
        token: Option<String>,

        /// Full Authorization header value, e.g. "Bearer eyJ..."
        #[arg(long)]
        header: Option<String>,

        /// Scope the token must grant
        #[arg(long)]
        permission: Option<String>,
    },

    /// Fetch and list the published signing keys
    Keys,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Validate configuration
    Validate,

    /// Write a starter config file
    Init {
        /// Auth0 tenant domain, e.g. dev-abc.us.auth0.com
        #[arg(long, requires = "audience")]
        auth0_domain: Option<String>,

        /// API audience
        #[arg(long)]
        audience: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays pipeable
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Serve { port, bind } => {
            let args = commands::serve::ServeArgs {
                config: cli.config,
                port,
                bind,
            };
            commands::run_serve(args).await?;
        }

        Commands::Verify {
            token,
            header,
            permission,
        } => {
            let args = commands::verify::VerifyArgs {
                config: cli.config,
                token,
                header,
                permission,
            };
            return commands::run_verify(args).await;
        }

        Commands::Keys => {
            commands::run_keys(cli.config).await?;
        }

        Commands::Config { action } => {
            let action = match action {
                ConfigCommands::Show => commands::config::ConfigAction::Show,
                ConfigCommands::Validate => commands::config::ConfigAction::Validate,
                ConfigCommands::Init {
                    auth0_domain,
                    audience,
                    force,
                } => commands::config::ConfigAction::Init {
                    auth0_domain,
                    audience,
                    force,
                },
            };
            let args = commands::config::ConfigArgs {
                path: cli.config,
                action,
            };
            return commands::run_config(args);
        }
    }

    Ok(ExitCode::SUCCESS)
}
