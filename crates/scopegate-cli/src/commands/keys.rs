//! Keys command - list the provider's published signing keys.

use std::path::PathBuf;

use anyhow::{Context, Result};
use scopegate_auth::AuthGuard;

use crate::ui;

/// Fetch the key set and print one row per usable key.
pub async fn run_keys(config: Option<PathBuf>) -> Result<()> {
    let config = super::load_config(config.as_deref())?;
    let guard = AuthGuard::from_config(&config.auth).context("Invalid auth configuration")?;
    let resolver = guard.verifier().resolver();

    ui::header("Signing Keys");
    if let Some(url) = &config.auth.jwks_url {
        ui::kv("Source", url);
    }

    let count = resolver.warm().await.context("Failed to fetch key set")?;
    eprintln!();
    ui::table_row(&[("KID", 48), ("ALG", 8)]);
    for key in resolver.keys().await {
        let alg = key
            .algorithm()
            .map_or_else(|| "-".to_string(), |alg| format!("{alg:?}"));
        ui::table_row(&[(key.kid(), 48), (alg.as_str(), 8)]);
    }
    eprintln!();
    ui::success(&format!("{count} usable key(s)"));

    Ok(())
}
