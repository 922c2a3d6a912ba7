//! Verify command - run the guard once against a token.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use scopegate_auth::{AuthFailure, AuthGuard, ClaimSet, PermissionRequirement, extract_bearer};

use crate::ui;

/// Verify command arguments.
#[derive(Debug, Clone, Default)]
pub struct VerifyArgs {
    /// Config file override.
    pub config: Option<PathBuf>,
    /// Raw token.
    pub token: Option<String>,
    /// Full `Authorization` header value.
    pub header: Option<String>,
    /// Scope to require.
    pub permission: Option<String>,
}

impl VerifyArgs {
    fn authorization(&self) -> Option<String> {
        match (&self.token, &self.header) {
            (Some(token), _) => Some(format!("Bearer {}", token.trim())),
            (None, header) => header.clone(),
        }
    }
}

/// Verify the token and print its claims, or the error body on denial.
pub async fn run_verify(args: VerifyArgs) -> Result<ExitCode> {
    let config = super::load_config(args.config.as_deref())?;
    let guard = AuthGuard::from_config(&config.auth).context("Invalid auth configuration")?;
    let authorization = args.authorization();

    let outcome = match &args.permission {
        Some(scope) => {
            guard
                .authorize(authorization.as_deref(), &PermissionRequirement::new(scope.as_str()))
                .await
        }
        None => verify_only(&guard, authorization.as_deref()).await,
    };

    let (output, code) = report(&outcome, args.permission.as_deref())?;
    println!("{output}");
    Ok(code)
}

/// Log a status line and render the stdout payload for `outcome`.
fn report(
    outcome: &Result<ClaimSet, AuthFailure>,
    permission: Option<&str>,
) -> Result<(String, ExitCode)> {
    match outcome {
        Ok(claims) => {
            match permission {
                Some(scope) => ui::success(&format!("Token is valid and grants '{scope}'")),
                None => ui::success("Token is valid"),
            }
            Ok((serde_json::to_string_pretty(claims)?, ExitCode::SUCCESS))
        }
        Err(failure) => {
            ui::error(&format!("Denied ({}): {failure}", failure.kind()));
            Ok((serde_json::to_string_pretty(&failure.body())?, ExitCode::FAILURE))
        }
    }
}

async fn verify_only(guard: &AuthGuard, authorization: Option<&str>) -> Result<ClaimSet, AuthFailure> {
    let token = extract_bearer(authorization)?;
    guard.verifier().verify(&token).await
}
