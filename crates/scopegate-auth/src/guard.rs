//! The auth guard: extract, verify, authorize, then invoke.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::claims::ClaimSet;
use crate::config::AuthConfig;
use crate::error::{AuthErrorKind, AuthFailure, ConfigError};
use crate::extract::extract_bearer;
use crate::permissions::{PermissionRequirement, check_permission};
use crate::verifier::TokenVerifier;

/// Where a request is in the guard pipeline.
///
/// A denial is reported with the last stage the request completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStage {
    /// Nothing checked yet.
    Start,
    /// Token taken from the header.
    Extracted,
    /// Signature and standard claims verified.
    Verified,
    /// Required scope present.
    Authorized,
    /// Protected operation running.
    Invoke,
}

impl fmt::Display for GuardStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Extracted => "extracted",
            Self::Verified => "verified",
            Self::Authorized => "authorized",
            Self::Invoke => "invoke",
        })
    }
}

/// Runs the authorization pipeline for one request at a time.
///
/// Cloning is cheap; clones share the verifier and its key-set cache.
#[derive(Debug, Clone)]
pub struct AuthGuard {
    verifier: Arc<TokenVerifier>,
}

impl AuthGuard {
    /// Wrap a verifier.
    #[must_use]
    pub const fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self { verifier }
    }

    /// Validate `config` and build the full HTTP-backed stack.
    ///
    /// # Errors
    ///
    /// Returns error if the config is incomplete or invalid.
    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        let settings = config.validate()?;
        let verifier = TokenVerifier::from_settings(&settings)?;
        tracing::info!(
            jwks_url = %settings.jwks_url,
            issuer = %settings.issuer,
            audience = %settings.audience,
            "Auth guard configured"
        );
        Ok(Self::new(Arc::new(verifier)))
    }

    /// The underlying verifier.
    #[must_use]
    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Authorize a request carrying `authorization` for `required`.
    ///
    /// # Errors
    ///
    /// Returns the first failure met; later stages are not attempted.
    pub async fn authorize(
        &self,
        authorization: Option<&str>,
        required: &PermissionRequirement,
    ) -> Result<ClaimSet, AuthFailure> {
        let token = extract_bearer(authorization)
            .map_err(|failure| deny(GuardStage::Start, required, failure))?;

        let claims = self
            .verifier
            .verify(&token)
            .await
            .map_err(|failure| deny(GuardStage::Extracted, required, failure))?;

        let claims = check_permission(claims, required)
            .map_err(|failure| deny(GuardStage::Verified, required, failure))?;

        tracing::debug!(
            stage = %GuardStage::Authorized,
            sub = %claims.subject(),
            scope = %required,
            "Request authorized"
        );
        Ok(claims)
    }

    /// Wrap `operation` so that it only runs for callers holding `required`.
    pub fn protect<F>(&self, required: impl Into<PermissionRequirement>, operation: F) -> Protected<F> {
        Protected {
            guard: self.clone(),
            required: required.into(),
            operation,
        }
    }
}

fn deny(stage: GuardStage, required: &PermissionRequirement, failure: AuthFailure) -> AuthFailure {
    if failure.kind() == AuthErrorKind::KeySetUnavailable {
        tracing::warn!(%stage, scope = %required, kind = %failure.kind(), "Request denied: {failure}");
    } else {
        tracing::info!(%stage, scope = %required, kind = %failure.kind(), "Request denied: {failure}");
    }
    failure
}

/// Outcome of a guarded call that did not succeed.
#[derive(Debug, Error)]
pub enum GuardError<E> {
    /// Authorization failed; the operation was not run.
    #[error(transparent)]
    Denied(AuthFailure),

    /// The operation ran and failed on its own terms.
    #[error("{0}")]
    Operation(E),
}

/// An operation behind an [`AuthGuard`], built by [`AuthGuard::protect`].
#[derive(Clone)]
pub struct Protected<F> {
    guard: AuthGuard,
    required: PermissionRequirement,
    operation: F,
}

impl<F> Protected<F> {
    /// The scope this operation demands.
    #[must_use]
    pub const fn requirement(&self) -> &PermissionRequirement {
        &self.required
    }

    /// Authorize, then run the operation with the verified claims.
    ///
    /// # Errors
    ///
    /// `GuardError::Denied` if authorization fails, otherwise whatever the
    /// operation returned, wrapped in `GuardError::Operation`.
    pub async fn call<Fut, T, E>(&self, authorization: Option<&str>) -> Result<T, GuardError<E>>
    where
        F: Fn(ClaimSet) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let claims = self
            .guard
            .authorize(authorization, &self.required)
            .await
            .map_err(GuardError::Denied)?;

        tracing::debug!(stage = %GuardStage::Invoke, scope = %self.required, "Invoking protected operation");
        (self.operation)(claims).await.map_err(GuardError::Operation)
    }
}

impl<F> fmt::Debug for Protected<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protected")
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}
