//! Authorization configuration.

use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default key-set cache TTL in seconds.
const DEFAULT_CACHE_TTL_SECS: u64 = 600;
/// Default key-set fetch timeout in seconds.
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 5;

/// Authorization configuration as written in a config file.
///
/// The three provider fields are optional here so that a partially written
/// file can still be loaded and then completed from the environment;
/// [`AuthConfig::validate`] is where their absence becomes an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// URL of the provider's published key set.
    #[serde(default)]
    pub jwks_url: Option<String>,

    /// Expected `iss` claim.
    #[serde(default)]
    pub issuer: Option<String>,

    /// Expected `aud` claim.
    #[serde(default)]
    pub audience: Option<String>,

    /// Accepted signing algorithms.
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<String>,

    /// How long a fetched key set stays fresh.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Bound on a single key-set fetch.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Minimum spacing between refetches triggered by unknown key ids.
    /// Zero lets every miss refetch.
    #[serde(default)]
    pub refetch_cooldown_secs: u64,

    /// Clock skew tolerated on `exp`.
    #[serde(default)]
    pub leeway_secs: u64,
}

fn default_algorithms() -> Vec<String> {
    vec!["RS256".to_string()]
}

fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_fetch_timeout() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwks_url: None,
            issuer: None,
            audience: None,
            algorithms: default_algorithms(),
            cache_ttl_secs: default_cache_ttl(),
            fetch_timeout_secs: default_fetch_timeout(),
            refetch_cooldown_secs: 0,
            leeway_secs: 0,
        }
    }
}

impl AuthConfig {
    /// Create a new auth config builder.
    #[must_use]
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Config for an Auth0 tenant domain such as `dev-abc.us.auth0.com`.
    ///
    /// Auth0 publishes its key set under `/.well-known/jwks.json` and issues
    /// tokens with the tenant URL (trailing slash included) as `iss`.
    #[must_use]
    pub fn for_auth0_domain(domain: &str, audience: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.apply_auth0_domain(domain);
        config.audience = Some(audience.into());
        config
    }

    fn apply_auth0_domain(&mut self, domain: &str) {
        let domain = domain
            .trim()
            .trim_start_matches("https://")
            .trim_end_matches('/');
        self.jwks_url = Some(format!("https://{domain}/.well-known/jwks.json"));
        self.issuer = Some(format!("https://{domain}/"));
    }

    /// Apply overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// `SCOPEGATE_AUTH0_DOMAIN` is applied first so that explicit
    /// `SCOPEGATE_JWKS_URL` / `SCOPEGATE_ISSUER` values win over it.
    #[must_use]
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(domain) = lookup("SCOPEGATE_AUTH0_DOMAIN") {
            self.apply_auth0_domain(&domain);
        }
        if let Some(url) = lookup("SCOPEGATE_JWKS_URL") {
            self.jwks_url = Some(url);
        }
        if let Some(issuer) = lookup("SCOPEGATE_ISSUER") {
            self.issuer = Some(issuer);
        }
        if let Some(audience) = lookup("SCOPEGATE_AUDIENCE") {
            self.audience = Some(audience);
        }
        if let Some(algorithms) = lookup("SCOPEGATE_ALGORITHMS") {
            self.algorithms = algorithms
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if let Some(ttl) = lookup("SCOPEGATE_CACHE_TTL_SECS") {
            match ttl.trim().parse() {
                Ok(secs) => self.cache_ttl_secs = secs,
                Err(_) => tracing::warn!("Ignoring non-numeric SCOPEGATE_CACHE_TTL_SECS: {ttl}"),
            }
        }

        self
    }

    /// Check the config and convert it into typed verifier settings.
    ///
    /// # Errors
    ///
    /// Returns error if a required field is missing or any value is unusable.
    pub fn validate(&self) -> Result<VerifierSettings, ConfigError> {
        let jwks_url = required(self.jwks_url.as_deref(), "jwksUrl")?;
        let jwks_url = Url::parse(jwks_url).map_err(|e| ConfigError::Invalid {
            field: "jwksUrl",
            reason: e.to_string(),
        })?;
        if !matches!(jwks_url.scheme(), "https" | "http") {
            return Err(ConfigError::Invalid {
                field: "jwksUrl",
                reason: format!("unsupported scheme '{}'", jwks_url.scheme()),
            });
        }

        let issuer = required(self.issuer.as_deref(), "issuer")?.to_string();
        let audience = required(self.audience.as_deref(), "audience")?.to_string();

        if self.algorithms.is_empty() {
            return Err(ConfigError::Invalid {
                field: "algorithms",
                reason: "at least one algorithm must be accepted".to_string(),
            });
        }
        let algorithms = self
            .algorithms
            .iter()
            .map(|name| parse_algorithm(name))
            .collect::<Result<Vec<_>, _>>()?;

        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "cacheTtlSecs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "fetchTimeoutSecs",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(VerifierSettings {
            jwks_url,
            issuer,
            audience,
            algorithms,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            refetch_cooldown: Duration::from_secs(self.refetch_cooldown_secs),
            leeway: Duration::from_secs(self.leeway_secs),
        })
    }
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, ConfigError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingField(field))
}

fn parse_algorithm(name: &str) -> Result<Algorithm, ConfigError> {
    let algorithm = Algorithm::from_str(name.trim()).map_err(|_| ConfigError::Invalid {
        field: "algorithms",
        reason: format!("unknown algorithm '{name}'"),
    })?;

    // A published key set only carries public keys.
    if matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    ) {
        return Err(ConfigError::Invalid {
            field: "algorithms",
            reason: format!("symmetric algorithm '{name}' cannot be verified with a key set"),
        });
    }

    Ok(algorithm)
}

/// Validated, typed settings consumed by the resolver and verifier.
#[derive(Debug, Clone)]
pub struct VerifierSettings {
    /// Key-set endpoint.
    pub jwks_url: Url,
    /// Expected issuer.
    pub issuer: String,
    /// Expected audience.
    pub audience: String,
    /// Accepted algorithms.
    pub algorithms: Vec<Algorithm>,
    /// Key-set freshness window.
    pub cache_ttl: Duration,
    /// Key-set fetch timeout.
    pub fetch_timeout: Duration,
    /// Spacing between miss-triggered refetches; zero disables throttling.
    pub refetch_cooldown: Duration,
    /// Tolerated clock skew on expiry.
    pub leeway: Duration,
}

/// Builder for `AuthConfig`.
#[derive(Debug, Default)]
pub struct AuthConfigBuilder {
    config: AuthConfig,
}

impl AuthConfigBuilder {
    /// Set the key-set URL.
    #[must_use]
    pub fn jwks_url(mut self, url: impl Into<String>) -> Self {
        self.config.jwks_url = Some(url.into());
        self
    }

    /// Set the expected issuer.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.config.issuer = Some(issuer.into());
        self
    }

    /// Set the expected audience.
    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.config.audience = Some(audience.into());
        self
    }

    /// Replace the accepted algorithm list.
    #[must_use]
    pub fn algorithms<I, S>(mut self, algorithms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.algorithms = algorithms.into_iter().map(Into::into).collect();
        self
    }

    /// Set the cache TTL in seconds.
    #[must_use]
    pub fn cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.cache_ttl_secs = secs;
        self
    }

    /// Set the fetch timeout in seconds.
    #[must_use]
    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    /// Set the miss-refetch cooldown in seconds.
    #[must_use]
    pub fn refetch_cooldown_secs(mut self, secs: u64) -> Self {
        self.config.refetch_cooldown_secs = secs;
        self
    }

    /// Set the expiry leeway in seconds.
    #[must_use]
    pub fn leeway_secs(mut self, secs: u64) -> Self {
        self.config.leeway_secs = secs;
        self
    }

    /// Build the config.
    #[must_use]
    pub fn build(self) -> AuthConfig {
        self.config
    }
}
