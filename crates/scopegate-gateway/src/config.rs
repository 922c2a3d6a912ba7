//! Gateway configuration.
//!
//! Loaded from a JSON5 file, then completed from `SCOPEGATE_*` environment
//! variables. Default location: `~/.scopegate/scopegate.json5`.

use std::path::{Path, PathBuf};

use scopegate_auth::AuthConfig;
use serde::{Deserialize, Serialize};

use crate::GatewayError;

/// Gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Enable CORS.
    #[serde(default = "default_cors")]
    pub cors: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Token verification settings.
    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_port() -> u16 {
    5000
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

const fn default_cors() -> bool {
    true
}

const fn default_request_timeout() -> u64 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            cors: default_cors(),
            request_timeout_secs: default_request_timeout(),
            auth: AuthConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load from the default location, falling back to defaults when no
    /// file exists. Environment overrides apply either way.
    ///
    /// # Errors
    ///
    /// Returns error if an existing file cannot be read or parsed.
    pub fn load_default() -> Result<Self, GatewayError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default().with_env_overrides())
        }
    }

    /// Load from `path` and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, GatewayError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config.with_env_overrides())
    }

    /// Write this config as pretty JSON (valid JSON5).
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), GatewayError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| GatewayError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Config file path.
    ///
    /// Uses `SCOPEGATE_CONFIG` if set, otherwise `~/.scopegate/scopegate.json5`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("SCOPEGATE_CONFIG") {
            PathBuf::from(path)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".scopegate").join("scopegate.json5")
        } else {
            PathBuf::from(".scopegate").join("scopegate.json5")
        }
    }

    /// Apply `SCOPEGATE_*` environment overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    #[must_use]
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("SCOPEGATE_PORT") {
            match port.trim().parse() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid SCOPEGATE_PORT"),
            }
        }
        if let Some(bind) = lookup("SCOPEGATE_BIND").filter(|v| !v.trim().is_empty()) {
            self.bind_address = bind;
        }
        self.auth = self.auth.with_overrides(lookup);
        self
    }

    /// Check gateway-level settings. Auth settings are checked when the
    /// guard is built.
    ///
    /// # Errors
    ///
    /// Returns error on a zero port, or a request timeout that does not
    /// outlast the key-set fetch timeout.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.port == 0 {
            return Err(GatewayError::Config("Gateway port cannot be 0".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(GatewayError::Config(
                "requestTimeoutSecs must be greater than 0".to_string(),
            ));
        }
        // A hung key-set fetch must surface as a key-set failure, not a
        // request timeout.
        if self.request_timeout_secs <= self.auth.fetch_timeout_secs {
            return Err(GatewayError::Config(format!(
                "requestTimeoutSecs ({}) must be greater than auth.fetchTimeoutSecs ({})",
                self.request_timeout_secs, self.auth.fetch_timeout_secs
            )));
        }
        Ok(())
    }

    /// Socket address string to bind.
    #[must_use]
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}
