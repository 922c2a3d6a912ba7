//! Authorization failure taxonomy.
//!
//! Every way a request can be refused maps to exactly one
//! [`AuthErrorKind`]. The kind decides the HTTP status and the default
//! message; [`AuthFailure`] carries the kind plus the message that is
//! actually shown to the caller.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// The kind of an authorization failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorKind {
    /// No `Authorization` header on the request.
    AuthHeaderMissing,
    /// Header present but not `Bearer <token>`.
    AuthHeaderMalformed,
    /// Token is not a structurally valid compact JWS.
    TokenMalformed,
    /// `exp` is in the past.
    TokenExpired,
    /// Signature does not verify against the resolved key.
    InvalidSignature,
    /// `aud` does not contain the expected audience.
    InvalidAudience,
    /// `iss` is not the expected issuer.
    InvalidIssuer,
    /// Header `alg` is not accepted.
    UnsupportedAlgorithm,
    /// No published key carries the token's `kid`.
    SigningKeyNotFound,
    /// The token carries no `permissions` claim at all.
    PermissionsClaimMissing,
    /// The required scope is not in the token's permissions.
    PermissionDenied,
    /// The key set could not be fetched or parsed.
    KeySetUnavailable,
}

impl AuthErrorKind {
    /// HTTP status the boundary should answer with.
    #[must_use]
    pub const fn status(self) -> u16 {
        match self {
            Self::AuthHeaderMissing
            | Self::AuthHeaderMalformed
            | Self::TokenMalformed
            | Self::TokenExpired
            | Self::InvalidSignature
            | Self::InvalidAudience
            | Self::InvalidIssuer
            | Self::UnsupportedAlgorithm
            | Self::SigningKeyNotFound => 401,
            Self::PermissionsClaimMissing | Self::PermissionDenied => 403,
            Self::KeySetUnavailable => 500,
        }
    }

    /// Stable machine-readable name.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::AuthHeaderMissing => "auth_header_missing",
            Self::AuthHeaderMalformed => "auth_header_malformed",
            Self::TokenMalformed => "token_malformed",
            Self::TokenExpired => "token_expired",
            Self::InvalidSignature => "invalid_signature",
            Self::InvalidAudience => "invalid_audience",
            Self::InvalidIssuer => "invalid_issuer",
            Self::UnsupportedAlgorithm => "unsupported_algorithm",
            Self::SigningKeyNotFound => "signing_key_not_found",
            Self::PermissionsClaimMissing => "permissions_claim_missing",
            Self::PermissionDenied => "permission_denied",
            Self::KeySetUnavailable => "key_set_unavailable",
        }
    }

    /// Message used when the failure site has nothing more specific to say.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::AuthHeaderMissing => "Authorization header is expected.",
            Self::AuthHeaderMalformed => "Authorization header must be a bearer token.",
            Self::TokenMalformed => "Unable to parse authentication token.",
            Self::TokenExpired => "Token expired.",
            Self::InvalidSignature => "Token signature is invalid.",
            Self::InvalidAudience => "Incorrect claims. Please, check the audience.",
            Self::InvalidIssuer => "Incorrect claims. Please, check the issuer.",
            Self::UnsupportedAlgorithm => "Token signing algorithm is not accepted.",
            Self::SigningKeyNotFound => "Unable to find the appropriate key.",
            Self::PermissionsClaimMissing => "Permissions not included in token.",
            Self::PermissionDenied => "Permission not found.",
            Self::KeySetUnavailable => "Signing keys are currently unavailable.",
        }
    }
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A typed authorization failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct AuthFailure {
    kind: AuthErrorKind,
    message: String,
}

impl AuthFailure {
    /// Create a failure with a site-specific message.
    #[must_use]
    pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The failure kind.
    #[must_use]
    pub const fn kind(&self) -> AuthErrorKind {
        self.kind
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status for this failure.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.kind.status()
    }

    /// The JSON body sent to the caller.
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        ErrorBody::new(self.status(), self.message.clone())
    }
}

impl From<AuthErrorKind> for AuthFailure {
    fn from(kind: AuthErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }
}

/// Error body shape shared by every failing response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Always `false`.
    pub success: bool,
    /// HTTP status code.
    pub error: u16,
    /// Human-readable message.
    pub message: String,
}

impl ErrorBody {
    /// Build a failing body.
    #[must_use]
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: status,
            message: message.into(),
        }
    }
}

/// Startup configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required field.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Field present but unusable.
    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// HTTP client construction failed.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AuthErrorKind::AuthHeaderMissing.status(), 401);
        assert_eq!(AuthErrorKind::SigningKeyNotFound.status(), 401);
        assert_eq!(AuthErrorKind::UnsupportedAlgorithm.status(), 401);
        assert_eq!(AuthErrorKind::PermissionsClaimMissing.status(), 403);
        assert_eq!(AuthErrorKind::PermissionDenied.status(), 403);
        assert_eq!(AuthErrorKind::KeySetUnavailable.status(), 500);
    }

    #[test]
    fn test_default_message_from_kind() {
        let failure = AuthFailure::from(AuthErrorKind::TokenExpired);
        assert_eq!(failure.kind(), AuthErrorKind::TokenExpired);
        assert_eq!(failure.to_string(), "Token expired.");
    }

    #[test]
    fn test_body_shape() {
        let failure = AuthFailure::new(AuthErrorKind::PermissionDenied, "nope");
        let body = serde_json::to_value(failure.body()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"success": false, "error": 403, "message": "nope"})
        );
    }

    #[test]
    fn test_kind_display_is_code() {
        assert_eq!(
            AuthErrorKind::KeySetUnavailable.to_string(),
            "key_set_unavailable"
        );
    }
}
