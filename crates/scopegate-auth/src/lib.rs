//! # Scopegate Auth
//!
//! Bearer-token verification and scope authorization against an identity
//! provider's published key set.
//!
//! This crate provides:
//! - `Authorization` header parsing
//! - A key-set cache with single-flight refresh and rotation handling
//! - Signature and standard-claim verification
//! - Permission (scope) checks
//! - [`AuthGuard`], which composes all of the above around an operation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod claims;
pub mod config;
pub mod error;
pub mod extract;
pub mod guard;
pub mod jwks;
pub mod permissions;
pub mod verifier;

/// Test key material and token builders (requires "testutil" feature).
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use claims::{Audience, ClaimSet};
pub use config::{AuthConfig, AuthConfigBuilder, VerifierSettings};
pub use error::{AuthErrorKind, AuthFailure, ConfigError, ErrorBody};
pub use extract::{BearerToken, extract_bearer};
pub use guard::{AuthGuard, GuardError, GuardStage, Protected};
pub use jwks::{HttpKeySetFetcher, KeySetFetcher, KeySetResolver, SigningKey, parse_key_set};
pub use permissions::{PermissionRequirement, check_permission};
pub use verifier::TokenVerifier;

/// Re-exported so callers can name accepted algorithms without a direct dependency.
pub use jsonwebtoken::Algorithm;
