//! Verified claim set.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Claims that must be present before a token is worth verifying.
pub(crate) const REQUIRED_CLAIMS: [&str; 4] = ["iss", "sub", "aud", "exp"];

/// The `aud` claim: a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Audience(Vec<String>);

impl Audience {
    /// Whether `expected` is one of the audiences.
    #[must_use]
    pub fn contains(&self, expected: &str) -> bool {
        self.0.iter().any(|aud| aud == expected)
    }

    /// All audiences.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Audience {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(String),
            Many(Vec<String>),
        }

        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(aud) => Self(vec![aud]),
            OneOrMany::Many(auds) => Self(auds),
        })
    }
}

/// Payload shape as it arrives, before any checks.
#[derive(Debug, Deserialize)]
pub(crate) struct RawClaims {
    pub(crate) iss: String,
    pub(crate) sub: String,
    pub(crate) aud: Audience,
    pub(crate) exp: i64,
    #[serde(default)]
    pub(crate) iat: Option<i64>,
    #[serde(default)]
    pub(crate) permissions: Option<BTreeSet<String>>,
}

/// Claims of a token whose signature and standard claims have been checked.
///
/// There is no public constructor: the only way to obtain one is through
/// [`crate::TokenVerifier::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimSet {
    iss: String,
    sub: String,
    aud: Audience,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    permissions: Option<BTreeSet<String>>,
}

impl ClaimSet {
    pub(crate) fn from_verified(raw: RawClaims) -> Self {
        Self {
            iss: raw.iss,
            sub: raw.sub,
            aud: raw.aud,
            exp: raw.exp,
            iat: raw.iat,
            permissions: raw.permissions,
        }
    }

    /// Token issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.iss
    }

    /// Subject (the caller's identity at the provider).
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.sub
    }

    /// Audiences the token was issued for.
    #[must_use]
    pub const fn audience(&self) -> &Audience {
        &self.aud
    }

    /// Expiry as a Unix timestamp.
    #[must_use]
    pub const fn expires_at_unix(&self) -> i64 {
        self.exp
    }

    /// Expiry as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    /// Issue time, if the token carried one.
    #[must_use]
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|iat| Utc.timestamp_opt(iat, 0).single())
    }

    /// Granted scopes; `None` when the claim was absent.
    #[must_use]
    pub const fn permissions(&self) -> Option<&BTreeSet<String>> {
        self.permissions.as_ref()
    }

    /// Whether `scope` is granted.
    #[must_use]
    pub fn has_permission(&self, scope: &str) -> bool {
        self.permissions
            .as_ref()
            .is_some_and(|granted| granted.contains(scope))
    }
}
