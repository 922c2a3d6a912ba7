//! Bearer token extraction from the `Authorization` header.

use std::fmt;

use crate::error::{AuthErrorKind, AuthFailure};

/// A raw compact token taken from the request, not yet verified.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wrap a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The compact token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(..)")
    }
}

/// Pull the token out of an `Authorization` header value.
///
/// The header must be exactly `Bearer <token>`; the scheme keyword is
/// matched case-insensitively.
///
/// # Errors
///
/// `AuthHeaderMissing` if `header` is `None`, `AuthHeaderMalformed` for any
/// other shape.
pub fn extract_bearer(header: Option<&str>) -> Result<BearerToken, AuthFailure> {
    let header = header.ok_or_else(|| AuthFailure::from(AuthErrorKind::AuthHeaderMissing))?;

    let parts: Vec<&str> = header.split(' ').collect();
    match parts.as_slice() {
        [scheme, token] if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() => {
            Ok(BearerToken::new(*token))
        }
        [scheme, ..] if !scheme.eq_ignore_ascii_case("bearer") => Err(AuthFailure::new(
            AuthErrorKind::AuthHeaderMalformed,
            "Authorization header must start with \"Bearer\".",
        )),
        [_] | [_, ""] => Err(AuthFailure::new(
            AuthErrorKind::AuthHeaderMalformed,
            "Token not found.",
        )),
        _ => Err(AuthFailure::from(AuthErrorKind::AuthHeaderMalformed)),
    }
}
