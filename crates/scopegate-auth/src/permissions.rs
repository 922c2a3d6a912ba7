//! Scope checks against a verified claim set.

use std::fmt;

use crate::claims::ClaimSet;
use crate::error::{AuthErrorKind, AuthFailure};

/// The scope a protected operation demands, e.g. `delete:drinks`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionRequirement(String);

impl PermissionRequirement {
    /// Require `scope`.
    #[must_use]
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    /// The scope string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PermissionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PermissionRequirement {
    fn from(scope: &str) -> Self {
        Self::new(scope)
    }
}

/// Check that `claims` grant `required`, handing the claims back on success.
///
/// # Errors
///
/// `PermissionsClaimMissing` when the token has no `permissions` claim at
/// all, `PermissionDenied` when the claim is there but lacks the scope.
pub fn check_permission(
    claims: ClaimSet,
    required: &PermissionRequirement,
) -> Result<ClaimSet, AuthFailure> {
    let Some(granted) = claims.permissions() else {
        return Err(AuthErrorKind::PermissionsClaimMissing.into());
    };

    if !granted.contains(required.as_str()) {
        return Err(AuthFailure::new(
            AuthErrorKind::PermissionDenied,
            format!("Permission '{required}' not found."),
        ));
    }

    Ok(claims)
}
