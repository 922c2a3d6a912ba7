//! Scope-guarded request extraction for axum.

use std::fmt;
use std::marker::PhantomData;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use scopegate_auth::{AuthErrorKind, AuthGuard, ClaimSet, PermissionRequirement};

use crate::error::ApiError;

/// A scope a route demands, named at the type level.
pub trait RequiredScope {
    /// Scope string checked against the token's `permissions`.
    const SCOPE: &'static str;
}

/// Extractor that admits only callers holding `P::SCOPE`.
///
/// Rejections carry the auth failure's status and JSON body, and the
/// handler is never entered.
pub struct Authorized<P> {
    claims: ClaimSet,
    _scope: PhantomData<fn() -> P>,
}

impl<P> Authorized<P> {
    /// Verified claims of the caller.
    #[must_use]
    pub const fn claims(&self) -> &ClaimSet {
        &self.claims
    }

    /// Take the verified claims.
    #[must_use]
    pub fn into_claims(self) -> ClaimSet {
        self.claims
    }
}

impl<P: RequiredScope> fmt::Debug for Authorized<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorized")
            .field("scope", &P::SCOPE)
            .field("sub", &self.claims.subject())
            .finish()
    }
}

impl<S, P> FromRequestParts<S> for Authorized<P>
where
    S: Send + Sync,
    AuthGuard: FromRef<S>,
    P: RequiredScope,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let guard = AuthGuard::from_ref(state);

        let header = match parts.headers.get(AUTHORIZATION) {
            None => None,
            Some(value) => Some(
                value
                    .to_str()
                    .map_err(|_| ApiError::Auth(AuthErrorKind::AuthHeaderMalformed.into()))?,
            ),
        };

        let claims = guard
            .authorize(header, &PermissionRequirement::new(P::SCOPE))
            .await?;

        Ok(Self {
            claims,
            _scope: PhantomData,
        })
    }
}

/// Scopes used by the drinks API.
pub mod scopes {
    use super::RequiredScope;

    /// `get:drinks`
    #[derive(Debug, Clone, Copy)]
    pub struct GetDrinks;

    impl RequiredScope for GetDrinks {
        const SCOPE: &'static str = "get:drinks";
    }

    /// `get:drinks-detail`
    #[derive(Debug, Clone, Copy)]
    pub struct GetDrinksDetail;

    impl RequiredScope for GetDrinksDetail {
        const SCOPE: &'static str = "get:drinks-detail";
    }

    /// `post:drinks`
    #[derive(Debug, Clone, Copy)]
    pub struct PostDrinks;

    impl RequiredScope for PostDrinks {
        const SCOPE: &'static str = "post:drinks";
    }

    /// `patch:drinks`
    #[derive(Debug, Clone, Copy)]
    pub struct PatchDrinks;

    impl RequiredScope for PatchDrinks {
        const SCOPE: &'static str = "patch:drinks";
    }

    /// `delete:drinks`
    #[derive(Debug, Clone, Copy)]
    pub struct DeleteDrinks;

    impl RequiredScope for DeleteDrinks {
        const SCOPE: &'static str = "delete:drinks";
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, Request};
    use scopegate_auth::testutil::{MockKeySet, TestKey, test_guard, valid_claims};

    use super::*;
    use super::scopes::{DeleteDrinks, GetDrinks};

    fn parts(header: Option<HeaderValue>) -> Parts {
        let mut request = Request::builder().uri("/drinks");
        if let Some(value) = header {
            request = request.header(AUTHORIZATION, value);
        }
        request.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_extracts_claims_for_granted_scope() {
        let keys = MockKeySet::new(vec![TestKey::A]);
        let guard = test_guard(&keys);
        let token = TestKey::A.sign(&valid_claims(&["get:drinks"]));
        let mut parts = parts(Some(HeaderValue::from_str(&format!("Bearer {token}")).unwrap()));

        let authorized = Authorized::<GetDrinks>::from_request_parts(&mut parts, &guard)
            .await
            .unwrap();

        assert!(authorized.claims().has_permission("get:drinks"));
    }

    #[tokio::test]
    async fn test_rejects_missing_scope() {
        let keys = MockKeySet::new(vec![TestKey::A]);
        let guard = test_guard(&keys);
        let token = TestKey::A.sign(&valid_claims(&["get:drinks"]));
        let mut parts = parts(Some(HeaderValue::from_str(&format!("Bearer {token}")).unwrap()));

        let err = Authorized::<DeleteDrinks>::from_request_parts(&mut parts, &guard)
            .await
            .unwrap_err();

        assert_eq!(err.status().as_u16(), 403);
    }

    #[tokio::test]
    async fn test_non_ascii_header_is_malformed() {
        let keys = MockKeySet::new(vec![TestKey::A]);
        let guard = test_guard(&keys);
        let mut parts = parts(Some(HeaderValue::from_bytes(b"Bearer \xff\xfe").unwrap()));

        let err = Authorized::<GetDrinks>::from_request_parts(&mut parts, &guard)
            .await
            .unwrap_err();

        match err {
            ApiError::Auth(failure) => {
                assert_eq!(failure.kind(), AuthErrorKind::AuthHeaderMalformed);
            }
            other => panic!("expected auth failure, got {other:?}"),
        }
        assert_eq!(keys.fetches(), 0);
    }
}
