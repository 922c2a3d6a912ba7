//! Token verification.
//!
//! Order matters here. Structure is checked first, then the declared
//! algorithm, then the key is resolved and the signature verified. Only a
//! token whose signature holds has its payload deserialised and its
//! standard claims compared against configuration.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::claims::{ClaimSet, REQUIRED_CLAIMS, RawClaims};
use crate::config::VerifierSettings;
use crate::error::{AuthErrorKind, AuthFailure, ConfigError};
use crate::extract::BearerToken;
use crate::jwks::{HttpKeySetFetcher, KeySetResolver};

/// The part of the JOSE header we act on.
#[derive(Debug, Deserialize)]
struct RawHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

/// A token split into its segments with the header and payload decoded.
#[derive(Debug)]
struct SplitToken<'a> {
    header: RawHeader,
    payload: Vec<u8>,
    signing_input: &'a str,
    signature: &'a str,
}

fn malformed(message: impl Into<String>) -> AuthFailure {
    AuthFailure::new(AuthErrorKind::TokenMalformed, message)
}

fn split_token(token: &str) -> Result<SplitToken<'_>, AuthFailure> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(malformed("Token must have three segments."));
    };

    if header.is_empty() || payload.is_empty() || signature.is_empty() {
        return Err(malformed("Token has an empty segment."));
    }

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| malformed("Token header is not valid base64url."))?;
    let raw_header: RawHeader = serde_json::from_slice(&header_bytes)
        .map_err(|_| malformed("Token header is not a valid JOSE header."))?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| malformed("Token payload is not valid base64url."))?;
    // Structural check only; nothing from the payload is trusted yet.
    let object: Map<String, Value> = serde_json::from_slice(&payload_bytes)
        .map_err(|_| malformed("Token payload is not a JSON object."))?;
    if let Some(claim) = REQUIRED_CLAIMS.iter().find(|c| !object.contains_key(**c)) {
        return Err(malformed(format!("Token is missing the '{claim}' claim.")));
    }

    URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| malformed("Token signature is not valid base64url."))?;

    Ok(SplitToken {
        header: raw_header,
        payload: payload_bytes,
        signing_input: &token[..header.len() + 1 + payload.len()],
        signature,
    })
}

/// Verifies bearer tokens against the provider's key set.
#[derive(Debug)]
pub struct TokenVerifier {
    resolver: Arc<KeySetResolver>,
    issuer: String,
    audience: String,
    algorithms: Vec<Algorithm>,
    leeway: Duration,
}

impl TokenVerifier {
    /// Create a verifier with zero expiry leeway.
    #[must_use]
    pub fn new(
        resolver: Arc<KeySetResolver>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        algorithms: Vec<Algorithm>,
    ) -> Self {
        Self {
            resolver,
            issuer: issuer.into(),
            audience: audience.into(),
            algorithms,
            leeway: Duration::ZERO,
        }
    }

    /// Tolerate `leeway` of clock skew on `exp`.
    #[must_use]
    pub const fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Build the verifier and an HTTP-backed resolver from settings.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn from_settings(settings: &VerifierSettings) -> Result<Self, ConfigError> {
        let fetcher = HttpKeySetFetcher::new(settings.jwks_url.clone(), settings.fetch_timeout)?;
        let resolver = KeySetResolver::new(Arc::new(fetcher), settings.cache_ttl)
            .with_fetch_timeout(settings.fetch_timeout)
            .with_refetch_cooldown(settings.refetch_cooldown);

        Ok(Self::new(
            Arc::new(resolver),
            settings.issuer.clone(),
            settings.audience.clone(),
            settings.algorithms.clone(),
        )
        .with_leeway(settings.leeway))
    }

    /// The key-set resolver behind this verifier.
    #[must_use]
    pub const fn resolver(&self) -> &Arc<KeySetResolver> {
        &self.resolver
    }

    /// Expected issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Expected audience.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Verify `token` and return its claims.
    ///
    /// # Errors
    ///
    /// Returns the first failed check as a typed [`AuthFailure`]; key
    /// resolution failures are passed through unchanged.
    pub async fn verify(&self, token: &BearerToken) -> Result<ClaimSet, AuthFailure> {
        let split = split_token(token.as_str())?;

        let algorithm = Algorithm::from_str(&split.header.alg)
            .ok()
            .filter(|alg| self.algorithms.contains(alg))
            .ok_or_else(|| {
                AuthFailure::new(
                    AuthErrorKind::UnsupportedAlgorithm,
                    format!("Token algorithm '{}' is not accepted.", split.header.alg),
                )
            })?;

        let kid = split
            .header
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| malformed("Token header has no key id."))?;

        let key = self.resolver.resolve(kid).await?;

        if let Some(pinned) = key.algorithm() {
            if pinned != algorithm {
                return Err(AuthFailure::new(
                    AuthErrorKind::UnsupportedAlgorithm,
                    format!("Key '{kid}' is not published for {algorithm:?}."),
                ));
            }
        }

        let signature_ok = jsonwebtoken::crypto::verify(
            split.signature,
            split.signing_input.as_bytes(),
            key.decoding_key(),
            algorithm,
        )
        .unwrap_or(false);
        if !signature_ok {
            tracing::debug!(kid = %kid, "Signature verification failed");
            return Err(AuthErrorKind::InvalidSignature.into());
        }

        let raw: RawClaims = serde_json::from_slice(&split.payload)
            .map_err(|e| malformed(format!("Token claims are invalid: {e}")))?;

        self.check_claims(&raw)?;

        tracing::debug!(kid = %kid, sub = %raw.sub, "Token verified");
        Ok(ClaimSet::from_verified(raw))
    }

    fn check_claims(&self, raw: &RawClaims) -> Result<(), AuthFailure> {
        let leeway = i64::try_from(self.leeway.as_secs()).unwrap_or(i64::MAX);
        let now = Utc::now().timestamp();
        if raw.exp <= now.saturating_sub(leeway) {
            return Err(AuthErrorKind::TokenExpired.into());
        }

        if !raw.aud.contains(&self.audience) {
            return Err(AuthErrorKind::InvalidAudience.into());
        }

        if raw.iss != self.issuer {
            return Err(AuthErrorKind::InvalidIssuer.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::testutil::{
        MockKeySet, TEST_AUDIENCE, TEST_ISSUER, TestKey, craft_raw_token, valid_claims,
    };

    fn verifier(keys: &MockKeySet) -> TokenVerifier {
        let resolver = KeySetResolver::new(Arc::new(keys.clone()), Duration::from_secs(600));
        TokenVerifier::new(
            Arc::new(resolver),
            TEST_ISSUER,
            TEST_AUDIENCE,
            vec![Algorithm::RS256],
        )
    }

    async fn verify(keys: &MockKeySet, token: &str) -> Result<ClaimSet, AuthFailure> {
        verifier(keys).verify(&BearerToken::new(token)).await
    }

    async fn kind(keys: &MockKeySet, token: &str) -> AuthErrorKind {
        verify(keys, token).await.unwrap_err().kind()
    }

    #[tokio::test]
    async fn test_valid_token() {
        let keys = MockKeySet::new(vec![TestKey::A]);
        let token = TestKey::A.sign(&valid_claims(&["get:drinks"]));

        let claims = verify(&keys, &token).await.unwrap();
        assert_eq!(claims.issuer(), TEST_ISSUER);
        assert_eq!(claims.subject(), "auth0|user-1");
        assert!(claims.audience().contains(TEST_AUDIENCE));
        assert!(claims.has_permission("get:drinks"));
    }

    #[tokio::test]
    async fn test_structural_failures_skip_key_set() {
        let keys = MockKeySet::new(vec![TestKey::A]);

        for token in ["abc", "a.b", "a.b.c.d", "..", "!!!.e30.c2ln"] {
            assert_eq!(kind(&keys, token).await, AuthErrorKind::TokenMalformed, "{token}");
        }

        let no_exp = TestKey::A.sign(&json!({
            "iss": TEST_ISSUER, "sub": "s", "aud": TEST_AUDIENCE
        }));
        assert_eq!(kind(&keys, &no_exp).await, AuthErrorKind::TokenMalformed);

        assert_eq!(keys.fetches(), 0);
    }

    #[tokio::test]
    async fn test_rejects_none_and_unaccepted_algorithms() {
        let keys = MockKeySet::new(vec![TestKey::A]);
        let claims = valid_claims(&["get:drinks"]);

        let none = craft_raw_token(&json!({"alg": "none", "kid": TestKey::A.kid()}), &claims);
        let none = format!("{none}c2ln");
        assert_eq!(kind(&keys, &none).await, AuthErrorKind::UnsupportedAlgorithm);

        let hs = craft_raw_token(&json!({"alg": "HS256", "kid": TestKey::A.kid()}), &claims);
        let hs = format!("{hs}c2ln");
        assert_eq!(kind(&keys, &hs).await, AuthErrorKind::UnsupportedAlgorithm);

        assert_eq!(keys.fetches(), 0);
    }

    #[tokio::test]
    async fn test_missing_kid_is_malformed() {
        let keys = MockKeySet::new(vec![TestKey::A]);
        let token = craft_raw_token(&json!({"alg": "RS256"}), &valid_claims(&[]));
        let token = format!("{token}c2ln");
        assert_eq!(kind(&keys, &token).await, AuthErrorKind::TokenMalformed);
    }

    #[tokio::test]
    async fn test_unknown_kid() {
        let keys = MockKeySet::new(vec![TestKey::A]);
        let token = TestKey::B.sign(&valid_claims(&["get:drinks"]));

        assert_eq!(kind(&keys, &token).await, AuthErrorKind::SigningKeyNotFound);
    }

    #[tokio::test]
    async fn test_wrong_key_material_fails_signature() {
        // Key B's material published under key A's kid.
        let keys = MockKeySet::from_documents(vec![TestKey::B.jwk_with_kid(TestKey::A.kid())]);
        let token = TestKey::A.sign(&valid_claims(&["get:drinks"]));

        assert_eq!(kind(&keys, &token).await, AuthErrorKind::InvalidSignature);
    }

    #[tokio::test]
    async fn test_tampered_payload_fails_signature() {
        let keys = MockKeySet::new(vec![TestKey::A]);
        let token = TestKey::A.sign(&valid_claims(&["get:drinks"]));
        let forged = TestKey::A.sign(&valid_claims(&["delete:drinks"]));

        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = forged.split('.').nth(1).unwrap();
        let tampered = parts.join(".");

        assert_eq!(kind(&keys, &tampered).await, AuthErrorKind::InvalidSignature);
    }

    #[tokio::test]
    async fn test_expired_token() {
        let keys = MockKeySet::new(vec![TestKey::A]);
        let mut claims = valid_claims(&["get:drinks"]);
        claims["exp"] = json!(Utc::now().timestamp() - 60);

        assert_eq!(
            kind(&keys, &TestKey::A.sign(&claims)).await,
            AuthErrorKind::TokenExpired
        );
    }

    #[tokio::test]
    async fn test_leeway_accepts_recently_expired() {
        let keys = MockKeySet::new(vec![TestKey::A]);
        let mut claims = valid_claims(&["get:drinks"]);
        claims["exp"] = json!(Utc::now().timestamp() - 10);

        let verifier = verifier(&keys).with_leeway(Duration::from_secs(120));
        let token = BearerToken::new(TestKey::A.sign(&claims));
        assert!(verifier.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_audience_and_issuer() {
        let keys = MockKeySet::new(vec![TestKey::A]);

        let mut claims = valid_claims(&[]);
        claims["aud"] = json!(["other-api", "another"]);
        assert_eq!(
            kind(&keys, &TestKey::A.sign(&claims)).await,
            AuthErrorKind::InvalidAudience
        );

        let mut claims = valid_claims(&[]);
        claims["aud"] = json!(["other-api", TEST_AUDIENCE]);
        assert!(verify(&keys, &TestKey::A.sign(&claims)).await.is_ok());

        let mut claims = valid_claims(&[]);
        claims["iss"] = json!("https://evil.example.com/");
        assert_eq!(
            kind(&keys, &TestKey::A.sign(&claims)).await,
            AuthErrorKind::InvalidIssuer
        );
    }

    #[tokio::test]
    async fn test_expiry_checked_before_audience() {
        let keys = MockKeySet::new(vec![TestKey::A]);
        let mut claims = valid_claims(&[]);
        claims["exp"] = json!(Utc::now().timestamp() - 60);
        claims["aud"] = json!("other-api");

        assert_eq!(
            kind(&keys, &TestKey::A.sign(&claims)).await,
            AuthErrorKind::TokenExpired
        );
    }

    #[tokio::test]
    async fn test_key_pinned_to_other_algorithm() {
        let mut jwk = TestKey::A.jwk();
        jwk["alg"] = json!("RS512");
        let keys = MockKeySet::from_documents(vec![jwk]);
        let token = TestKey::A.sign(&valid_claims(&[]));

        assert_eq!(kind(&keys, &token).await, AuthErrorKind::UnsupportedAlgorithm);
    }

    #[tokio::test]
    async fn test_verification_is_idempotent() {
        let keys = MockKeySet::new(vec![TestKey::A]);
        let verifier = verifier(&keys);
        let token = BearerToken::new(TestKey::A.sign(&valid_claims(&["get:drinks"])));

        let first = verifier.verify(&token).await.unwrap();
        let second = verifier.verify(&token).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(keys.fetches(), 1);
    }
}
