//! Shared test utilities.
//!
//! Fixed RSA key pairs, token builders, and an in-memory
//! [`KeySetFetcher`] whose published keys can be swapped mid-test to
//! simulate rotation. Feature-gated behind `testutil`; enable it from
//! another crate's dev-dependencies:
//!
//! ```toml
//! [dev-dependencies]
//! scopegate-auth = { path = "../scopegate-auth", features = ["testutil"] }
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};

use crate::claims::ClaimSet;
use crate::error::{AuthErrorKind, AuthFailure};
use crate::extract::BearerToken;
use crate::guard::AuthGuard;
use crate::jwks::{KeySetFetcher, KeySetResolver, SigningKey, parse_key_set};
use crate::verifier::TokenVerifier;

/// Issuer every test token carries.
pub const TEST_ISSUER: &str = "https://idp.scopegate.test/";
/// Audience every test token carries.
pub const TEST_AUDIENCE: &str = "drinks";
/// Subject every test token carries.
pub const TEST_SUBJECT: &str = "auth0|user-1";

/// One of three fixed 2048-bit RSA key pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKey {
    /// First key.
    A,
    /// Second key, usually the "rotated in" one.
    B,
    /// Third key, never published unless a test does so.
    C,
}

impl TestKey {
    /// Key identifier used in tokens and the key set.
    #[must_use]
    pub const fn kid(self) -> &'static str {
        match self {
            Self::A => "test-key-a",
            Self::B => "test-key-b",
            Self::C => "test-key-c",
        }
    }

    /// Base64url RSA modulus.
    #[must_use]
    pub fn modulus(self) -> &'static str {
        let modulus = match self {
            Self::A => include_str!("../testdata/rsa_a.n"),
            Self::B => include_str!("../testdata/rsa_b.n"),
            Self::C => include_str!("../testdata/rsa_c.n"),
        };
        modulus.trim()
    }

    fn private_pem(self) -> &'static [u8] {
        match self {
            Self::A => include_bytes!("../testdata/rsa_a.pem"),
            Self::B => include_bytes!("../testdata/rsa_b.pem"),
            Self::C => include_bytes!("../testdata/rsa_c.pem"),
        }
    }

    /// Public JWK as a provider would publish it.
    #[must_use]
    pub fn jwk(self) -> Value {
        self.jwk_with_kid(self.kid())
    }

    /// Public JWK published under a different `kid`.
    #[must_use]
    pub fn jwk_with_kid(self, kid: &str) -> Value {
        json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": kid,
            "n": self.modulus(),
            "e": "AQAB",
        })
    }

    /// Sign `claims` with RS256 under this key's `kid`.
    ///
    /// # Panics
    ///
    /// Panics if the fixture key cannot be loaded.
    #[must_use]
    pub fn sign(self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid().to_string());
        self.sign_with_header(&header, claims)
    }

    /// Sign `claims` with an explicit header.
    ///
    /// # Panics
    ///
    /// Panics if the fixture key cannot be loaded or encoding fails.
    #[must_use]
    pub fn sign_with_header(self, header: &Header, claims: &Value) -> String {
        let key = EncodingKey::from_rsa_pem(self.private_pem()).expect("fixture RSA key");
        jsonwebtoken::encode(header, claims, &key).expect("encode test token")
    }
}

/// Claims that pass every check, granting `permissions`.
#[must_use]
pub fn valid_claims(permissions: &[&str]) -> Value {
    let mut claims = claims_without_permissions();
    claims["permissions"] = json!(permissions);
    claims
}

/// Valid claims with no `permissions` claim at all.
#[must_use]
pub fn claims_without_permissions() -> Value {
    let now = Utc::now().timestamp();
    json!({
        "iss": TEST_ISSUER,
        "sub": TEST_SUBJECT,
        "aud": TEST_AUDIENCE,
        "iat": now,
        "exp": now + 3600,
    })
}

/// Build `{header}.{payload}.` with an empty signature, for attack tests.
///
/// # Panics
///
/// Panics if JSON serialization fails.
#[must_use]
pub fn craft_raw_token(header: &Value, payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header).expect("header json"));
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload).expect("payload json"));
    format!("{header}.{payload}.")
}

/// Published key set held in memory.
///
/// Clones share state, so a test can keep one handle to publish or break
/// the key set while the resolver owns another.
#[derive(Debug, Clone, Default)]
pub struct MockKeySet {
    inner: Arc<MockInner>,
}

#[derive(Debug, Default)]
struct MockInner {
    documents: Mutex<Vec<Value>>,
    failing: AtomicBool,
    fetches: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl MockKeySet {
    /// Publish the given test keys.
    #[must_use]
    pub fn new(keys: Vec<TestKey>) -> Self {
        Self::from_documents(keys.into_iter().map(TestKey::jwk).collect())
    }

    /// Publish raw JWK documents.
    #[must_use]
    pub fn from_documents(documents: Vec<Value>) -> Self {
        let set = Self::default();
        *set.inner.documents.lock().expect("mock lock") = documents;
        set
    }

    /// Delay every fetch by `delay`.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.inner.delay.lock().expect("mock lock") = Some(delay);
        self
    }

    /// Replace the published keys.
    pub fn publish(&self, keys: Vec<TestKey>) {
        *self.inner.documents.lock().expect("mock lock") =
            keys.into_iter().map(TestKey::jwk).collect();
    }

    /// Make fetches fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of fetches served so far, failed ones included.
    #[must_use]
    pub fn fetches(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    /// The current key-set document.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn document(&self) -> Value {
        json!({ "keys": self.inner.documents.lock().expect("mock lock").clone() })
    }
}

#[async_trait]
impl KeySetFetcher for MockKeySet {
    async fn fetch_keys(&self) -> Result<Vec<SigningKey>, AuthFailure> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);

        let delay = *self.inner.delay.lock().expect("mock lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(AuthFailure::new(
                AuthErrorKind::KeySetUnavailable,
                "mock key set is down",
            ));
        }

        parse_key_set(&self.document())
    }
}

/// Verifier over `keys` expecting the test issuer and audience.
#[must_use]
pub fn test_verifier(keys: &MockKeySet) -> TokenVerifier {
    let resolver = KeySetResolver::new(Arc::new(keys.clone()), Duration::from_secs(600));
    TokenVerifier::new(
        Arc::new(resolver),
        TEST_ISSUER,
        TEST_AUDIENCE,
        vec![Algorithm::RS256],
    )
}

/// Guard over `keys` expecting the test issuer and audience.
#[must_use]
pub fn test_guard(keys: &MockKeySet) -> AuthGuard {
    AuthGuard::new(Arc::new(test_verifier(keys)))
}

/// Verify `token` against `keys`, panicking on failure.
///
/// # Panics
///
/// Panics if verification fails.
pub async fn verify_with(keys: &MockKeySet, token: &str) -> ClaimSet {
    test_verifier(keys)
        .verify(&BearerToken::new(token))
        .await
        .expect("token should verify")
}
