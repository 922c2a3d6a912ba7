//! Key-set resolution.
//!
//! [`KeySetResolver`] owns the process-wide cache of the identity provider's
//! published signing keys. Readers take a cheap clone of the current
//! [`Arc`] snapshot; a refetch builds a complete new snapshot and swaps the
//! pointer, so nobody ever observes a half-updated map. Refetches are
//! serialised through a single mutex and a waiter that finds a snapshot
//! newer than the one it saw uses that instead of fetching again.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use jsonwebtoken::jwk::{Jwk, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use reqwest::{Client, Url};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::error::{AuthErrorKind, AuthFailure, ConfigError};

/// Default bound on a single fetch when none is configured.
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// One verification key from the published set.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    algorithm: Option<Algorithm>,
    key: DecodingKey,
}

impl SigningKey {
    /// Key identifier.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Algorithm the provider pinned this key to, if any.
    #[must_use]
    pub const fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Key material for signature verification.
    #[must_use]
    pub const fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Source of the published key set.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    /// Fetch and parse the current key set.
    async fn fetch_keys(&self) -> Result<Vec<SigningKey>, AuthFailure>;
}

/// Fetches the key set over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpKeySetFetcher {
    client: Client,
    url: Url,
}

impl HttpKeySetFetcher {
    /// Create a fetcher whose requests are bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, ConfigError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    /// The key-set endpoint.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch_keys(&self) -> Result<Vec<SigningKey>, AuthFailure> {
        tracing::debug!("fetching key set from {}", self.url);

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| unavailable(format!("Failed to fetch key set: {e}")))?;

        let document = response
            .json::<Value>()
            .await
            .map_err(|e| unavailable(format!("Failed to parse key set: {e}")))?;

        parse_key_set(&document)
    }
}

fn unavailable(message: String) -> AuthFailure {
    AuthFailure::new(AuthErrorKind::KeySetUnavailable, message)
}

/// Parse a `{"keys": [...]}` document into verification keys.
///
/// Entries that are not usable signature keys are skipped rather than
/// failing the whole set, so one exotic key published next to the real ones
/// does not take verification down.
///
/// # Errors
///
/// Returns `KeySetUnavailable` if there is no `keys` array or no usable key.
pub fn parse_key_set(document: &Value) -> Result<Vec<SigningKey>, AuthFailure> {
    let Some(entries) = document.get("keys").and_then(Value::as_array) else {
        return Err(unavailable(
            "Key set document has no 'keys' array".to_string(),
        ));
    };

    let keys: Vec<SigningKey> = entries.iter().filter_map(parse_key).collect();

    if keys.is_empty() {
        return Err(unavailable("Key set contains no usable signing key".to_string()));
    }

    Ok(keys)
}

fn parse_key(entry: &Value) -> Option<SigningKey> {
    let algorithm = match entry.get("alg").and_then(Value::as_str) {
        Some(name) => match Algorithm::from_str(name) {
            Ok(algorithm) => Some(algorithm),
            Err(_) => {
                tracing::debug!("Ignoring key with non-signature algorithm {name}");
                return None;
            }
        },
        None => None,
    };

    let jwk: Jwk = match serde_json::from_value(entry.clone()) {
        Ok(jwk) => jwk,
        Err(e) => {
            tracing::debug!("Ignoring invalid JWK: {e}");
            return None;
        }
    };

    let Some(kid) = jwk.common.key_id.clone() else {
        tracing::debug!("Ignoring JWK without kid");
        return None;
    };

    if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
        tracing::debug!(kid = %kid, "Ignoring encryption key");
        return None;
    }

    match DecodingKey::from_jwk(&jwk) {
        Ok(key) => Some(SigningKey {
            kid,
            algorithm,
            key,
        }),
        Err(e) => {
            tracing::debug!(kid = %kid, "Ignoring JWK with unusable key material: {e}");
            None
        }
    }
}

/// A complete, immutable view of the key set at one fetch.
#[derive(Debug)]
struct KeySnapshot {
    keys: HashMap<String, SigningKey>,
    fetched_at: Instant,
    generation: u64,
}

impl KeySnapshot {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Caching resolver from key identifier to [`SigningKey`].
pub struct KeySetResolver {
    fetcher: Arc<dyn KeySetFetcher>,
    ttl: Duration,
    fetch_timeout: Duration,
    snapshot: RwLock<Option<Arc<KeySnapshot>>>,
    refresh_lock: Mutex<()>,
    miss_limiter: Option<DefaultDirectRateLimiter>,
    fetches: AtomicU64,
    generations: AtomicU64,
}

impl KeySetResolver {
    /// Create an empty resolver; the first lookup fetches.
    #[must_use]
    pub fn new(fetcher: Arc<dyn KeySetFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            snapshot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            miss_limiter: None,
            fetches: AtomicU64::new(0),
            generations: AtomicU64::new(0),
        }
    }

    /// Bound every fetch by `timeout`, whatever the fetcher does internally.
    #[must_use]
    pub const fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Allow at most one unknown-kid refetch per `cooldown`.
    ///
    /// A zero cooldown leaves every miss free to refetch.
    #[must_use]
    pub fn with_refetch_cooldown(mut self, cooldown: Duration) -> Self {
        self.miss_limiter = Quota::with_period(cooldown).map(RateLimiter::direct);
        self
    }

    /// Look up the key for `kid`.
    ///
    /// An empty or expired cache is refreshed first. A miss against a fresh
    /// cache triggers one refetch; a miss after that is final.
    ///
    /// # Errors
    ///
    /// `SigningKeyNotFound` if no key carries `kid`, `KeySetUnavailable` if
    /// the key set could not be fetched and no stale key can stand in.
    pub async fn resolve(&self, kid: &str) -> Result<SigningKey, AuthFailure> {
        let current = self.current().await;
        let observed = current.as_ref().map(|s| s.generation);

        if let Some(snapshot) = current.as_ref().filter(|s| s.is_fresh(self.ttl)) {
            if let Some(key) = snapshot.keys.get(kid) {
                return Ok(key.clone());
            }

            if !self.miss_refetch_allowed() {
                tracing::debug!(kid = %kid, "Unknown key id, refetch cooling down");
                return Err(key_not_found(kid));
            }

            tracing::debug!(kid = %kid, "Unknown key id, refetching key set");
            let refreshed = self.refresh_after(observed).await?;
            return refreshed
                .keys
                .get(kid)
                .cloned()
                .ok_or_else(|| key_not_found(kid));
        }

        match self.refresh_after(observed).await {
            Ok(refreshed) => refreshed
                .keys
                .get(kid)
                .cloned()
                .ok_or_else(|| key_not_found(kid)),
            Err(failure) => match current.as_ref().and_then(|s| s.keys.get(kid)) {
                Some(stale) => {
                    tracing::warn!(kid = %kid, "Key set refresh failed, using stale key: {failure}");
                    Ok(stale.clone())
                }
                None => Err(failure),
            },
        }
    }

    /// Fetch unconditionally and replace the snapshot.
    ///
    /// # Errors
    ///
    /// Returns `KeySetUnavailable` if the fetch fails; the old snapshot stays.
    pub async fn refresh(&self) -> Result<usize, AuthFailure> {
        let _guard = self.refresh_lock.lock().await;
        let snapshot = self.fetch_and_swap().await?;
        Ok(snapshot.keys.len())
    }

    /// Populate the cache if it is empty.
    ///
    /// # Errors
    ///
    /// Returns `KeySetUnavailable` if the initial fetch fails.
    pub async fn warm(&self) -> Result<usize, AuthFailure> {
        let snapshot = self.refresh_after(None).await?;
        Ok(snapshot.keys.len())
    }

    /// Drop the cached snapshot; the next lookup fetches.
    pub async fn invalidate(&self) {
        *self.snapshot.write().await = None;
        tracing::info!("Key set cache invalidated");
    }

    /// Key identifiers in the current snapshot, sorted.
    pub async fn key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .current()
            .await
            .map(|s| s.keys.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Keys in the current snapshot, sorted by kid.
    pub async fn keys(&self) -> Vec<SigningKey> {
        let mut keys: Vec<SigningKey> = self
            .current()
            .await
            .map(|s| s.keys.values().cloned().collect())
            .unwrap_or_default();
        keys.sort_by(|a, b| a.kid.cmp(&b.kid));
        keys
    }

    /// Number of fetch attempts made so far.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    async fn current(&self) -> Option<Arc<KeySnapshot>> {
        self.snapshot.read().await.clone()
    }

    fn miss_refetch_allowed(&self) -> bool {
        self.miss_limiter
            .as_ref()
            .is_none_or(|limiter| limiter.check().is_ok())
    }

    /// Refetch unless another caller already replaced generation `observed`
    /// with a fresh snapshot while we waited for the lock.
    async fn refresh_after(&self, observed: Option<u64>) -> Result<Arc<KeySnapshot>, AuthFailure> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.current().await {
            if Some(current.generation) != observed && current.is_fresh(self.ttl) {
                return Ok(current);
            }
        }

        self.fetch_and_swap().await
    }

    /// Callers must hold `refresh_lock`.
    async fn fetch_and_swap(&self) -> Result<Arc<KeySnapshot>, AuthFailure> {
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let keys = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch_keys()).await
        {
            Ok(Ok(keys)) => keys,
            Ok(Err(failure)) => {
                tracing::warn!("Key set fetch failed: {failure}");
                return Err(failure);
            }
            Err(_) => {
                tracing::warn!("Key set fetch timed out after {:?}", self.fetch_timeout);
                return Err(unavailable(format!(
                    "Key set fetch timed out after {}s",
                    self.fetch_timeout.as_secs_f64()
                )));
            }
        };

        let mut map = HashMap::with_capacity(keys.len());
        for key in keys {
            match map.entry(key.kid.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(key);
                }
                Entry::Occupied(_) => {
                    tracing::warn!(kid = %key.kid, "Duplicate key id in key set, keeping the first");
                }
            }
        }

        // Never reused, even across `invalidate`.
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let mut slot = self.snapshot.write().await;
        let snapshot = Arc::new(KeySnapshot {
            keys: map,
            fetched_at: Instant::now(),
            generation,
        });
        *slot = Some(Arc::clone(&snapshot));
        drop(slot);

        tracing::info!(keys = snapshot.keys.len(), generation, "Key set refreshed");
        Ok(snapshot)
    }
}

fn key_not_found(kid: &str) -> AuthFailure {
    AuthFailure::new(
        AuthErrorKind::SigningKeyNotFound,
        format!("Unable to find the appropriate key (kid '{kid}')."),
    )
}

impl fmt::Debug for KeySetResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySetResolver")
            .field("ttl", &self.ttl)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("throttled", &self.miss_limiter.is_some())
            .field("fetches", &self.fetch_count())
            .finish_non_exhaustive()
    }
}
