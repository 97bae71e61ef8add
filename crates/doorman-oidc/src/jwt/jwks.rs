//! JWKS fetching and caching
//!
//! Keys rotate, so the cached set has a TTL and an unknown `kid` triggers
//! one rate-limited refresh before the lookup fails. The refresh interval
//! floor keeps a flood of bad tokens from hammering the provider.

use std::time::{Duration, SystemTime};

use jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{OidcError, Result};

/// How long a fetched key set stays fresh
const CACHE_TTL: Duration = Duration::from_secs(600);

/// Floor between two forced refreshes
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct CachedJwks {
    jwks: JwkSet,
    cached_at: SystemTime,
}

impl CachedJwks {
    fn is_valid(&self) -> bool {
        match SystemTime::now().duration_since(self.cached_at) {
            Ok(age) => age < CACHE_TTL,
            Err(_) => false, // clock went backwards, invalidate
        }
    }
}

/// Fetches and caches the provider's JSON Web Key Set.
#[derive(Debug)]
pub struct JwksClient {
    jwks_uri: String,
    http_client: reqwest::Client,
    cache: RwLock<Option<CachedJwks>>,
    last_refresh: RwLock<Option<SystemTime>>,
}

impl JwksClient {
    /// Create a client for one key-set URL with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(
        jwks_uri: String,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|e| OidcError::config(format!("failed to build JWKS HTTP client: {e}")))?;
        Ok(Self {
            jwks_uri,
            http_client,
            cache: RwLock::new(None),
            last_refresh: RwLock::new(None),
        })
    }

    /// The key-set URL
    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Get the key set, from cache when fresh.
    pub async fn get_jwks(&self) -> Result<JwkSet> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    debug!(jwks_uri = %self.jwks_uri, "using cached JWKS");
                    return Ok(cached.jwks.clone());
                }
            }
        }
        self.fetch_and_cache().await
    }

    /// Force a refresh, rate limited. Used when a token names a key the
    /// cached set does not contain (key rotation).
    pub async fn refresh(&self) -> Result<JwkSet> {
        {
            let last_refresh = self.last_refresh.read().await;
            if let Some(last) = *last_refresh {
                if let Ok(since_last) = SystemTime::now().duration_since(last) {
                    if since_last < MIN_REFRESH_INTERVAL {
                        warn!(
                            jwks_uri = %self.jwks_uri,
                            since_last_ms = since_last.as_millis(),
                            "JWKS refresh rate limited, using cache"
                        );
                        return self.get_jwks().await;
                    }
                }
            }
        }
        self.fetch_and_cache().await
    }

    /// Find the verification key for a token.
    ///
    /// With a `kid`, the set is searched by key id, refreshing once on a
    /// miss. Without one, a single-key set is used as-is and a multi-key
    /// set is searched by declared algorithm.
    pub async fn find_key(&self, kid: Option<&str>, alg: &str) -> Result<Jwk> {
        let jwks = self.get_jwks().await?;
        if let Some(key) = select_key(&jwks, kid, alg) {
            return Ok(key.clone());
        }

        // Unknown key id: the provider may have rotated keys since the
        // last fetch.
        debug!(jwks_uri = %self.jwks_uri, kid = kid.unwrap_or(""), "key not in cached JWKS, refreshing");
        let jwks = self.refresh().await?;
        select_key(&jwks, kid, alg).cloned().ok_or_else(|| {
            OidcError::validation(format!(
                "no verification key for kid '{}' (alg {alg}) in {}",
                kid.unwrap_or("<none>"),
                self.jwks_uri
            ))
        })
    }

    async fn fetch_and_cache(&self) -> Result<JwkSet> {
        info!(jwks_uri = %self.jwks_uri, "fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| {
                warn!(jwks_uri = %self.jwks_uri, error = %e, "JWKS fetch failed");
                OidcError::transport(format!("JWKS fetch failed: {e}"))
            })?;

        if !response.status().is_success() {
            warn!(
                jwks_uri = %self.jwks_uri,
                status = %response.status(),
                "JWKS endpoint returned error status"
            );
            return Err(OidcError::transport(format!(
                "JWKS endpoint {} returned status {}",
                self.jwks_uri,
                response.status()
            )));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| OidcError::validation(format!("invalid JWKS document: {e}")))?;

        info!(jwks_uri = %self.jwks_uri, key_count = jwks.keys.len(), "JWKS fetched");

        {
            let mut cache = self.cache.write().await;
            *cache = Some(CachedJwks {
                jwks: jwks.clone(),
                cached_at: SystemTime::now(),
            });
        }
        {
            let mut last_refresh = self.last_refresh.write().await;
            *last_refresh = Some(SystemTime::now());
        }

        Ok(jwks)
    }
}

fn select_key<'a>(jwks: &'a JwkSet, kid: Option<&str>, alg: &str) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => jwks.find(kid),
        None if jwks.keys.len() == 1 => jwks.keys.first(),
        None => jwks.keys.iter().find(|key| {
            key.common
                .key_algorithm
                .map(|key_alg| key_alg.to_string() == alg)
                .unwrap_or(false)
        }),
    }
}
