//! Discovery document fetcher
//!
//! One fetch per document URI for the lifetime of the process; the cache
//! is a concurrent map keyed by the full document URI, so two definitions
//! pointing at the same provider share a single fetch. Racing writers may
//! both fetch once; the recomputation is idempotent and harmless.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::{ProviderMetadata, WELL_KNOWN_SUFFIX};
use crate::error::{OidcError, Result};

/// Fetches and caches provider discovery documents.
pub struct MetadataFetcher {
    client: reqwest::Client,
    cache: DashMap<String, Arc<ProviderMetadata>>,
}

impl MetadataFetcher {
    /// Create a fetcher with the given connect/read timeouts.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|e| OidcError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            cache: DashMap::new(),
        })
    }

    /// Resolve the discovery document for a provider base URI.
    ///
    /// An empty URI yields an empty document: the caller falls back to its
    /// statically configured endpoints. Otherwise the standard well-known
    /// suffix is appended (unless already present) and the document is
    /// fetched once and cached.
    ///
    /// # Errors
    ///
    /// A network failure or non-success status is a fatal configuration
    /// error; discovery is resolved at mechanism startup and never retried.
    pub async fn resolve(&self, provider_uri: &str) -> Result<Arc<ProviderMetadata>> {
        if provider_uri.is_empty() {
            debug!("no provider URI configured, using static endpoint configuration");
            return Ok(Arc::new(ProviderMetadata::default()));
        }

        let document_uri = document_uri(provider_uri);

        if let Some(cached) = self.cache.get(&document_uri) {
            debug!(document_uri = %document_uri, "using cached provider metadata");
            return Ok(Arc::clone(&cached));
        }

        info!(document_uri = %document_uri, "fetching provider discovery document");

        let response = self
            .client
            .get(&document_uri)
            .send()
            .await
            .map_err(|e| {
                warn!(document_uri = %document_uri, error = %e, "discovery fetch failed");
                OidcError::config(format!("failed to fetch discovery document {document_uri}: {e}"))
            })?;

        if !response.status().is_success() {
            warn!(
                document_uri = %document_uri,
                status = %response.status(),
                "discovery endpoint returned error status"
            );
            return Err(OidcError::config(format!(
                "discovery endpoint {document_uri} returned status {}",
                response.status()
            )));
        }

        let metadata: ProviderMetadata = response.json().await.map_err(|e| {
            OidcError::config(format!("invalid discovery document at {document_uri}: {e}"))
        })?;

        info!(
            document_uri = %document_uri,
            issuer = metadata.issuer.as_deref().unwrap_or(""),
            "provider metadata resolved"
        );

        let metadata = Arc::new(metadata);
        self.cache.insert(document_uri, Arc::clone(&metadata));
        Ok(metadata)
    }
}

/// Append the well-known suffix unless the URI already carries it.
fn document_uri(provider_uri: &str) -> String {
    if provider_uri.ends_with(WELL_KNOWN_SUFFIX) {
        provider_uri.to_string()
    } else {
        format!("{}{}", provider_uri.trim_end_matches('/'), WELL_KNOWN_SUFFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_appended_once() {
        assert_eq!(
            document_uri("https://op.example.com"),
            "https://op.example.com/.well-known/openid-configuration"
        );
        assert_eq!(
            document_uri("https://op.example.com/"),
            "https://op.example.com/.well-known/openid-configuration"
        );
        assert_eq!(
            document_uri("https://op.example.com/.well-known/openid-configuration"),
            "https://op.example.com/.well-known/openid-configuration"
        );
    }

    #[tokio::test]
    async fn empty_uri_yields_empty_document() {
        let fetcher =
            MetadataFetcher::new(Duration::from_millis(500), Duration::from_millis(500))
                .expect("fetcher builds");
        let metadata = fetcher.resolve("").await.expect("empty document");
        assert!(metadata.issuer.is_none());
        assert!(metadata.token_endpoint.is_none());
    }
}
