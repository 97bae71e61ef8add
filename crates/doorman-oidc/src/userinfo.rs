//! UserInfo endpoint client
//!
//! Fetches additional claims with the access token as a Bearer
//! credential. Only JSON responses are accepted, and the returned `sub`
//! must equal the authenticated subject — a mismatch means someone
//! substituted a token and is fatal.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::OpenIdConfiguration;
use crate::error::{OidcError, Result};

/// Client for the provider's UserInfo endpoint.
pub struct UserInfoController {
    configuration: Arc<OpenIdConfiguration>,
    http_client: reqwest::Client,
}

impl UserInfoController {
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(configuration: Arc<OpenIdConfiguration>) -> Result<Self> {
        let config = configuration.config();
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.read_timeout())
            .build()
            .map_err(|e| OidcError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            configuration,
            http_client,
        })
    }

    /// Fetch userinfo claims for the given access token.
    ///
    /// # Errors
    ///
    /// - configuration error when no userinfo endpoint is available;
    /// - protocol error on a non-success status;
    /// - validation error on a non-JSON response or a subject mismatch.
    pub async fn get_user_info(
        &self,
        access_token: &str,
        expected_subject: &str,
    ) -> Result<HashMap<String, serde_json::Value>> {
        let endpoint = self
            .configuration
            .provider()
            .userinfo_endpoint
            .clone()
            .ok_or_else(|| OidcError::config("provider has no userinfo endpoint"))?;

        debug!(endpoint = %endpoint, "fetching userinfo claims");

        let response = self
            .http_client
            .get(&endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                warn!(endpoint = %endpoint, error = %e, "userinfo call failed");
                OidcError::transport(format!("userinfo call failed: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(OidcError::protocol(
                "userinfo_error",
                format!("userinfo endpoint returned status {}", response.status()),
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("application/json") {
            // a JWT-formatted userinfo response is deliberately unsupported
            return Err(OidcError::validation(format!(
                "unsupported userinfo content type '{content_type}'"
            )));
        }

        let claims: HashMap<String, serde_json::Value> = response
            .json()
            .await
            .map_err(|e| OidcError::validation(format!("invalid userinfo document: {e}")))?;

        match claims.get("sub").and_then(|value| value.as_str()) {
            Some(sub) if sub == expected_subject => Ok(claims),
            Some(sub) => {
                warn!(
                    expected = expected_subject,
                    received = sub,
                    "userinfo subject mismatch"
                );
                Err(OidcError::validation(
                    "userinfo subject does not match the authenticated subject",
                ))
            }
            None => Err(OidcError::validation("userinfo response has no subject")),
        }
    }
}
