//! Authorization-request and end-session URL building

use url::Url;

use crate::config::{OpenIdConfiguration, resolve_base_url};
use crate::error::{OidcError, Result};
use crate::state::OpenIdState;

/// Build the Authorization Endpoint redirect URL.
///
/// `nonce_hash` is the hashed nonce transmitted on the wire; the raw
/// nonce stays server-side.
pub fn build_authorization_url(
    configuration: &OpenIdConfiguration,
    redirect_uri: &str,
    state: &OpenIdState,
    nonce_hash: Option<&str>,
) -> Result<String> {
    let config = configuration.config();
    let mut url = Url::parse(configuration.authorization_endpoint()).map_err(|e| {
        OidcError::config(format!(
            "invalid authorization endpoint '{}': {e}",
            configuration.authorization_endpoint()
        ))
    })?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("response_type", &config.response_type);
        query.append_pair("client_id", &config.client_id);
        query.append_pair("redirect_uri", redirect_uri);
        query.append_pair("scope", &config.scopes.join(" "));
        query.append_pair("state", state.value());
        if let Some(nonce) = nonce_hash {
            query.append_pair("nonce", nonce);
        }
        if let Some(response_mode) = &config.response_mode {
            query.append_pair("response_mode", response_mode);
        }
        if let Some(display) = config.display {
            query.append_pair("display", display.as_str());
        }
        if !config.prompt.is_empty() {
            let prompt = config
                .prompt
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            query.append_pair("prompt", &prompt);
        }
        for (key, value) in configuration.extra_parameters() {
            query.append_pair(key, value);
        }
    }

    Ok(url.into())
}

/// Build the provider end-session redirect URL for RP-initiated logout.
pub fn build_end_session_url(
    configuration: &OpenIdConfiguration,
    end_session_endpoint: &str,
    id_token_hint: Option<&str>,
    base_url: &str,
) -> Result<String> {
    let mut url = Url::parse(end_session_endpoint).map_err(|e| {
        OidcError::config(format!(
            "invalid end-session endpoint '{end_session_endpoint}': {e}"
        ))
    })?;

    {
        let mut query = url.query_pairs_mut();
        if let Some(hint) = id_token_hint {
            query.append_pair("id_token_hint", hint);
        }
        if let Some(redirect) = &configuration.config().logout.redirect_uri {
            query.append_pair(
                "post_logout_redirect_uri",
                &resolve_base_url(redirect, base_url),
            );
        }
    }

    Ok(url.into())
}
