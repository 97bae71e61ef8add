//! Validation edge cases exercised through the full callback path

mod common;

use common::{CLIENT_ID, MockExchange, MockProvider, epoch_now, hs256_token, query_param, resolved_configuration};
use doorman_oidc::container::{AuthResult, Session};
use doorman_oidc::mechanism::OpenIdAuthenticationMechanism;
use doorman_oidc::verify::access_token_hash;
use doorman_oidc::OidcError;
use serde_json::json;

/// Issue the challenge and return (state, nonce, session, mechanism ref)
async fn begin(
    provider: &MockProvider,
    mechanism: &OpenIdAuthenticationMechanism,
) -> (String, String, std::sync::Arc<common::MockSession>) {
    let first = MockExchange::new("https://app.example.com/secret");
    mechanism.validate_request(&first).await.unwrap();
    let redirect = first.last_redirect().unwrap();
    (
        query_param(&redirect, "state").unwrap(),
        query_param(&redirect, "nonce").unwrap(),
        first.current_session().unwrap(),
    )
}

#[tokio::test]
async fn expired_id_token_fails_even_with_valid_signature() {
    let provider = MockProvider::start().await;
    let configuration =
        resolved_configuration(&provider, |c| c.redirect_to_original_resource = false).await;
    let mechanism = OpenIdAuthenticationMechanism::new(configuration).unwrap();
    let (state, nonce, session) = begin(&provider, &mechanism).await;

    let now = epoch_now();
    let id_token = hs256_token(&json!({
        "iss": provider.issuer(),
        "sub": "user-1",
        "aud": CLIENT_ID,
        "exp": now - 300, // beyond the one-minute skew
        "iat": now - 600,
        "nonce": nonce,
    }));
    provider.mock_code_exchange(&id_token, "at-1", None).await;

    let callback = MockExchange::new(&format!(
        "https://app.example.com/callback?state={state}&code=c1"
    ))
    .with_session(session);
    let err = mechanism.validate_request(&callback).await.unwrap_err();
    assert!(matches!(err, OidcError::Validation(_)));
    assert!(callback.established_identities().is_empty());
}

#[tokio::test]
async fn nonce_mismatch_fails_and_stored_nonce_is_removed() {
    let provider = MockProvider::start().await;
    let configuration =
        resolved_configuration(&provider, |c| c.redirect_to_original_resource = false).await;
    let mechanism = OpenIdAuthenticationMechanism::new(configuration).unwrap();
    let (state, _nonce, session) = begin(&provider, &mechanism).await;

    // the nonce claim does not match the stored nonce's hash
    let id_token = hs256_token(&provider.id_claims("user-1", Some("not-the-right-hash")));
    provider.mock_code_exchange(&id_token, "at-1", None).await;

    assert!(session.attribute("oidc.storage.oidc.nonce").is_some());

    let callback = MockExchange::new(&format!(
        "https://app.example.com/callback?state={state}&code=c1"
    ))
    .with_session(std::sync::Arc::clone(&session));
    let err = mechanism.validate_request(&callback).await.unwrap_err();
    assert!(matches!(err, OidcError::Validation(_)));

    // consumed exactly once, even on failure
    assert!(session.attribute("oidc.storage.oidc.nonce").is_none());
    assert!(session.openid_context().is_none());
}

#[tokio::test]
async fn at_hash_binding_is_enforced() {
    let provider = MockProvider::start().await;
    let configuration =
        resolved_configuration(&provider, |c| c.redirect_to_original_resource = false).await;
    let mechanism = OpenIdAuthenticationMechanism::new(configuration).unwrap();
    let (state, nonce, session) = begin(&provider, &mechanism).await;

    // at_hash computed over a *different* access token than the one
    // actually returned
    let mut claims = provider.id_claims("user-1", Some(&nonce));
    claims["at_hash"] = json!(access_token_hash("some-other-token", "HS256").unwrap());
    let id_token = hs256_token(&claims);
    provider.mock_code_exchange(&id_token, "at-1", None).await;

    let callback = MockExchange::new(&format!(
        "https://app.example.com/callback?state={state}&code=c1"
    ))
    .with_session(session);
    let err = mechanism.validate_request(&callback).await.unwrap_err();
    assert!(matches!(err, OidcError::Validation(_)));
}

#[tokio::test]
async fn matching_at_hash_passes() {
    let provider = MockProvider::start().await;
    let configuration =
        resolved_configuration(&provider, |c| c.redirect_to_original_resource = false).await;
    let mechanism = OpenIdAuthenticationMechanism::new(configuration).unwrap();
    let (state, nonce, session) = begin(&provider, &mechanism).await;

    let mut claims = provider.id_claims("user-1", Some(&nonce));
    claims["at_hash"] = json!(access_token_hash("at-1", "HS256").unwrap());
    let id_token = hs256_token(&claims);
    provider.mock_code_exchange(&id_token, "at-1", None).await;

    let callback = MockExchange::new(&format!(
        "https://app.example.com/callback?state={state}&code=c1"
    ))
    .with_session(session);
    let result = mechanism.validate_request(&callback).await.unwrap();
    assert!(matches!(result, AuthResult::Authenticated { .. }));
}

#[tokio::test]
async fn wrong_audience_is_rejected() {
    let provider = MockProvider::start().await;
    let configuration =
        resolved_configuration(&provider, |c| c.redirect_to_original_resource = false).await;
    let mechanism = OpenIdAuthenticationMechanism::new(configuration).unwrap();
    let (state, nonce, session) = begin(&provider, &mechanism).await;

    let now = epoch_now();
    let id_token = hs256_token(&json!({
        "iss": provider.issuer(),
        "sub": "user-1",
        "aud": "a-different-client",
        "exp": now + 3600,
        "iat": now,
        "nonce": nonce,
    }));
    provider.mock_code_exchange(&id_token, "at-1", None).await;

    let callback = MockExchange::new(&format!(
        "https://app.example.com/callback?state={state}&code=c1"
    ))
    .with_session(session);
    let err = mechanism.validate_request(&callback).await.unwrap_err();
    assert!(matches!(err, OidcError::Validation(_)));
}

#[tokio::test]
async fn tampered_signature_is_rejected() {
    let provider = MockProvider::start().await;
    let configuration =
        resolved_configuration(&provider, |c| c.redirect_to_original_resource = false).await;
    let mechanism = OpenIdAuthenticationMechanism::new(configuration).unwrap();
    let (state, nonce, session) = begin(&provider, &mechanism).await;

    // signed with a key that is not the client secret
    let id_token = jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &provider.id_claims("user-1", Some(&nonce)),
        &jsonwebtoken::EncodingKey::from_secret(b"attacker-key"),
    )
    .unwrap();
    provider.mock_code_exchange(&id_token, "at-1", None).await;

    let callback = MockExchange::new(&format!(
        "https://app.example.com/callback?state={state}&code=c1"
    ))
    .with_session(session);
    let err = mechanism.validate_request(&callback).await.unwrap_err();
    assert!(matches!(err, OidcError::Validation(_)));
}
