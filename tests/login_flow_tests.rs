//! Authorization redirect and code exchange
//!
//! Covers:
//! - authorize URL shape and PKCE binding
//! - end-to-end login with expiry derivation
//! - callback handling: missing code, provider errors, state checks

mod common;

use collabtodo_auth::Error;
use collabtodo_auth::config::SessionConfig;
use collabtodo_auth::oauth::{
    KeyValueStore, Navigation, PKCE_STATE_KEY, PKCE_VERIFIER_KEY, TOKENS_KEY, TokenRequest, pkce,
};
use common::{CLIENT_ID, DOMAIN, Harness, REDIRECT_URI, ScriptedEndpoint, response};
use pretty_assertions::assert_eq;

/// The authorize redirect carries every required parameter
#[test]
fn test_begin_login_builds_authorize_url() {
    let h = Harness::new(1000);
    let url = h.client.begin_login().unwrap();

    assert_eq!(url.host_str(), Some(DOMAIN));
    assert_eq!(url.path(), "/oauth2/authorize");
    assert_eq!(h.navigator.last_navigation(), Some(url));

    assert_eq!(h.authorize_param("client_id").as_deref(), Some(CLIENT_ID));
    assert_eq!(h.authorize_param("response_type").as_deref(), Some("code"));
    assert_eq!(h.authorize_param("scope").as_deref(), Some("openid email profile"));
    assert_eq!(h.authorize_param("redirect_uri").as_deref(), Some(REDIRECT_URI));
    assert_eq!(h.authorize_param("code_challenge_method").as_deref(), Some("S256"));
}

/// The challenge sent is derived from the stored verifier, and state is stored
#[test]
fn test_begin_login_binds_challenge_to_stored_verifier() {
    let h = Harness::new(1000);
    h.client.begin_login().unwrap();

    let verifier = h.ephemeral.get(PKCE_VERIFIER_KEY).unwrap().unwrap();
    assert_eq!(verifier.len(), 96);
    assert_eq!(
        h.authorize_param("code_challenge"),
        Some(pkce::challenge_for(&verifier))
    );

    let state = h.ephemeral.get(PKCE_STATE_KEY).unwrap().unwrap();
    assert_eq!(h.authorize_param("state"), Some(state));
}

/// Every attempt gets a fresh verifier and state
#[test]
fn test_begin_login_replaces_previous_attempt() {
    let h = Harness::new(1000);
    h.client.begin_login().unwrap();
    let first = h.ephemeral.get(PKCE_VERIFIER_KEY).unwrap();
    let first_state = h.authorize_param("state");

    h.client.begin_login().unwrap();
    assert_ne!(h.ephemeral.get(PKCE_VERIFIER_KEY).unwrap(), first);
    assert_ne!(h.authorize_param("state"), first_state);
}

/// Full round trip: stored verifier goes out with the code, expiry is derived
#[tokio::test]
async fn test_end_to_end_login() {
    let endpoint = ScriptedEndpoint::new();
    endpoint.push(Ok(response(Some("I"), "A", Some("R"), Some(3600))));
    let h = Harness::with(1000, endpoint, SessionConfig::default());

    h.client.begin_login().unwrap();
    let verifier = h.ephemeral.get(PKCE_VERIFIER_KEY).unwrap().unwrap();

    let tokens = h
        .client
        .complete_login("https://app.example.com/callback?code=ABC")
        .await
        .unwrap()
        .unwrap();

    let form = h.endpoint.last_form();
    assert!(form.contains(&("grant_type".to_string(), "authorization_code".to_string())));
    assert!(form.contains(&("code".to_string(), "ABC".to_string())));
    assert!(form.contains(&("code_verifier".to_string(), verifier)));
    assert!(form.contains(&("redirect_uri".to_string(), REDIRECT_URI.to_string())));

    let (token_url, _) = &h.endpoint.requests()[0];
    assert_eq!(token_url.as_str(), format!("https://{DOMAIN}/oauth2/token"));

    assert_eq!(tokens.expires_at, Some(4570));
    assert_eq!(h.client.tokens(), Some(tokens));
    assert_eq!(h.client.id_token().as_deref(), Some("I"));
    assert_eq!(h.client.access_token().as_deref(), Some("A"));

    assert!(h.client.is_authenticated());
    h.clock.set(4600);
    assert!(!h.client.is_authenticated());
}

/// A successful exchange consumes the pending login and cleans the location
#[tokio::test]
async fn test_complete_login_clears_pending_and_rewrites_location() {
    let endpoint = ScriptedEndpoint::new();
    endpoint.push(Ok(response(Some("I"), "A", Some("R"), Some(3600))));
    let h = Harness::with(1000, endpoint, SessionConfig::default());

    h.client.begin_login().unwrap();
    let state = h.authorize_param("state").unwrap();
    let callback = format!("https://app.example.com/callback?code=ABC&state={state}");
    h.client.complete_login(&callback).await.unwrap();

    assert_eq!(h.ephemeral.get(PKCE_VERIFIER_KEY).unwrap(), None);
    assert_eq!(h.ephemeral.get(PKCE_STATE_KEY).unwrap(), None);
    assert!(matches!(
        h.navigator.events().last(),
        Some(Navigation::Replace(url)) if url.as_str() == "https://app.example.com/callback"
    ));
}

/// Reloading a callback page without a code changes nothing
#[tokio::test]
async fn test_missing_code_is_a_no_op() {
    let h = Harness::new(1000);
    h.client.begin_login().unwrap();
    let verifier = h.ephemeral.get(PKCE_VERIFIER_KEY).unwrap();
    let state = h.ephemeral.get(PKCE_STATE_KEY).unwrap();

    let result = h
        .client
        .complete_login("https://app.example.com/callback?foo=bar")
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(h.endpoint.calls(), 0);
    assert_eq!(h.ephemeral.get(PKCE_VERIFIER_KEY).unwrap(), verifier);
    assert_eq!(h.ephemeral.get(PKCE_STATE_KEY).unwrap(), state);
    assert_eq!(h.durable.get(TOKENS_KEY).unwrap(), None);
}

/// A provider error is surfaced and the attempt is abandoned
#[tokio::test]
async fn test_provider_error_callback() {
    let h = Harness::new(1000);
    h.client.begin_login().unwrap();

    let err = h
        .client
        .complete_login(
            "https://app.example.com/callback?error=access_denied&error_description=User+cancelled",
        )
        .await
        .unwrap_err();

    match err {
        Error::Authorization { error, description } => {
            assert_eq!(error, "access_denied");
            assert_eq!(description, "User cancelled");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.endpoint.calls(), 0);
    assert_eq!(h.ephemeral.get(PKCE_VERIFIER_KEY).unwrap(), None);
}

/// A forged state never reaches the token endpoint
#[tokio::test]
async fn test_state_mismatch_is_rejected() {
    let h = Harness::new(1000);
    h.client.begin_login().unwrap();

    let err = h
        .client
        .complete_login("https://app.example.com/callback?code=ABC&state=forged")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::StateMismatch(_)));
    assert_eq!(h.endpoint.calls(), 0);
    assert_eq!(h.ephemeral.get(PKCE_VERIFIER_KEY).unwrap(), None);
    assert!(h.client.tokens().is_none());
}

/// Without a pending login the code is exchanged with no verifier
#[tokio::test]
async fn test_code_without_pending_login_is_exchanged() {
    let endpoint = ScriptedEndpoint::new();
    endpoint.push(Ok(response(Some("I"), "A", None, None)));
    let h = Harness::with(1000, endpoint, SessionConfig::default());

    let tokens = h
        .client
        .complete_login("https://app.example.com/callback?code=ABC")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(h.endpoint.calls(), 1);
    assert_eq!(tokens.expires_at, Some(1000 + 3600 - 30));
    assert!(h.endpoint.last_form().iter().all(|(k, _)| k != "code_verifier"));
    assert!(matches!(
        &h.endpoint.requests()[0].1,
        TokenRequest::AuthorizationCode { code_verifier: None, .. }
    ));
    assert!(h.client.is_authenticated());
}

/// Strict mode refuses codes that no login attempt asked for
#[tokio::test]
async fn test_require_pending_login_rejects_unsolicited_code() {
    let session = SessionConfig {
        require_pending_login: true,
        ..Default::default()
    };
    let h = Harness::with(1000, ScriptedEndpoint::new(), session);

    let err = h
        .client
        .complete_login("https://app.example.com/callback?code=ABC")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::StateMismatch(_)));
    assert_eq!(h.endpoint.calls(), 0);
    assert!(h.client.tokens().is_none());
}

/// Exchange failures propagate, store nothing and still consume the attempt
#[tokio::test]
async fn test_exchange_http_error_propagates() {
    let endpoint = ScriptedEndpoint::new();
    endpoint.push(Err(Error::Http {
        status: 400,
        body: r#"{"error":"invalid_grant"}"#.to_string(),
    }));
    let h = Harness::with(1000, endpoint, SessionConfig::default());
    h.client.begin_login().unwrap();

    let err = h
        .client
        .complete_login("https://app.example.com/callback?code=ABC")
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(400));
    assert!(err.to_string().contains("invalid_grant"));
    assert!(h.client.tokens().is_none());
    assert_eq!(h.ephemeral.get(PKCE_VERIFIER_KEY).unwrap(), None);
}
