//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use collabtodo_auth::clock::ManualClock;
use collabtodo_auth::config::{AuthConfig, SessionConfig};
use collabtodo_auth::oauth::{
    AuthClient, MemoryStore, Navigator, PendingLoginStore, RecordingNavigator, TokenEndpoint,
    TokenRequest, TokenResponse, TokenStore,
};
use collabtodo_auth::{Error, Result};

pub const DOMAIN: &str = "collabtodo-app.auth.ap-southeast-2.amazoncognito.com";
pub const CLIENT_ID: &str = "client-123";
pub const REDIRECT_URI: &str = "https://app.example.com/callback";
pub const LOGOUT_URI: &str = "https://app.example.com/";

pub fn auth_config() -> AuthConfig {
    AuthConfig {
        region: "ap-southeast-2".to_string(),
        cognito_domain: DOMAIN.to_string(),
        client_id: CLIENT_ID.to_string(),
        redirect_uri: REDIRECT_URI.to_string(),
        logout_redirect_uri: LOGOUT_URI.to_string(),
    }
}

/// Token response body as JSON
pub fn response(
    id_token: Option<&str>,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_in: Option<i64>,
) -> TokenResponse {
    TokenResponse {
        access_token: access_token.to_string(),
        id_token: id_token.map(str::to_string),
        refresh_token: refresh_token.map(str::to_string),
        token_type: Some("Bearer".to_string()),
        expires_in,
    }
}

/// Token endpoint that replays scripted outcomes and records every grant
#[derive(Default)]
pub struct ScriptedEndpoint {
    outcomes: Mutex<VecDeque<Result<TokenResponse>>>,
    requests: Mutex<Vec<(Url, TokenRequest)>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before answering, so concurrent callers overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, outcome: Result<TokenResponse>) {
        self.outcomes.lock().push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(Url, TokenRequest)> {
        self.requests.lock().clone()
    }

    /// Form of the most recent grant, as sent on the wire
    pub fn last_form(&self) -> Vec<(String, String)> {
        self.requests
            .lock()
            .last()
            .map(|(_, request)| {
                request
                    .form()
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl TokenEndpoint for ScriptedEndpoint {
    async fn request_token(&self, token_url: &Url, request: &TokenRequest) -> Result<TokenResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push((token_url.clone(), request.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Network("no scripted response".to_string())))
    }
}

/// A client plus handles on everything it touches
pub struct Harness {
    pub client: AuthClient,
    pub endpoint: Arc<ScriptedEndpoint>,
    pub navigator: Arc<RecordingNavigator>,
    pub durable: Arc<MemoryStore>,
    pub ephemeral: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(now: i64) -> Self {
        Self::with(now, ScriptedEndpoint::new(), SessionConfig::default())
    }

    pub fn with(now: i64, endpoint: ScriptedEndpoint, session: SessionConfig) -> Self {
        let endpoint = Arc::new(endpoint);
        let navigator = Arc::new(RecordingNavigator::new());
        let durable = Arc::new(MemoryStore::new());
        let ephemeral = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(now));

        let client = AuthClient::new(
            auth_config(),
            session,
            TokenStore::new(durable.clone()),
            PendingLoginStore::new(ephemeral.clone()),
            endpoint.clone(),
            navigator.clone() as Arc<dyn Navigator>,
        )
        .with_clock(clock.clone());

        Self {
            client,
            endpoint,
            navigator,
            durable,
            ephemeral,
            clock,
        }
    }

    /// Query value of the last authorize navigation
    pub fn authorize_param(&self, name: &str) -> Option<String> {
        self.navigator.last_navigation().and_then(|url| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        })
    }
}
