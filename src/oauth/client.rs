//! OAuth Client
//!
//! Token lifecycle manager: PKCE login redirect, code exchange, silent
//! refresh, session evaluation and logout.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Client;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

use super::callback::CallbackParams;
use super::endpoint::{HttpTokenEndpoint, TokenEndpoint, TokenRequest};
use super::navigator::Navigator;
use super::pkce;
use super::storage::{FileStore, MemoryStore, PendingLogin, PendingLoginStore, TokenStore};
use super::token::TokenSet;
use crate::clock::{Clock, SystemClock};
use crate::config::{AuthConfig, Config, NetworkFailurePolicy, SessionConfig};
use crate::{Error, Result};

/// Scopes requested on every login
pub const SCOPES: &str = "openid email profile";

/// Client-side OAuth session for one app client
pub struct AuthClient {
    /// Identity provider settings, checked at call time
    auth: AuthConfig,

    /// Expiry and refresh tuning
    session: SessionConfig,

    /// Token endpoint transport
    endpoint: Arc<dyn TokenEndpoint>,

    /// Durable token set
    tokens: TokenStore,

    /// Verifier/state of the login in flight
    pending: PendingLoginStore,

    /// Browser hand-off
    navigator: Arc<dyn Navigator>,

    /// Time source
    clock: Arc<dyn Clock>,

    /// Held for the whole read-decide-refresh-write sequence; holds the
    /// outcome of the last refresh attempt
    refresh_gate: Mutex<Option<TokenSet>>,

    /// Bumped after every refresh attempt
    refresh_generation: AtomicU64,
}

impl AuthClient {
    /// Create a client from its collaborators
    #[must_use]
    pub fn new(
        auth: AuthConfig,
        session: SessionConfig,
        tokens: TokenStore,
        pending: PendingLoginStore,
        endpoint: Arc<dyn TokenEndpoint>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            auth,
            session,
            endpoint,
            tokens,
            pending,
            navigator,
            clock: Arc::new(SystemClock),
            refresh_gate: Mutex::new(None),
            refresh_generation: AtomicU64::new(0),
        }
    }

    /// Wire up the default stack: file-backed tokens, in-memory pending
    /// login, reqwest token endpoint.
    pub fn from_config(config: &Config, navigator: Arc<dyn Navigator>) -> Result<Self> {
        let durable = FileStore::new(config.storage.resolve_dir()?)?;
        let http_client = Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self::new(
            config.auth.clone(),
            config.session.clone(),
            TokenStore::new(Arc::new(durable)),
            PendingLoginStore::new(Arc::new(MemoryStore::new())),
            Arc::new(HttpTokenEndpoint::new(http_client, config.session.request_timeout)),
            navigator,
        ))
    }

    /// Replace the time source
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start a login: store a fresh verifier and state, then send the user
    /// agent to the authorize endpoint.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when the domain, client ID or redirect URI is
    /// missing; nothing is stored or navigated in that case.
    pub fn begin_login(&self) -> Result<Url> {
        let mut url = self.auth.authorize_endpoint()?;
        let client_id = self.auth.require_client_id()?;
        let redirect_uri = self.auth.require_redirect_uri()?;

        let code_verifier = pkce::generate_verifier(self.session.verifier_length)?;
        let state = pkce::generate_state();
        let code_challenge = pkce::challenge_for(&code_verifier);

        self.pending.put(&PendingLogin {
            code_verifier,
            state: Some(state.clone()),
        })?;

        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("response_type", "code")
            .append_pair("scope", SCOPES)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("code_challenge_method", "S256")
            .append_pair("code_challenge", &code_challenge)
            .append_pair("state", &state);

        info!(client_id = %client_id, redirect_uri = %redirect_uri, "Starting login");
        self.navigator.navigate(&url);
        Ok(url)
    }

    /// Finish a login from the URL the provider redirected to.
    ///
    /// Returns `Ok(None)` without touching storage when the URL has no
    /// `code`, so reloading the callback page is harmless. Otherwise the
    /// pending login is consumed whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`Error::Authorization`] when the provider reported an error
    /// - [`Error::StateMismatch`] when the callback does not belong to the pending login
    /// - [`Error::Http`], [`Error::Network`], [`Error::Schema`] from the exchange
    pub async fn complete_login(&self, callback_url: &str) -> Result<Option<TokenSet>> {
        let url = Url::parse(callback_url)?;
        let params = CallbackParams::from_url(&url);

        if let Some(error) = params.error {
            self.abandon_login();
            let description = params
                .error_description
                .unwrap_or_else(|| "(no description)".to_string());
            warn!(error = %error, description = %description, "Provider rejected the login");
            return Err(Error::Authorization { error, description });
        }

        let Some(code) = params.code.filter(|c| !c.is_empty()) else {
            debug!("Callback URL has no code; nothing to exchange");
            return Ok(None);
        };

        let pending = self.pending.get();
        let result = self.redeem_code(&code, params.state.as_deref(), pending).await;
        self.abandon_login();
        let tokens = result?;

        self.navigator.replace_location(&strip_callback_params(&url));
        Ok(Some(tokens))
    }

    async fn redeem_code(
        &self,
        code: &str,
        returned_state: Option<&str>,
        pending: Option<PendingLogin>,
    ) -> Result<TokenSet> {
        let code_verifier = self.verify_callback(pending, returned_state)?;
        let token_url = self.auth.token_endpoint()?;
        let request = TokenRequest::AuthorizationCode {
            client_id: self.auth.require_client_id()?.to_string(),
            code: code.to_string(),
            redirect_uri: self.auth.require_redirect_uri()?.to_string(),
            code_verifier,
        };

        let response = match self.endpoint.request_token(&token_url, &request).await {
            Ok(response) => response,
            Err(e) => {
                error!(status = ?e.status(), error = %e, "Token exchange failed");
                return Err(e);
            }
        };

        let tokens = TokenSet::from_response(response, self.clock.now_epoch(), self.session.skew_seconds);
        self.tokens.set(&tokens)?;
        info!(expires_at = ?tokens.expires_at, "Login completed");
        Ok(tokens)
    }

    /// Decide which verifier (if any) goes with the code
    fn verify_callback(
        &self,
        pending: Option<PendingLogin>,
        returned_state: Option<&str>,
    ) -> Result<Option<String>> {
        let Some(pending) = pending else {
            if self.session.require_pending_login {
                return Err(Error::StateMismatch(
                    "no login attempt is pending for this callback".to_string(),
                ));
            }
            // Works only for app clients that do not enforce PKCE
            warn!("No pending login; exchanging code without PKCE verifier");
            return Ok(None);
        };

        match (pending.state.as_deref(), returned_state) {
            (Some(expected), Some(actual)) => {
                if !bool::from(expected.as_bytes().ct_eq(actual.as_bytes())) {
                    return Err(Error::StateMismatch(
                        "callback state does not match the pending login".to_string(),
                    ));
                }
            }
            (None, Some(_)) => {
                return Err(Error::StateMismatch(
                    "callback carries a state but none was issued".to_string(),
                ));
            }
            (_, None) => debug!("Callback carries no state; code is bound by PKCE"),
        }

        Ok(Some(pending.code_verifier))
    }

    /// Forget the login in flight (also done after every processed callback)
    pub fn abandon_login(&self) {
        if let Err(e) = self.pending.clear() {
            warn!(error = %e, "Failed to clear pending login");
        }
    }

    /// Return a token set that is good for at least the refresh window,
    /// refreshing first when needed.
    ///
    /// Never fails: a rejected refresh clears the token store and yields
    /// `None`. At most one refresh is in flight; concurrent callers wait for
    /// it and get its outcome, success or failure.
    pub async fn ensure_fresh(&self) -> Option<TokenSet> {
        let current = self.tokens.get()?;
        if !self.refresh_due(&current) {
            return Some(current);
        }

        let observed = self.refresh_generation.load(Ordering::Acquire);
        let mut last_outcome = self.refresh_gate.lock().await;

        // An attempt finished while we waited: share it rather than retry
        if self.refresh_generation.load(Ordering::Acquire) != observed {
            debug!("Using the outcome of a concurrent refresh");
            return (*last_outcome).clone();
        }

        // Re-read: a refresh may have completed before we looked at the generation
        let current = self.tokens.get()?;
        if !self.refresh_due(&current) {
            return Some(current);
        }

        let outcome = self.refresh(current).await;
        *last_outcome = outcome.clone();
        self.refresh_generation.fetch_add(1, Ordering::Release);
        outcome
    }

    fn refresh_due(&self, tokens: &TokenSet) -> bool {
        tokens.refresh_token.is_some()
            && tokens.needs_refresh_at(self.clock.now_epoch(), self.session.refresh_window_seconds)
    }

    async fn refresh(&self, current: TokenSet) -> Option<TokenSet> {
        let refresh_token = current.refresh_token.clone()?;

        let (token_url, request) = match self.refresh_request(refresh_token) {
            Ok(target) => target,
            Err(e) => {
                error!(error = %e, "Cannot refresh tokens");
                return None;
            }
        };

        match self.endpoint.request_token(&token_url, &request).await {
            Ok(response) => {
                let next = TokenSet::from_refresh(
                    &current,
                    response,
                    self.clock.now_epoch(),
                    self.session.skew_seconds,
                );
                if let Err(e) = self.tokens.set(&next) {
                    error!(error = %e, "Failed to persist refreshed tokens");
                }
                info!(expires_at = ?next.expires_at, "Tokens refreshed");
                Some(next)
            }
            Err(e) if e.is_transient() && self.session.network_failure == NetworkFailurePolicy::Retain => {
                warn!(error = %e, "Token refresh unreachable; keeping stored tokens");
                None
            }
            Err(e) => {
                warn!(status = ?e.status(), error = %e, "Token refresh failed; clearing session");
                if let Err(e) = self.tokens.clear() {
                    error!(error = %e, "Failed to clear tokens after refresh failure");
                }
                None
            }
        }
    }

    fn refresh_request(&self, refresh_token: String) -> Result<(Url, TokenRequest)> {
        let token_url = self.auth.token_endpoint()?;
        let request = TokenRequest::RefreshToken {
            client_id: self.auth.require_client_id()?.to_string(),
            refresh_token,
        };
        Ok((token_url, request))
    }

    /// Whether the stored tokens carry an ID token that outlives the
    /// authentication threshold. Pure; storage failures read as `false`.
    pub fn is_authenticated(&self) -> bool {
        self.tokens.get().is_some_and(|tokens| {
            tokens.is_authenticated_at(self.clock.now_epoch(), self.session.auth_threshold_seconds)
        })
    }

    /// End the session: clear local state first, then send the user agent
    /// to the provider's logout endpoint.
    ///
    /// Local logout cannot fail. Returns the logout URL when one could be
    /// built from configuration.
    pub fn logout(&self) -> Option<Url> {
        if let Err(e) = self.tokens.clear() {
            error!(error = %e, "Failed to clear tokens on logout");
        }
        self.abandon_login();

        match self.logout_url() {
            Ok(url) => {
                info!("Logged out; redirecting to provider logout");
                self.navigator.navigate(&url);
                Some(url)
            }
            Err(e) => {
                warn!(error = %e, "Logged out locally; provider logout skipped");
                None
            }
        }
    }

    fn logout_url(&self) -> Result<Url> {
        let mut url = self.auth.logout_endpoint()?;
        url.query_pairs_mut()
            .append_pair("client_id", self.auth.require_client_id()?)
            .append_pair("logout_uri", self.auth.require_logout_redirect_uri()?);
        Ok(url)
    }

    /// Seconds until the stored tokens expire (negative once expired)
    pub fn seconds_remaining(&self) -> Option<i64> {
        self.tokens
            .get()
            .and_then(|t| t.seconds_remaining(self.clock.now_epoch()))
    }

    /// Stored token set, as-is
    pub fn tokens(&self) -> Option<TokenSet> {
        self.tokens.get()
    }

    /// ID token, refreshed first when due
    pub async fn fresh_id_token(&self) -> Option<String> {
        self.ensure_fresh().await.and_then(|t| t.id_token)
    }

    /// Access token, refreshed first when due
    pub async fn fresh_access_token(&self) -> Option<String> {
        self.ensure_fresh().await.and_then(|t| t.access_token)
    }

    /// Stored ID token
    pub fn id_token(&self) -> Option<String> {
        self.tokens.get().and_then(|t| t.id_token)
    }

    /// Stored access token
    pub fn access_token(&self) -> Option<String> {
        self.tokens.get().and_then(|t| t.access_token)
    }
}

/// Callback URL without `code` and `state`, so a reload cannot replay them
fn strip_callback_params(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "code" && k != "state")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut cleaned = url.clone();
    if kept.is_empty() {
        cleaned.set_query(None);
    } else {
        cleaned.query_pairs_mut().clear().extend_pairs(kept);
    }
    cleaned
}
