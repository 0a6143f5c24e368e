//! Token endpoint transport
//!
//! Both grants go to `{domain}/oauth2/token` as
//! `application/x-www-form-urlencoded` POSTs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::token::TokenResponse;
use crate::{Error, Result};

/// A grant sent to the token endpoint
#[derive(Clone, PartialEq, Eq)]
pub enum TokenRequest {
    /// Redeem an authorization code
    AuthorizationCode {
        /// App client ID
        client_id: String,
        /// Code from the callback
        code: String,
        /// Must equal the redirect URI used at authorize time
        redirect_uri: String,
        /// PKCE verifier; omitted from the form when `None`
        code_verifier: Option<String>,
    },
    /// Renew tokens with a refresh token
    RefreshToken {
        /// App client ID
        client_id: String,
        /// Current refresh token
        refresh_token: String,
    },
}

impl TokenRequest {
    /// `grant_type` form value
    #[must_use]
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }

    /// Form fields in wire order
    #[must_use]
    pub fn form(&self) -> Vec<(&'static str, &str)> {
        let mut form = vec![("grant_type", self.grant_type())];
        match self {
            Self::AuthorizationCode {
                client_id,
                code,
                redirect_uri,
                code_verifier,
            } => {
                form.push(("client_id", client_id.as_str()));
                form.push(("code", code.as_str()));
                form.push(("redirect_uri", redirect_uri.as_str()));
                if let Some(verifier) = code_verifier.as_deref().filter(|v| !v.is_empty()) {
                    form.push(("code_verifier", verifier));
                }
            }
            Self::RefreshToken {
                client_id,
                refresh_token,
            } => {
                form.push(("client_id", client_id.as_str()));
                form.push(("refresh_token", refresh_token.as_str()));
            }
        }
        form
    }
}

impl std::fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRequest")
            .field("grant_type", &self.grant_type())
            .finish_non_exhaustive()
    }
}

/// Something that can redeem grants for tokens
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// POST `request` to `token_url` and parse the token response
    ///
    /// # Errors
    ///
    /// - [`Error::Network`] when no response arrives (including timeouts)
    /// - [`Error::Http`] on a non-success status, carrying the body text
    /// - [`Error::Schema`] when the body is not a token response
    async fn request_token(&self, token_url: &Url, request: &TokenRequest) -> Result<TokenResponse>;
}

/// reqwest-backed token endpoint with a per-request timeout
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    http_client: Client,
    timeout: Duration,
}

impl HttpTokenEndpoint {
    /// Create an endpoint client
    #[must_use]
    pub fn new(http_client: Client, timeout: Duration) -> Self {
        Self {
            http_client,
            timeout,
        }
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn request_token(&self, token_url: &Url, request: &TokenRequest) -> Result<TokenResponse> {
        debug!(grant_type = request.grant_type(), url = %token_url, "Requesting tokens");

        let response = self
            .http_client
            .post(token_url.clone())
            .timeout(self.timeout)
            .form(&request.form())
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(&e))?;

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }

        TokenResponse::parse(&body)
    }
}

impl HttpTokenEndpoint {
    fn transport_error(&self, e: &reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Network(format!("Token request timed out after {:?}", self.timeout))
        } else {
            Error::Network(format!("Token request failed: {e}"))
        }
    }
}
