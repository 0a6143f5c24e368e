//! Token set model and expiry derivation

use std::fmt::{self, Debug, Formatter};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Lifetime assumed when the provider omits `expires_in`
pub const DEFAULT_EXPIRES_IN: i64 = 3600;

/// The durable credential record.
///
/// `expires_at` is never taken from the wire; it is derived once, when a
/// token response is accepted, as `issued_at + expires_in - skew`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// OIDC ID token (presented to the API gateway)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// OAuth access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Long-lived refresh token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type (usually "Bearer")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Lifetime in seconds, as received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// Derived expiry (Unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl TokenSet {
    /// Accept a code-exchange response issued at `issued_at`
    #[must_use]
    pub fn from_response(response: TokenResponse, issued_at: i64, skew_seconds: i64) -> Self {
        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        Self {
            id_token: response.id_token,
            access_token: Some(response.access_token),
            refresh_token: response.refresh_token,
            token_type: response.token_type,
            expires_in: Some(expires_in),
            expires_at: Some(issued_at.saturating_add(expires_in).saturating_sub(skew_seconds)),
        }
    }

    /// Accept a refresh response, carrying the previous refresh token
    /// forward when the provider does not rotate it.
    #[must_use]
    pub fn from_refresh(
        previous: &Self,
        response: TokenResponse,
        issued_at: i64,
        skew_seconds: i64,
    ) -> Self {
        let mut next = Self::from_response(response, issued_at, skew_seconds);
        if next.refresh_token.is_none() {
            next.refresh_token.clone_from(&previous.refresh_token);
        }
        next
    }

    /// `id_token` present and `expires_at > now + threshold`
    #[must_use]
    pub fn is_authenticated_at(&self, now: i64, threshold_seconds: i64) -> bool {
        self.id_token.is_some()
            && self
                .expires_at
                .is_some_and(|expires_at| expires_at > now.saturating_add(threshold_seconds))
    }

    /// Whether at most `window_seconds` remain (or the expiry is unknown)
    #[must_use]
    pub fn needs_refresh_at(&self, now: i64, window_seconds: i64) -> bool {
        self.seconds_remaining(now)
            .is_none_or(|remaining| remaining <= window_seconds)
    }

    /// Seconds until `expires_at`, negative once expired
    #[must_use]
    pub fn seconds_remaining(&self, now: i64) -> Option<i64> {
        self.expires_at.map(|expires_at| expires_at.saturating_sub(now))
    }

    /// True when no field is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Debug for TokenSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("id_token_set", &self.id_token.is_some())
            .field("access_token_set", &self.access_token.is_some())
            .field("refresh_token_set", &self.refresh_token.is_some())
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token endpoint response body
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    /// Access token
    pub access_token: String,
    /// ID token (OIDC scopes only)
    #[serde(default)]
    pub id_token: Option<String>,
    /// Refresh token; omitted on most refresh responses
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Token type
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds from issuance
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    /// Parse a response body, mapping anything unusable to [`Error::Schema`]
    pub fn parse(body: &str) -> Result<Self> {
        let response: Self = serde_json::from_str(body)
            .map_err(|e| Error::Schema(format!("Failed to parse token response: {e}")))?;
        if response.access_token.trim().is_empty() {
            return Err(Error::Schema("Token response has an empty access_token".to_string()));
        }
        if let Some(expires_in) = response.expires_in.filter(|e| *e < 0) {
            return Err(Error::Schema(format!(
                "Token response has a negative expires_in ({expires_in})"
            )));
        }
        Ok(response)
    }
}

impl Debug for TokenResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("id_token_set", &self.id_token.is_some())
            .field("refresh_token_set", &self.refresh_token.is_some())
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}
