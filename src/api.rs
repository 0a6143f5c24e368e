//! Authenticated HTTP API adapter
//!
//! Every request refreshes tokens first when due, then presents the ID
//! token as a bearer credential (the API's authorizer validates ID tokens).

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::ApiConfig;
use crate::oauth::AuthClient;
use crate::{Error, Result};

/// Identity as seen by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Me {
    /// Subject of the ID token
    pub user_id: String,
    /// Email claim
    pub email: String,
    /// Token issuer
    pub issuer: String,
}

/// Body of `POST /v1/lists`
#[derive(Debug, Clone, Serialize)]
pub struct NewList<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

/// Thin client for the `CollabTodo` HTTP API
pub struct ApiClient {
    base_url: String,
    http_client: Client,
    timeout: Duration,
    auth: Arc<AuthClient>,
}

impl ApiClient {
    /// Create an API client sharing `auth`'s session
    pub fn new(config: &ApiConfig, auth: Arc<AuthClient>) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(Error::Config("api.base_url is not set".to_string()));
        }

        let http_client = Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.clone(),
            http_client,
            timeout: config.timeout,
            auth,
        })
    }

    /// Send a JSON request and return the decoded body.
    ///
    /// An empty body decodes as `Null`; a non-JSON body as a JSON string.
    ///
    /// # Errors
    ///
    /// - [`Error::NotAuthenticated`] when no ID token is available after refresh
    /// - [`Error::Http`] on a non-success status, carrying the body text
    /// - [`Error::Network`] when no response arrives
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = join_url(&self.base_url, path);

        let id_token = self
            .auth
            .fresh_id_token()
            .await
            .ok_or(Error::NotAuthenticated)?;

        debug!(method = %method, url = %url, "API request");

        let mut request = self
            .http_client
            .request(method, &url)
            .timeout(self.timeout)
            .bearer_auth(id_token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(format!("API request to {path} failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("Failed to read API response: {e}")))?;

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(decode_body(text))
    }

    /// `GET /v1/me`
    pub async fn me(&self) -> Result<Me> {
        let value = self.request(Method::GET, "/v1/me", None).await?;
        serde_json::from_value(value).map_err(|e| Error::Schema(format!("Unexpected /v1/me response: {e}")))
    }

    /// `POST /v1/lists`
    pub async fn create_list(&self, title: &str, description: Option<&str>) -> Result<Value> {
        let body = serde_json::to_value(NewList { title, description })?;
        self.request(Method::POST, "/v1/lists", Some(&body)).await
    }
}

/// Join with exactly one `/` between base and path
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn decode_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("https://api.example.com/", "/v1/me"), "https://api.example.com/v1/me");
        assert_eq!(join_url("https://api.example.com", "v1/me"), "https://api.example.com/v1/me");
        assert_eq!(join_url("https://api.example.com//", "//v1/me"), "https://api.example.com/v1/me");
    }

    #[test]
    fn body_decoding_tolerates_empty_and_plain_text() {
        assert_eq!(decode_body(String::new()), Value::Null);
        assert_eq!(decode_body("{\"ok\":true}".to_string()), json!({"ok": true}));
        assert_eq!(decode_body("created".to_string()), json!("created"));
    }

    #[test]
    fn me_uses_camel_case() {
        let me: Me = serde_json::from_value(json!({
            "userId": "u-1",
            "email": "a@example.com",
            "issuer": "https://idp.example.com"
        }))
        .unwrap();
        assert_eq!(me.user_id, "u-1");
    }

    #[test]
    fn new_list_omits_missing_description() {
        let body = serde_json::to_value(NewList { title: "Groceries", description: None }).unwrap();
        assert_eq!(body, json!({"title": "Groceries"}));
    }
}
