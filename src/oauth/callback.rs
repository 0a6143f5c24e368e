//! OAuth Callback
//!
//! Query parsing for the redirect back from the identity provider, and a
//! minimal loopback HTTP server that receives that redirect for the CLI.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{RawQuery, State},
    response::Html,
    routing::get,
};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info};
use url::Url;

use crate::{Error, Result};

/// OAuth callback query parameters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,

    /// State parameter (for CSRF protection)
    pub state: Option<String>,

    /// Error code
    pub error: Option<String>,

    /// Error description
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Extract the callback parameters from a full callback URL
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }
}

/// State shared with the callback handler
struct CallbackState {
    redirect_uri: Url,
    tx: Option<oneshot::Sender<String>>,
}

/// Loopback listener bound to the host/port of a `http://localhost` redirect URI
pub struct CallbackListener {
    listener: TcpListener,
    redirect_uri: Url,
}

impl CallbackListener {
    /// Bind the listener.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the redirect URI is not a plain-HTTP loopback URL,
    /// [`Error::Io`] if the port cannot be bound.
    pub async fn bind(redirect_uri: &str) -> Result<Self> {
        let redirect_uri = Url::parse(redirect_uri)?;
        let host = redirect_uri
            .host_str()
            .ok_or_else(|| Error::Config("redirect_uri has no host".to_string()))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        if redirect_uri.scheme() != "http" || !is_loopback(&host) {
            return Err(Error::Config(format!(
                "redirect_uri must be an http://localhost URL to receive the callback here, got {redirect_uri}"
            )));
        }

        let port = redirect_uri.port_or_known_default().unwrap_or(80);
        let listener = TcpListener::bind((host.as_str(), port)).await?;
        info!(addr = %listener.local_addr()?, path = redirect_uri.path(), "OAuth callback server listening");

        Ok(Self {
            listener,
            redirect_uri,
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the first request on the redirect path arrives and
    /// return the full callback URL (redirect URI plus received query).
    pub async fn wait(self, timeout: Duration) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        let path = self.redirect_uri.path().to_string();

        let state = Arc::new(Mutex::new(CallbackState {
            redirect_uri: self.redirect_uri,
            tx: Some(tx),
        }));

        let app = Router::new()
            .route(&path, get(handle_callback))
            .with_state(state);

        let listener = self.listener;
        let server = tokio::spawn(async move { axum::serve(listener, app).await });

        let result = tokio::time::timeout(timeout, rx).await;
        server.abort();

        match result {
            Ok(Ok(callback_url)) => Ok(callback_url),
            Ok(Err(_)) => Err(Error::Network(
                "Callback channel closed unexpectedly".to_string(),
            )),
            Err(_) => Err(Error::Authorization {
                error: "callback_timeout".to_string(),
                description: format!("No login callback received within {timeout:?}"),
            }),
        }
    }
}

fn is_loopback(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host
            .parse::<std::net::IpAddr>()
            .is_ok_and(|ip| ip.is_loopback())
}

/// Handle the OAuth callback
async fn handle_callback(
    State(state): State<Arc<Mutex<CallbackState>>>,
    RawQuery(query): RawQuery,
) -> Html<String> {
    let mut state = state.lock().await;

    let mut callback_url = state.redirect_uri.clone();
    callback_url.set_query(query.as_deref());
    let params = CallbackParams::from_url(&callback_url);
    debug!(has_code = params.code.is_some(), error = ?params.error, "Received OAuth callback");

    if let Some(tx) = state.tx.take() {
        let _ = tx.send(callback_url.to_string());
    }

    match (params.error, params.code) {
        (Some(error), _) => Html(error_page(
            &error,
            params
                .error_description
                .as_deref()
                .unwrap_or("(no description)"),
        )),
        (None, Some(_)) => Html(success_page()),
        (None, None) => Html(error_page("missing_code", "Authorization code not provided")),
    }
}

fn success_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head>
    <title>Signing you in</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; display: grid; place-items: center; min-height: 100vh; margin: 0; }
        .card { padding: 1.5rem; border-radius: 8px; box-shadow: 0 1px 4px rgba(0,0,0,0.2); max-width: 28rem; }
    </style>
</head>
<body>
    <div class="card">
        <h1>Signing you in…</h1>
        <p>Completing OAuth flow. You can close this window and return to the terminal.</p>
    </div>
</body>
</html>"#
        .to_string()
}

fn error_page(error: &str, description: &str) -> String {
    let error = escape_html(error);
    let description = escape_html(description);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Login failed</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; display: grid; place-items: center; min-height: 100vh; margin: 0; }}
        .card {{ padding: 1.5rem; border-radius: 8px; box-shadow: 0 1px 4px rgba(0,0,0,0.2); max-width: 28rem; color: #dc2626; }}
        pre {{ white-space: pre-wrap; word-break: break-word; font-size: 0.75rem; }}
    </style>
</head>
<body>
    <div class="card">
        <h1>Login failed.</h1>
        <pre>{error}: {description}</pre>
    </div>
</body>
</html>"#
    )
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
