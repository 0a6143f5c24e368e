//! Configuration management

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Shortest PKCE verifier allowed by RFC 7636
pub const MIN_VERIFIER_LENGTH: usize = 43;
/// Longest PKCE verifier allowed by RFC 7636
pub const MAX_VERIFIER_LENGTH: usize = 128;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Identity provider settings
    pub auth: AuthConfig,
    /// Downstream API settings (used by API callers, not by the token core)
    pub api: ApiConfig,
    /// Token lifecycle tuning
    pub session: SessionConfig,
    /// Where durable state lives
    pub storage: StorageConfig,
}

/// Identity provider (Cognito Hosted UI) settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// AWS region of the user pool
    pub region: String,
    /// Provider host, e.g. `collabtodo-app.auth.ap-southeast-2.amazoncognito.com`.
    /// A full origin (`http://127.0.0.1:9000`) is used as-is.
    pub cognito_domain: String,
    /// App client ID
    pub client_id: String,
    /// Where the provider sends the browser after login
    pub redirect_uri: String,
    /// Where the provider sends the browser after logout
    pub logout_redirect_uri: String,
}

impl AuthConfig {
    /// Base origin of the identity provider
    pub fn provider_base(&self) -> Result<String> {
        let domain = required(&self.cognito_domain, "auth.cognito_domain")?.trim_end_matches('/');
        if domain.starts_with("https://") || domain.starts_with("http://") {
            Ok(domain.to_string())
        } else {
            Ok(format!("https://{domain}"))
        }
    }

    /// `{domain}/oauth2/authorize`
    pub fn authorize_endpoint(&self) -> Result<Url> {
        Ok(Url::parse(&format!("{}/oauth2/authorize", self.provider_base()?))?)
    }

    /// `{domain}/oauth2/token`
    pub fn token_endpoint(&self) -> Result<Url> {
        Ok(Url::parse(&format!("{}/oauth2/token", self.provider_base()?))?)
    }

    /// `{domain}/logout`
    pub fn logout_endpoint(&self) -> Result<Url> {
        Ok(Url::parse(&format!("{}/logout", self.provider_base()?))?)
    }

    /// Client ID, or a configuration error when unset
    pub fn require_client_id(&self) -> Result<&str> {
        required(&self.client_id, "auth.client_id")
    }

    /// Redirect URI, or a configuration error when unset
    pub fn require_redirect_uri(&self) -> Result<&str> {
        required(&self.redirect_uri, "auth.redirect_uri")
    }

    /// Logout redirect URI, or a configuration error when unset
    pub fn require_logout_redirect_uri(&self) -> Result<&str> {
        required(&self.logout_redirect_uri, "auth.logout_redirect_uri")
    }
}

fn required<'a>(value: &'a str, name: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Config(format!("{name} is not set")));
    }
    Ok(trimmed)
}

/// Downstream API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the HTTP API
    pub base_url: String,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// What the refresher does when the token endpoint cannot be reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkFailurePolicy {
    /// Keep the stored tokens; the next `ensure_fresh` retries
    #[default]
    Retain,
    /// Treat like a rejection and clear the stored tokens
    Wipe,
}

/// Token lifecycle tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Subtracted from `expires_in` when deriving `expires_at`
    pub skew_seconds: i64,
    /// A session is authenticated only while `expires_at > now + threshold`
    pub auth_threshold_seconds: i64,
    /// Refresh once fewer than this many seconds remain
    pub refresh_window_seconds: i64,
    /// PKCE verifier length in characters (43..=128)
    pub verifier_length: usize,
    /// Timeout for token endpoint calls
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// How long the CLI waits for the browser redirect
    #[serde(with = "humantime_serde")]
    pub callback_timeout: Duration,
    /// Refresh behaviour on transport failure
    pub network_failure: NetworkFailurePolicy,
    /// Reject codes that arrive without a pending login instead of
    /// exchanging them without a PKCE verifier
    pub require_pending_login: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            skew_seconds: 30,
            auth_threshold_seconds: 30,
            refresh_window_seconds: 60,
            verifier_length: 96,
            request_timeout: Duration::from_secs(10),
            callback_timeout: Duration::from_secs(300),
            network_failure: NetworkFailurePolicy::Retain,
            require_pending_login: false,
        }
    }
}

/// Durable storage location
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the durable token store (default `~/.collabtodo`)
    pub dir: Option<String>,
}

impl StorageConfig {
    /// Resolve the storage directory, expanding `~`
    pub fn resolve_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.dir {
            return Ok(PathBuf::from(expand_home(dir)));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(".collabtodo"))
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// Sources, later ones winning: the YAML file, `VITE_*` variables used by
    /// the web build, then `COLLABTODO_*` variables (`__` separates sections).
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Dotenv files must populate the process environment before the
        // env providers below read it
        let env_files: Vec<String> = figment.extract_inner("env_files").unwrap_or_default();
        load_env_files(&env_files);

        figment = figment
            .merge(vite_env())
            .merge(Env::prefixed("COLLABTODO_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Reject settings that can never work
    pub fn validate(&self) -> Result<()> {
        let len = self.session.verifier_length;
        if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&len) {
            return Err(Error::Config(format!(
                "session.verifier_length must be within {MIN_VERIFIER_LENGTH}..={MAX_VERIFIER_LENGTH}, got {len}"
            )));
        }
        if self.session.skew_seconds < 0 || self.session.auth_threshold_seconds < 0 {
            return Err(Error::Config(
                "session skew and threshold must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load environment files into the process environment.
/// Files that don't exist are silently skipped.
fn load_env_files(env_files: &[String]) {
    for path_str in env_files {
        let expanded = expand_home(path_str);
        let path = Path::new(&expanded);
        if path.exists() {
            match dotenvy::from_path(path) {
                Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
            }
        } else {
            tracing::debug!("Env file not found (skipped): {expanded}");
        }
    }
}

/// Map the web build's `VITE_*` variables onto config keys
fn vite_env() -> Env {
    Env::prefixed("VITE_").filter_map(|key| {
        let mapped = match key.as_str().to_ascii_lowercase().as_str() {
            "region" => "auth.region",
            "cognito_domain" => "auth.cognito_domain",
            "cognito_client_id" => "auth.client_id",
            "redirect_uri" => "auth.redirect_uri",
            "logout_redirect_uri" => "auth.logout_redirect_uri",
            "api_base" => "api.base_url",
            _ => return None,
        };
        Some(mapped.into())
    })
}

fn expand_home(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.display().to_string(), 1);
        }
    }
    path.to_string()
}

/// Human-readable durations ("30s", "5m", "250ms") for serde
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration as "30s", or "250ms" when not whole seconds
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize "30s", "5m", "100ms" or a bare number of seconds
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.trim();

        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}
