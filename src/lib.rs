//! `CollabTodo` client authentication
//!
//! OAuth 2.0 Authorization Code + PKCE session management for the
//! `CollabTodo` app against a hosted identity provider.
//!
//! # Features
//!
//! - **Login**: PKCE (S256) authorize redirect with a random `state`
//! - **Exchange**: code-for-token redemption with state verification
//! - **Refresh**: silent, single-flight, fail-closed token renewal
//! - **Session**: expiry-aware authentication check with skew margin
//! - **Logout**: local wipe followed by provider logout redirect
//! - **API**: bearer-authenticated calls that refresh first

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod oauth;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// Logs go to stderr so command output on stdout stays scriptable.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            subscriber.with(fmt::layer().with_writer(std::io::stderr)).init();
        }
    }

    Ok(())
}
