//! OAuth 2.0 client session for the `CollabTodo` app
//!
//! Implements the Authorization Code flow with PKCE (RFC 7636) against a
//! hosted identity provider, for a public client with no secret.
//!
//! Features:
//! - PKCE verifier/challenge and per-attempt random `state`
//! - Code exchange and silent, single-flight refresh
//! - Token storage behind an injectable key/value store
//! - Session evaluation and provider logout
//! - Loopback callback server for the CLI

mod callback;
mod client;
mod endpoint;
mod navigator;
pub mod pkce;
mod storage;
mod token;

pub use callback::{CallbackListener, CallbackParams};
pub use client::{AuthClient, SCOPES};
pub use endpoint::{HttpTokenEndpoint, TokenEndpoint, TokenRequest};
pub use navigator::{Navigation, Navigator, RecordingNavigator, TerminalNavigator};
pub use storage::{
    FileStore, KeyValueStore, MemoryStore, PKCE_STATE_KEY, PKCE_VERIFIER_KEY, PendingLogin,
    PendingLoginStore, TOKENS_KEY, TokenStore,
};
pub use token::{DEFAULT_EXPIRES_IN, TokenResponse, TokenSet};
