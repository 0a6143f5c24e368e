//! Client-local key/value storage and the two stores built on it
//!
//! Two scopes mirror browser storage:
//! - durable (`tokens`): survives restarts, backed by [`FileStore`]
//! - ephemeral (`pkce:*`): lives for one login round trip, backed by [`MemoryStore`]

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::token::TokenSet;
use crate::{Error, Result};

/// Durable key holding the serialized token set
pub const TOKENS_KEY: &str = "tokens";
/// Ephemeral key holding the raw PKCE verifier
pub const PKCE_VERIFIER_KEY: &str = "pkce:code_verifier";
/// Ephemeral key holding the state issued with the verifier
pub const PKCE_STATE_KEY: &str = "pkce:state";

/// Minimal string key/value surface, like browser `Storage`
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>>;
    /// Write a value
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Remove a value; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process storage; contents die with the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// One file per key under a base directory
#[derive(Debug)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a file store, creating the directory if needed
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir)
                .map_err(|e| Error::Storage(format!("Failed to create storage dir: {e}")))?;
        }

        Ok(Self { base_dir })
    }

    /// Keys contain characters like `:` that are not portable in file names
    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let name = hex::encode(digest);
        self.base_dir.join(format!("{}.json", &name[..16]))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| Error::Storage(format!("Failed to read {key}: {e}")))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        fs::write(&path, value)
            .map_err(|e| Error::Storage(format!("Failed to write {key}: {e}")))?;

        // Owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            let _ = fs::set_permissions(&path, perms);
        }

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| Error::Storage(format!("Failed to delete {key}: {e}")))?;
        }
        Ok(())
    }
}

/// Sole owner of the persisted [`TokenSet`]
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    /// Wrap a durable backend
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Current token set.
    ///
    /// Unreadable or corrupt records read as "no tokens".
    pub fn get(&self) -> Option<TokenSet> {
        let raw = match self.backend.get(TOKENS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read stored tokens");
                return None;
            }
        };

        match serde_json::from_str::<TokenSet>(&raw) {
            Ok(tokens) if tokens.is_empty() => None,
            Ok(tokens) => Some(tokens),
            Err(e) => {
                warn!(error = %e, "Failed to parse stored tokens");
                None
            }
        }
    }

    /// Replace the stored token set
    pub fn set(&self, tokens: &TokenSet) -> Result<()> {
        let content = serde_json::to_string(tokens)?;
        self.backend.set(TOKENS_KEY, &content)?;
        debug!(expires_at = ?tokens.expires_at, "Saved tokens");
        Ok(())
    }

    /// Drop every field of the stored token set
    pub fn clear(&self) -> Result<()> {
        self.backend.remove(TOKENS_KEY)?;
        info!("Cleared stored tokens");
        Ok(())
    }
}

/// One in-flight authorize → callback attempt
#[derive(Clone, PartialEq, Eq)]
pub struct PendingLogin {
    /// PKCE code verifier
    pub code_verifier: String,
    /// State sent with the authorize request
    pub state: Option<String>,
}

impl std::fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLogin")
            .field("code_verifier_len", &self.code_verifier.len())
            .field("state_set", &self.state.is_some())
            .finish()
    }
}

/// Single-attempt storage of the PKCE verifier and state
#[derive(Clone)]
pub struct PendingLoginStore {
    backend: Arc<dyn KeyValueStore>,
}

impl PendingLoginStore {
    /// Wrap an ephemeral backend
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Record a new attempt, replacing any previous one
    pub fn put(&self, pending: &PendingLogin) -> Result<()> {
        self.backend.set(PKCE_VERIFIER_KEY, &pending.code_verifier)?;
        match &pending.state {
            Some(state) => self.backend.set(PKCE_STATE_KEY, state),
            None => self.backend.remove(PKCE_STATE_KEY),
        }
    }

    /// Current attempt, if any. A blank verifier counts as absent.
    pub fn get(&self) -> Option<PendingLogin> {
        let verifier = match self.backend.get(PKCE_VERIFIER_KEY) {
            Ok(v) => v.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read pending login");
                None
            }
        }?;
        let state = self.backend.get(PKCE_STATE_KEY).ok().flatten();
        Some(PendingLogin {
            code_verifier: verifier,
            state,
        })
    }

    /// Forget the attempt
    pub fn clear(&self) -> Result<()> {
        self.backend.remove(PKCE_VERIFIER_KEY)?;
        self.backend.remove(PKCE_STATE_KEY)
    }
}
