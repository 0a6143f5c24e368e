//! Hand-off of control to the user agent
//!
//! The browser app assigns `window.location`; the CLI prints the URL. Both
//! are fire-and-forget: nothing comes back to the caller.

use parking_lot::Mutex;
use tracing::info;
use url::Url;

/// Where the user agent is sent
pub trait Navigator: Send + Sync {
    /// Full navigation away from the app (authorize, logout)
    fn navigate(&self, url: &Url);

    /// Rewrite the visible location in place (drops `code`/`state` after a callback)
    fn replace_location(&self, url: &Url);
}

/// Prints URLs for a human to open
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, url: &Url) {
        info!(url = %url, "Navigating");
        println!("\nOpen this URL in your browser:\n{url}\n");
    }

    fn replace_location(&self, url: &Url) {
        info!(url = %url, "Location replaced");
    }
}

/// One recorded hand-off
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// [`Navigator::navigate`]
    Navigate(Url),
    /// [`Navigator::replace_location`]
    Replace(Url),
}

/// Records hand-offs instead of performing them
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    events: Mutex<Vec<Navigation>>,
}

impl RecordingNavigator {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, oldest first
    pub fn events(&self) -> Vec<Navigation> {
        self.events.lock().clone()
    }

    /// Most recent full navigation
    pub fn last_navigation(&self) -> Option<Url> {
        self.events.lock().iter().rev().find_map(|event| match event {
            Navigation::Navigate(url) => Some(url.clone()),
            Navigation::Replace(_) => None,
        })
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, url: &Url) {
        self.events.lock().push(Navigation::Navigate(url.clone()));
    }

    fn replace_location(&self, url: &Url) {
        self.events.lock().push(Navigation::Replace(url.clone()));
    }
}
