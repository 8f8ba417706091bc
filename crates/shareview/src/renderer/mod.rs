//! Browser abstraction for discovery sessions.
//!
//! A `Launcher` opens one isolated `BrowsingSession` per discovery call
//! (currently Chromium via chromiumoxide). The session pushes every outgoing
//! request URL into the `RequestObserver` it was opened with, for as long as
//! it is alive.

pub mod chromium;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

/// Handler invoked once per outgoing request with the request URL.
pub type RequestObserver = Arc<dyn Fn(&str) + Send + Sync>;

/// Settings for one isolated browsing session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub user_agent: String,
    /// Abort image, media, font and stylesheet requests.
    pub block_heavy_resources: bool,
}

/// Something that can start isolated browsing sessions.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Start a fresh, non-persistent session with `observer` installed on
    /// all outgoing requests.
    async fn open(
        &self,
        options: &SessionOptions,
        observer: RequestObserver,
    ) -> Result<Box<dyn BrowsingSession>>;
}

/// A live browsing session.
#[async_trait]
pub trait BrowsingSession: Send {
    /// Navigate and wait for DOMContentLoaded, bounded by `timeout`.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;
    /// Tear down the session and release the browser process.
    async fn close(self: Box<Self>) -> Result<()>;
}
