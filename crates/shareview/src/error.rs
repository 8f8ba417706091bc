//! Error types for discovery, fetch, configuration and caching.

/// Failures of a single `discover` call. None of these are retried internally.
#[derive(thiserror::Error, Debug)]
pub enum DiscoveryError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Invalid page URL {url}: {reason}")]
    InvalidPageUrl { url: String, reason: String },

    #[error(
        "No readSharedViewData requests captured. The page may have changed, \
         loaded too slowly, or blocked headless."
    )]
    NoCandidatesObserved,

    #[error(
        "Captured {total} readSharedViewData URLs but none matched \
         view_id={view_id} share_id={share_id}."
    )]
    NoMatchingCandidate {
        total: usize,
        view_id: String,
        share_id: String,
    },

    #[error(
        "discover_blocking() was called inside a running tokio runtime; \
         await DiscoveryEngine::discover(...) instead"
    )]
    NestedScheduler,

    #[error("Chromium not found. Install Chrome/Chromium or set SHAREVIEW_CHROMIUM_PATH.")]
    BrowserNotFound,

    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Navigation timed out after {timeout_ms}ms")]
    NavigationTimeout { timeout_ms: u64 },

    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Failures of the downstream JSON fetch, distinct from discovery failures.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
