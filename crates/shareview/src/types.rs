//! Core value types: the target identity, discovery options and result.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{DiscoveryError, Result};

/// Desktop Chrome signature used when the caller does not supply one.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/120 Safari/537.36";

/// Host family the shared-view data endpoint is served from.
pub const DEFAULT_DATA_HOST: &str = "airtable.com";

pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_SETTLE_MS: u64 = 12_000;

/// Which shared view the caller wants: the view token plus the share grant
/// it is published under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Target {
    view_id: String,
    share_id: String,
}

impl Target {
    /// Build a target. Both identifiers must be non-empty after trimming.
    pub fn new(view_id: impl Into<String>, share_id: impl Into<String>) -> Result<Self> {
        let view_id = view_id.into().trim().to_string();
        let share_id = share_id.into().trim().to_string();
        if view_id.is_empty() {
            return Err(DiscoveryError::InvalidTarget("view_id is empty".into()));
        }
        if share_id.is_empty() {
            return Err(DiscoveryError::InvalidTarget("share_id is empty".into()));
        }
        Ok(Self { view_id, share_id })
    }

    pub fn view_id(&self) -> &str {
        &self.view_id
    }

    pub fn share_id(&self) -> &str {
        &self.share_id
    }

    /// True when both parsed identifiers are present and equal this target's.
    pub fn matches(&self, view_id: Option<&str>, share_id: Option<&str>) -> bool {
        view_id == Some(self.view_id.as_str()) && share_id == Some(self.share_id.as_str())
    }
}

/// Per-call knobs for a discovery session.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// User-agent presented by the browser (and reused by the fetch).
    pub user_agent: String,
    /// Upper bound on waiting for DOMContentLoaded.
    pub timeout: Duration,
    /// Extra passive observation after DOMContentLoaded.
    pub settle: Duration,
    /// Host family the data endpoint must belong to (e.g. `airtable.com`).
    pub data_host: String,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
            data_host: DEFAULT_DATA_HOST.to_string(),
        }
    }
}

/// Outcome of one discovery run.
///
/// `picked` is always an element of `matching`, and `matching` is an
/// order-preserving subset of `found`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    /// The selected data-fetch URL.
    pub picked: String,
    /// Every unique shape-matching URL, in first-seen order.
    pub found: Vec<String>,
    /// URLs from `found` whose identity equals the target.
    pub matching: Vec<String>,
    /// Access-policy expiry of `picked`, when it carried one.
    pub picked_expiry: Option<DateTime<FixedOffset>>,
}

impl DiscoveryResult {
    /// Whether the signed access grant of `picked` has lapsed at `now`.
    /// URLs without an expiry never report expired.
    pub fn is_expired_at(&self, now: DateTime<FixedOffset>) -> bool {
        self.picked_expiry.map(|exp| exp <= now).unwrap_or(false)
    }
}
