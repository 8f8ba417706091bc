//! The discovery procedure: render the page, watch its requests, pick the
//! data-fetch URL that belongs to the target.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};
use url::Url;

use crate::collector::RequestLog;
use crate::error::{DiscoveryError, Result};
use crate::renderer::chromium::ChromiumLauncher;
use crate::renderer::{BrowsingSession, Launcher, RequestObserver, SessionOptions};
use crate::types::{DiscoveryOptions, DiscoveryResult, Target};

/// Runs discovery sessions through a `Launcher`. Holds no state between calls.
pub struct DiscoveryEngine<L = ChromiumLauncher> {
    launcher: L,
}

impl DiscoveryEngine<ChromiumLauncher> {
    /// Engine backed by the headless Chromium at `chrome_path`.
    pub fn chromium(chrome_path: impl Into<PathBuf>) -> Self {
        Self::new(ChromiumLauncher::new(chrome_path))
    }
}

impl<L: Launcher> DiscoveryEngine<L> {
    pub fn new(launcher: L) -> Self {
        Self { launcher }
    }

    /// Discover the data-fetch URL for `target` behind `page_url`.
    ///
    /// One isolated browser session is opened and always torn down before
    /// the observed requests are evaluated. Nothing is retried.
    pub async fn discover(
        &self,
        page_url: &str,
        target: &Target,
        options: &DiscoveryOptions,
    ) -> Result<DiscoveryResult> {
        validate_page_url(page_url)?;

        let log = Arc::new(Mutex::new(RequestLog::new(options.data_host.clone())));
        let sink = Arc::clone(&log);
        let observer: RequestObserver = Arc::new(move |url: &str| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .observe(url);
        });

        let session_options = SessionOptions {
            user_agent: options.user_agent.clone(),
            block_heavy_resources: true,
        };

        info!(
            page_url,
            view_id = target.view_id(),
            share_id = target.share_id(),
            "starting discovery"
        );
        let mut session = self.launcher.open(&session_options, observer).await?;
        let outcome = observe_page(session.as_mut(), page_url, options).await;
        if let Err(e) = session.close().await {
            warn!("session teardown failed: {e}");
        }
        outcome?;

        let log = log.lock().unwrap_or_else(PoisonError::into_inner);
        let result = log.evaluate(target)?;
        info!(
            found = result.found.len(),
            matching = result.matching.len(),
            expires = ?result.picked_expiry,
            picked = %result.picked,
            "discovery picked URL"
        );
        Ok(result)
    }

    /// Synchronous entry point for call sites without a runtime.
    ///
    /// Fails with `NestedScheduler` when called from inside a tokio runtime;
    /// await `discover` there instead.
    pub fn discover_blocking(
        &self,
        page_url: &str,
        target: &Target,
        options: &DiscoveryOptions,
    ) -> Result<DiscoveryResult> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(DiscoveryError::NestedScheduler);
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.discover(page_url, target, options))
    }
}

/// Navigate (bounded by `timeout`), then keep observing for `settle`.
async fn observe_page(
    session: &mut dyn BrowsingSession,
    page_url: &str,
    options: &DiscoveryOptions,
) -> Result<()> {
    session.navigate(page_url, options.timeout).await?;
    tokio::time::sleep(options.settle).await;
    Ok(())
}

fn validate_page_url(page_url: &str) -> Result<()> {
    let invalid = |reason: String| DiscoveryError::InvalidPageUrl {
        url: page_url.to_string(),
        reason,
    };
    let url = Url::parse(page_url).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_page_url() {
        assert!(validate_page_url("https://layoffs.fyi").is_ok());
        assert!(validate_page_url("http://localhost:8080/x").is_ok());
        assert!(matches!(
            validate_page_url("ftp://layoffs.fyi"),
            Err(DiscoveryError::InvalidPageUrl { .. })
        ));
        assert!(matches!(
            validate_page_url("layoffs.fyi"),
            Err(DiscoveryError::InvalidPageUrl { .. })
        ));
    }
}
