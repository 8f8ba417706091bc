//! Chromium-backed sessions using chromiumoxide.

use super::{BrowsingSession, Launcher, RequestObserver, SessionOptions};
use crate::error::{DiscoveryError, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
    RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, EventRequestWillBeSent, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::{EventDomContentEventFired, NavigateParams};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Consecutive handler errors tolerated before the event loop gives up.
const HANDLER_ERROR_TOLERANCE: usize = 16;

/// Bound on each teardown step (close, wait) before the process is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Executable names looked up on `PATH`, in order.
const PATH_NAMES: [&str; 4] = [
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

/// Layouts of a browser unpacked under `~/.shareview/chromium`.
const BUNDLED_LAYOUTS: [&str; 3] = [
    "chrome-linux64/chrome",
    "chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
    "chrome",
];

const MACOS_CHROME: &str = "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome";

/// Search the usual install locations for a Chrome/Chromium binary: a
/// browser unpacked under `~/.shareview/chromium`, then `PATH`, then the
/// standard macOS bundle. Called once while resolving configuration.
pub fn find_chromium() -> Option<PathBuf> {
    let bundled = dirs::home_dir().into_iter().flat_map(|home| {
        let root = home.join(".shareview").join("chromium");
        BUNDLED_LAYOUTS.iter().map(move |rel| root.join(rel))
    });
    let on_path = PATH_NAMES.iter().filter_map(|name| which::which(name).ok());
    let macos = std::iter::once(PathBuf::from(MACOS_CHROME)).filter(|_| cfg!(target_os = "macos"));

    bundled
        .filter(|p| p.is_file())
        .chain(on_path)
        .chain(macos.filter(|p| p.is_file()))
        .next()
}

fn is_heavy(resource: &ResourceType) -> bool {
    matches!(
        resource,
        ResourceType::Image | ResourceType::Media | ResourceType::Font | ResourceType::Stylesheet
    )
}

/// Launches one headless Chromium process per session.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    chrome_path: PathBuf,
    /// Per-command CDP timeout; navigation commands must fit inside it.
    request_timeout: Option<Duration>,
}

impl ChromiumLauncher {
    pub fn new(chrome_path: impl Into<PathBuf>) -> Self {
        Self {
            chrome_path: chrome_path.into(),
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    fn config(&self, options: &SessionOptions, profile: &TempDir) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .chrome_executable(&self.chrome_path)
            .user_data_dir(profile.path())
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            // keep cross-origin iframes in-process so their requests reach us
            .arg("--disable-site-isolation-trials")
            .arg("--disable-features=IsolateOrigins,site-per-process")
            .arg(format!("--user-agent={}", options.user_agent));
        if let Some(timeout) = self.request_timeout {
            builder = builder.request_timeout(timeout);
        }

        builder
            .build()
            .map_err(|e| DiscoveryError::Launch(format!("failed to build browser config: {e}")))
    }
}

#[async_trait]
impl Launcher for ChromiumLauncher {
    async fn open(
        &self,
        options: &SessionOptions,
        observer: RequestObserver,
    ) -> Result<Box<dyn BrowsingSession>> {
        let profile = tempfile::Builder::new().prefix("shareview-profile-").tempdir()?;
        let config = self.config(options, &profile)?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DiscoveryError::Launch(format!("failed to launch Chromium: {e}")))?;

        let handler_task = tokio::spawn(async move {
            let mut consecutive_errors = 0usize;
            while let Some(event) = handler.next().await {
                match event {
                    Ok(()) => consecutive_errors = 0,
                    Err(err) => {
                        consecutive_errors += 1;
                        debug!("Chromium handler event error (#{consecutive_errors}): {err}");
                        if consecutive_errors >= HANDLER_ERROR_TOLERANCE {
                            break;
                        }
                    }
                }
            }
        });

        let mut session = ChromiumSession {
            browser: None,
            page: None,
            handler_task,
            listeners: Vec::new(),
            _profile: profile,
        };

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                shutdown(&mut browser, SHUTDOWN_GRACE).await;
                session.handler_task.abort();
                return Err(DiscoveryError::Launch(format!("failed to create page: {e}")));
            }
        };
        session.browser = Some(browser);
        session.page = Some(page.clone());

        // From here on a failed setup still goes through close().
        if let Err(e) = session.install(page, options, observer).await {
            let _ = Box::new(session).close().await;
            return Err(e);
        }

        info!("browser session opened");
        Ok(Box::new(session))
    }
}

/// One running Chromium process with a single observed page.
pub struct ChromiumSession {
    browser: Option<Browser>,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
    listeners: Vec<JoinHandle<()>>,
    _profile: TempDir,
}

impl ChromiumSession {
    async fn install(
        &mut self,
        page: Page,
        options: &SessionOptions,
        observer: RequestObserver,
    ) -> Result<()> {
        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| DiscoveryError::Launch(format!("failed to observe requests: {e}")))?;
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                observer(event.request.url.as_str());
            }
        }));

        if !options.block_heavy_resources {
            return Ok(());
        }

        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| DiscoveryError::Launch(format!("failed to intercept requests: {e}")))?;
        let pattern = RequestPattern::builder()
            .url_pattern("*")
            .request_stage(RequestStage::Request)
            .build();
        page.execute(EnableParams::builder().patterns(vec![pattern]).build())
            .await
            .map_err(|e| DiscoveryError::Launch(format!("failed to enable interception: {e}")))?;

        let interceptor = page.clone();
        self.listeners.push(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let outcome = if is_heavy(&event.resource_type) {
                    interceptor
                        .execute(FailRequestParams::new(
                            event.request_id.clone(),
                            ErrorReason::BlockedByClient,
                        ))
                        .await
                        .map(|_| ())
                } else {
                    interceptor
                        .execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ())
                };
                if let Err(e) = outcome {
                    debug!("interception reply failed for {}: {e}", event.request.url);
                }
            }
        }));
        Ok(())
    }
}

#[async_trait]
impl BrowsingSession for ChromiumSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| DiscoveryError::Navigation("session has no page".into()))?;

        // Subscribe before navigating so the event cannot be missed.
        let mut dom_ready = page
            .event_listener::<EventDomContentEventFired>()
            .await
            .map_err(|e| DiscoveryError::Navigation(e.to_string()))?;

        let load = async {
            let response = page
                .execute(NavigateParams::new(url))
                .await
                .map_err(|e| DiscoveryError::Navigation(format!("{url}: {e}")))?;
            if let Some(err) = response.result.error_text.as_deref() {
                if !err.is_empty() {
                    return Err(DiscoveryError::Navigation(format!("{url}: {err}")));
                }
            }
            dom_ready.next().await.ok_or_else(|| {
                DiscoveryError::Navigation("browser went away before DOMContentLoaded".into())
            })?;
            Ok(())
        };

        match tokio::time::timeout(timeout, load).await {
            Ok(result) => result,
            Err(_) => Err(DiscoveryError::NavigationTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        for listener in self.listeners.drain(..) {
            listener.abort();
        }
        if let Some(page) = self.page.take() {
            let _ = page.close().await;
        }
        if let Some(mut browser) = self.browser.take() {
            shutdown(&mut browser, SHUTDOWN_GRACE).await;
        }
        self.handler_task.abort();
        info!("browser session closed");
        Ok(())
    }
}

/// The process-control surface teardown needs from a launched browser.
#[async_trait]
trait BrowserProcess: Send {
    /// Ask the browser to exit through the protocol.
    async fn request_close(&mut self) -> std::result::Result<(), String>;
    /// Wait for the child process to exit.
    async fn wait_exit(&mut self) -> std::result::Result<(), String>;
    /// Kill the child process.
    async fn force_kill(&mut self);
}

#[async_trait]
impl BrowserProcess for Browser {
    async fn request_close(&mut self) -> std::result::Result<(), String> {
        self.close().await.map(|_| ()).map_err(|e| e.to_string())
    }

    async fn wait_exit(&mut self) -> std::result::Result<(), String> {
        self.wait().await.map(|_| ()).map_err(|e| e.to_string())
    }

    async fn force_kill(&mut self) {
        if let Some(Err(e)) = self.kill().await {
            warn!("killing browser failed: {e}");
        }
    }
}

/// Close the browser, falling back to killing it. Each step is bounded by
/// `grace`, so teardown always finishes.
async fn shutdown(process: &mut dyn BrowserProcess, grace: Duration) {
    let closed = match tokio::time::timeout(grace, process.request_close()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("browser close failed: {e}");
            false
        }
        Err(_) => {
            warn!("browser close timed out");
            false
        }
    };
    if !closed {
        process.force_kill().await;
    }

    match tokio::time::timeout(grace, process.wait_exit()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("waiting for browser exit failed: {e}"),
        Err(_) => {
            warn!("browser still running after close, killing");
            process.force_kill().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_heavy_resource_classes() {
        assert!(is_heavy(&ResourceType::Image));
        assert!(is_heavy(&ResourceType::Media));
        assert!(is_heavy(&ResourceType::Font));
        assert!(is_heavy(&ResourceType::Stylesheet));
        assert!(!is_heavy(&ResourceType::Xhr));
        assert!(!is_heavy(&ResourceType::Fetch));
        assert!(!is_heavy(&ResourceType::Script));
        assert!(!is_heavy(&ResourceType::Document));
    }

    #[test]
    fn test_find_chromium_returns_existing_file() {
        if let Some(path) = find_chromium() {
            assert!(path.is_file());
        }
    }

    // ─── teardown ───

    #[derive(Clone, Copy, PartialEq)]
    enum CloseBehavior {
        Exits,
        /// Close is acknowledged but the process keeps running.
        Ignored,
        Fails,
        Hangs,
    }

    struct FakeProcess {
        close: CloseBehavior,
        running: bool,
        kills: usize,
    }

    impl FakeProcess {
        fn new(close: CloseBehavior) -> Self {
            Self {
                close,
                running: true,
                kills: 0,
            }
        }
    }

    #[async_trait]
    impl BrowserProcess for FakeProcess {
        async fn request_close(&mut self) -> std::result::Result<(), String> {
            match self.close {
                CloseBehavior::Exits => {
                    self.running = false;
                    Ok(())
                }
                CloseBehavior::Ignored => Ok(()),
                CloseBehavior::Fails => Err("handler is gone".into()),
                CloseBehavior::Hangs => std::future::pending().await,
            }
        }

        async fn wait_exit(&mut self) -> std::result::Result<(), String> {
            if self.running {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn force_kill(&mut self) {
            self.kills += 1;
            self.running = false;
        }
    }

    const GRACE: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_shutdown_clean_close_does_not_kill() {
        let mut process = FakeProcess::new(CloseBehavior::Exits);
        shutdown(&mut process, GRACE).await;
        assert_eq!(process.kills, 0);
        assert!(!process.running);
    }

    #[tokio::test]
    async fn test_shutdown_kills_when_close_fails() {
        let mut process = FakeProcess::new(CloseBehavior::Fails);
        tokio::time::timeout(Duration::from_secs(2), shutdown(&mut process, GRACE))
            .await
            .expect("teardown must not hang");
        assert_eq!(process.kills, 1);
        assert!(!process.running);
    }

    #[tokio::test]
    async fn test_shutdown_kills_when_close_hangs() {
        let mut process = FakeProcess::new(CloseBehavior::Hangs);
        tokio::time::timeout(Duration::from_secs(2), shutdown(&mut process, GRACE))
            .await
            .expect("teardown must not hang");
        assert_eq!(process.kills, 1);
    }

    #[tokio::test]
    async fn test_shutdown_kills_when_process_outlives_close() {
        let mut process = FakeProcess::new(CloseBehavior::Ignored);
        tokio::time::timeout(Duration::from_secs(2), shutdown(&mut process, GRACE))
            .await
            .expect("teardown must not hang");
        assert_eq!(process.kills, 1);
        assert!(!process.running);
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_session_observes_requests() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let observer: RequestObserver = Arc::new(move |url: &str| {
            sink.lock().unwrap().push(url.to_string());
        });

        let launcher = ChromiumLauncher::new(find_chromium().expect("Chromium not installed"));
        let options = SessionOptions {
            user_agent: crate::types::DEFAULT_USER_AGENT.to_string(),
            block_heavy_resources: true,
        };
        let mut session = launcher.open(&options, observer).await.expect("launch failed");
        session
            .navigate("data:text/html,<h1>Hello</h1>", Duration::from_secs(10))
            .await
            .expect("navigation failed");
        session.close().await.expect("close failed");

        assert!(seen.lock().unwrap().iter().any(|u| u.starts_with("data:text/html")));
    }
}
