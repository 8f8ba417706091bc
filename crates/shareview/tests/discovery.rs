//! Discovery orchestration tests against a scripted browser.
//!
//! The scripted launcher replays a fixed list of request URLs into the
//! observer, which lets the whole procedure (open, navigate, settle,
//! teardown, evaluate) run without Chromium.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use shareview::{
    BrowsingSession, DiscoveryEngine, DiscoveryError, DiscoveryOptions, Launcher, RequestObserver,
    Result, SessionOptions, Target,
};

// ─────────────────────── helpers ───────────────────────

#[derive(Clone, Default)]
struct ScriptedLauncher {
    /// Requests issued while the page loads.
    on_load: Vec<String>,
    /// Requests issued shortly after DOMContentLoaded.
    after_load: Vec<String>,
    fail_navigation: bool,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    user_agent: Arc<Mutex<Option<String>>>,
}

struct ScriptedSession {
    script: ScriptedLauncher,
    observer: RequestObserver,
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    async fn open(
        &self,
        options: &SessionOptions,
        observer: RequestObserver,
    ) -> Result<Box<dyn BrowsingSession>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        *self.user_agent.lock().unwrap() = Some(options.user_agent.clone());
        Ok(Box::new(ScriptedSession {
            script: self.clone(),
            observer,
        }))
    }
}

#[async_trait]
impl BrowsingSession for ScriptedSession {
    async fn navigate(&mut self, _url: &str, timeout: Duration) -> Result<()> {
        for url in &self.script.on_load {
            (self.observer)(url.as_str());
        }
        if self.script.fail_navigation {
            return Err(DiscoveryError::NavigationTimeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        let late = self.script.after_load.clone();
        let observer = Arc::clone(&self.observer);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            for url in late {
                observer(url.as_str());
            }
        });
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.script.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

const PAGE: &str = "https://layoffs.fyi";

fn options() -> DiscoveryOptions {
    DiscoveryOptions {
        timeout: Duration::from_millis(500),
        settle: Duration::from_millis(150),
        ..Default::default()
    }
}

fn data_url(view: &str, share: &str, extra: &str) -> String {
    format!(
        "https://airtable.com/v0.3/view/{view}/readSharedViewData?{extra}accessPolicy=%7B%22shareId%22%3A%22{share}%22%2C%22expires%22%3A%222030-01-01T00%3A00%3A00.000Z%22%7D"
    )
}

fn nested_url(view: &str, share: &str) -> String {
    data_url(
        view,
        share,
        "stringifiedObjectParams=%7B%22shouldUseNestedResponseFormat%22%3Atrue%2C%22includeDataForPageHeader%22%3Atrue%7D&requestId=reqLongerThanThePlainOne&",
    )
}

// ─────────────────────── tests ───────────────────────

#[tokio::test]
async fn test_discover_picks_preferred_matching_url() {
    let plain = data_url("viwA", "shrA", "");
    let nested = nested_url("viwA", "shrA");
    let other = data_url("viwB", "shrA", "");
    let launcher = ScriptedLauncher {
        on_load: vec![
            "https://layoffs.fyi/".into(),
            "https://airtable.com/embed/shrA".into(),
            other.clone(),
            plain.clone(),
            plain.clone(),
        ],
        after_load: vec![nested.clone(), other.clone()],
        ..Default::default()
    };
    let engine = DiscoveryEngine::new(launcher.clone());
    let target = Target::new("viwA", "shrA").unwrap();

    let result = engine.discover(PAGE, &target, &options()).await.unwrap();

    assert_eq!(result.found, vec![other, plain.clone(), nested.clone()]);
    assert_eq!(result.matching, vec![plain, nested.clone()]);
    assert_eq!(result.picked, nested);
    assert!(result.picked_expiry.is_some());
    assert_eq!(launcher.opened.load(Ordering::SeqCst), 1);
    assert_eq!(launcher.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_discover_passes_user_agent_to_session() {
    let launcher = ScriptedLauncher {
        on_load: vec![data_url("viwA", "shrA", "")],
        ..Default::default()
    };
    let engine = DiscoveryEngine::new(launcher.clone());
    let opts = DiscoveryOptions {
        user_agent: "agent/7".into(),
        ..options()
    };
    engine
        .discover(PAGE, &Target::new("viwA", "shrA").unwrap(), &opts)
        .await
        .unwrap();
    assert_eq!(launcher.user_agent.lock().unwrap().as_deref(), Some("agent/7"));
}

#[tokio::test]
async fn test_no_requests_is_no_candidates_observed() {
    let launcher = ScriptedLauncher {
        on_load: vec!["https://layoffs.fyi/app.js".into()],
        ..Default::default()
    };
    let engine = DiscoveryEngine::new(launcher.clone());
    let err = engine
        .discover(PAGE, &Target::new("viwA", "shrA").unwrap(), &options())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::NoCandidatesObserved));
    assert_eq!(launcher.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_wrong_identity_is_no_matching_candidate() {
    let launcher = ScriptedLauncher {
        on_load: vec![
            "https://x/v0.3/view/V1/readSharedViewData?accessPolicy=%7B%22shareId%22%3A%22S9%22%7D"
                .into(),
        ],
        ..Default::default()
    };
    let engine = DiscoveryEngine::new(launcher);
    let opts = DiscoveryOptions {
        data_host: "x".into(),
        ..options()
    };
    let err = engine
        .discover(PAGE, &Target::new("V2", "S9").unwrap(), &opts)
        .await
        .unwrap_err();
    match err {
        DiscoveryError::NoMatchingCandidate { total, .. } => assert_eq!(total, 1),
        other => panic!("expected NoMatchingCandidate, got {other:?}"),
    }
}

#[tokio::test]
async fn test_navigation_failure_still_tears_down() {
    let launcher = ScriptedLauncher {
        on_load: vec![data_url("viwA", "shrA", "")],
        fail_navigation: true,
        ..Default::default()
    };
    let engine = DiscoveryEngine::new(launcher.clone());
    let err = engine
        .discover(PAGE, &Target::new("viwA", "shrA").unwrap(), &options())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DiscoveryError::NavigationTimeout { timeout_ms: 500 }
    ));
    assert_eq!(launcher.opened.load(Ordering::SeqCst), 1);
    assert_eq!(launcher.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalid_page_url_opens_no_session() {
    let launcher = ScriptedLauncher::default();
    let engine = DiscoveryEngine::new(launcher.clone());
    let err = engine
        .discover("layoffs.fyi", &Target::new("viwA", "shrA").unwrap(), &options())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::InvalidPageUrl { .. }));
    assert_eq!(launcher.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_blocking_entry_inside_runtime_fails_fast() {
    let launcher = ScriptedLauncher {
        on_load: vec![data_url("viwA", "shrA", "")],
        ..Default::default()
    };
    let engine = DiscoveryEngine::new(launcher.clone());
    let err = engine
        .discover_blocking(PAGE, &Target::new("viwA", "shrA").unwrap(), &options())
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::NestedScheduler));
    assert_eq!(launcher.opened.load(Ordering::SeqCst), 0);
}

#[test]
fn test_blocking_entry_from_plain_call_site() {
    let wanted = data_url("viwA", "shrA", "");
    let launcher = ScriptedLauncher {
        after_load: vec![wanted.clone()],
        ..Default::default()
    };
    let engine = DiscoveryEngine::new(launcher.clone());
    let result = engine
        .discover_blocking(PAGE, &Target::new("viwA", "shrA").unwrap(), &options())
        .unwrap();
    assert_eq!(result.picked, wanted);
    assert_eq!(launcher.closed.load(Ordering::SeqCst), 1);
}
