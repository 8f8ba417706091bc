//! Configuration resolution.
//!
//! Resolved exactly once at startup: explicit overrides win, then the
//! environment, then defaults. The resulting `Config` is immutable and is
//! what gets handed to the engine, fetch client and cache.

use std::path::PathBuf;
use std::time::Duration;

use crate::fetch::{DEFAULT_LOCALE, DEFAULT_TIME_ZONE};
use crate::renderer::chromium::find_chromium;
use crate::types::{
    DiscoveryOptions, Target, DEFAULT_DATA_HOST, DEFAULT_SETTLE_MS, DEFAULT_TIMEOUT_MS,
    DEFAULT_USER_AGENT,
};

pub const DEFAULT_PAGE_URL: &str = "https://layoffs.fyi";
/// Ten days, matching how often the published dataset is worth refreshing.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 10 * 24 * 60 * 60;

pub const ENV_VIEW_ID: &str = "AIRTABLE_VIEW_ID";
pub const ENV_SHARE_ID: &str = "AIRTABLE_SHARE_ID";
pub const ENV_PAGE_URL: &str = "PAGE_URL";
pub const ENV_USER_AGENT: &str = "SHAREVIEW_USER_AGENT";
pub const ENV_TIMEOUT_MS: &str = "SHAREVIEW_TIMEOUT_MS";
pub const ENV_SETTLE_MS: &str = "SHAREVIEW_SETTLE_MS";
pub const ENV_DATA_HOST: &str = "SHAREVIEW_DATA_HOST";
pub const ENV_CHROMIUM_PATH: &str = "SHAREVIEW_CHROMIUM_PATH";
pub const ENV_CACHE_DIR: &str = "SHAREVIEW_CACHE_DIR";
pub const ENV_CACHE_TTL_SECS: &str = "SHAREVIEW_CACHE_TTL_SECS";
pub const ENV_TIME_ZONE: &str = "SHAREVIEW_TIME_ZONE";
pub const ENV_LOCALE: &str = "SHAREVIEW_LOCALE";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing {0} (set it in the environment, a .env file, or on the command line)")]
    Missing(&'static str),

    #[error("Invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Values given explicitly by the caller (usually command-line flags).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub page_url: Option<String>,
    pub view_id: Option<String>,
    pub share_id: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
    pub settle_ms: Option<u64>,
    pub chromium_path: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub page_url: String,
    pub target: Target,
    pub user_agent: String,
    pub timeout: Duration,
    pub settle: Duration,
    pub data_host: String,
    /// Browser binary, resolved once; `None` when none was configured or found.
    pub chromium_path: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub cache_ttl: Duration,
    pub time_zone: String,
    pub locale: String,
}

impl Config {
    /// Resolve against the process environment.
    pub fn from_env(overrides: &Overrides) -> Result<Self, ConfigError> {
        Self::resolve(overrides, |name| std::env::var(name).ok())
    }

    /// Resolve using `lookup` for environment variables. Blank values count
    /// as unset.
    pub fn resolve(
        overrides: &Overrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let pick = |explicit: &Option<String>, name: &str| {
            explicit
                .as_ref()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .or_else(|| env(name))
        };

        let view_id = pick(&overrides.view_id, ENV_VIEW_ID)
            .ok_or(ConfigError::Missing(ENV_VIEW_ID))?;
        let share_id = pick(&overrides.share_id, ENV_SHARE_ID)
            .ok_or(ConfigError::Missing(ENV_SHARE_ID))?;
        let target = Target::new(view_id, share_id).map_err(|e| ConfigError::Invalid {
            name: "target",
            reason: e.to_string(),
        })?;

        let page_url =
            pick(&overrides.page_url, ENV_PAGE_URL).unwrap_or_else(|| DEFAULT_PAGE_URL.to_string());
        let user_agent = pick(&overrides.user_agent, ENV_USER_AGENT)
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let timeout_ms = match overrides.timeout_ms {
            Some(ms) => ms,
            None => parse_u64(env(ENV_TIMEOUT_MS), ENV_TIMEOUT_MS)?.unwrap_or(DEFAULT_TIMEOUT_MS),
        };
        let settle_ms = match overrides.settle_ms {
            Some(ms) => ms,
            None => parse_u64(env(ENV_SETTLE_MS), ENV_SETTLE_MS)?.unwrap_or(DEFAULT_SETTLE_MS),
        };
        let cache_ttl_secs = parse_u64(env(ENV_CACHE_TTL_SECS), ENV_CACHE_TTL_SECS)?
            .unwrap_or(DEFAULT_CACHE_TTL_SECS);

        let configured = overrides
            .chromium_path
            .clone()
            .or_else(|| env(ENV_CHROMIUM_PATH).map(PathBuf::from));
        let chromium_path = resolve_chromium(configured)?;
        let cache_dir = resolve_cache_dir(overrides.cache_dir.clone(), &lookup);

        Ok(Self {
            page_url,
            target,
            user_agent,
            timeout: Duration::from_millis(timeout_ms),
            settle: Duration::from_millis(settle_ms),
            data_host: env(ENV_DATA_HOST)
                .unwrap_or_else(|| DEFAULT_DATA_HOST.to_string()),
            chromium_path,
            cache_dir,
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            time_zone: env(ENV_TIME_ZONE).unwrap_or_else(|| DEFAULT_TIME_ZONE.to_string()),
            locale: env(ENV_LOCALE).unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
        })
    }

    /// Options for `DiscoveryEngine::discover`.
    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            user_agent: self.user_agent.clone(),
            timeout: self.timeout,
            settle: self.settle,
            data_host: self.data_host.clone(),
        }
    }
}

fn parse_u64(raw: Option<String>, name: &'static str) -> Result<Option<u64>, ConfigError> {
    raw.map(|v| {
        v.parse::<u64>().map_err(|e| ConfigError::Invalid {
            name,
            reason: format!("{v:?}: {e}"),
        })
    })
    .transpose()
}

/// A configured browser path must exist; without one, search the usual
/// install locations.
fn resolve_chromium(configured: Option<PathBuf>) -> Result<Option<PathBuf>, ConfigError> {
    match configured {
        Some(path) if path.is_file() => Ok(Some(path)),
        Some(path) => Err(ConfigError::Invalid {
            name: ENV_CHROMIUM_PATH,
            reason: format!("{} is not a file", path.display()),
        }),
        None => Ok(find_chromium()),
    }
}

/// Cache directory alone, for commands that do not need a target.
pub fn resolve_cache_dir(
    explicit: Option<PathBuf>,
    lookup: impl Fn(&str) -> Option<String>,
) -> PathBuf {
    explicit
        .or_else(|| {
            lookup(ENV_CACHE_DIR)
                .filter(|v| !v.trim().is_empty())
                .map(|v| PathBuf::from(v.trim()))
        })
        .unwrap_or_else(default_cache_dir)
}

fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".shareview")
        .join("cache")
}
