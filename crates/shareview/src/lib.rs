//! Shareview: discover the signed data-fetch URL behind a public shared
//! table view by rendering the page in headless Chromium and watching the
//! requests it issues.

pub mod cache;
pub mod candidate;
pub mod collector;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod renderer;
pub mod table;
pub mod types;

pub use cache::{CacheError, CachedDiscovery, DiscoveryCache};
pub use candidate::{is_preferred_variant, Candidate};
pub use collector::RequestLog;
pub use config::{Config, ConfigError, Overrides};
pub use engine::DiscoveryEngine;
pub use error::{DiscoveryError, FetchError, Result};
pub use fetch::DataClient;
pub use renderer::chromium::{find_chromium, ChromiumLauncher};
pub use renderer::{BrowsingSession, Launcher, RequestObserver, SessionOptions};
pub use table::{SharedTable, TableError};
pub use types::*;
