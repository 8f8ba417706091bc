//! `shareview cache clear`: drop cached discoveries.

use anyhow::{Context, Result};

use std::path::Path;
use std::time::Duration;

use shareview::config::{resolve_cache_dir, Overrides, DEFAULT_CACHE_TTL_SECS};
use shareview::DiscoveryCache;

use super::output::Output;

pub fn run_clear(overrides: &Overrides, out: &Output) -> Result<()> {
    let dir = resolve_cache_dir(overrides.cache_dir.clone(), |name| std::env::var(name).ok());
    let removed = clear_dir(&dir)?;

    if out.is_json() {
        out.print_json(&serde_json::json!({
            "cache_dir": dir.display().to_string(),
            "removed": removed,
        }));
    } else {
        out.info(format!("Removed {removed} cached discovery(ies) from {}", dir.display()));
    }
    Ok(())
}

fn clear_dir(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let ttl = Duration::from_secs(DEFAULT_CACHE_TTL_SECS);
    let mut cache = DiscoveryCache::new(dir.to_path_buf(), ttl)
        .with_context(|| format!("opening cache at {}", dir.display()))?;
    Ok(cache.clear())
}
