//! `shareview fetch`: cached discovery followed by the data fetch.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use shareview::config::{Config, Overrides};
use shareview::fetch::DEFAULT_FETCH_TIMEOUT;
use shareview::{CachedDiscovery, DataClient, DiscoveryCache, FetchError, SharedTable};

use super::discover_cmd::discover;
use super::output::Output;

pub async fn run(
    overrides: &Overrides,
    out: &Output,
    fresh: bool,
    table: bool,
    output: Option<&Path>,
) -> Result<()> {
    let cfg = Config::from_env(overrides)?;
    let mut cache = DiscoveryCache::new(cfg.cache_dir.clone(), cfg.cache_ttl)
        .with_context(|| format!("opening cache at {}", cfg.cache_dir.display()))?;
    let client = DataClient::new(&cfg.user_agent, DEFAULT_FETCH_TIMEOUT)?
        .with_locale(cfg.time_zone.clone(), cfg.locale.clone());

    if fresh {
        cache.invalidate(&cfg.page_url, &cfg.target);
    }

    let payload = match cache.get(&cfg.page_url, &cfg.target) {
        Some(CachedDiscovery {
            payload: Some(payload),
            ..
        }) => {
            info!("using cached payload");
            payload
        }
        Some(cached) if !cached.can_refetch_at(Utc::now()) => {
            info!("cached data URL has expired, rediscovering");
            discover_and_fetch(&cfg, out, &client, &mut cache).await?
        }
        Some(cached) => match client.fetch_json(&cached.result.picked).await {
            Ok(payload) => {
                let entry = CachedDiscovery::new(
                    &cfg.page_url,
                    &cfg.target,
                    cached.result,
                    Some(payload.clone()),
                );
                store(&mut cache, &entry);
                payload
            }
            // signed URL rejected: discover again
            Err(FetchError::Status { status, .. }) => {
                warn!("cached data URL answered {status}, rediscovering");
                cache.invalidate(&cfg.page_url, &cfg.target);
                discover_and_fetch(&cfg, out, &client, &mut cache).await?
            }
            Err(e) => return Err(e.into()),
        },
        None => discover_and_fetch(&cfg, out, &client, &mut cache).await?,
    };

    let rendered = if table {
        let shaped = SharedTable::from_payload(&payload)?;
        serde_json::to_string_pretty(&shaped.rows)?
    } else {
        serde_json::to_string_pretty(&payload)?
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("writing {}", path.display()))?;
            if out.is_json() {
                out.print_json(&serde_json::json!({ "written": path.display().to_string() }));
            } else {
                out.info(format!("Wrote {}", path.display()));
            }
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

async fn discover_and_fetch(
    cfg: &Config,
    out: &Output,
    client: &DataClient,
    cache: &mut DiscoveryCache,
) -> Result<Value> {
    let result = discover(cfg, out).await?;
    let payload = client.fetch_json(&result.picked).await?;
    let entry = CachedDiscovery::new(&cfg.page_url, &cfg.target, result, Some(payload.clone()));
    store(cache, &entry);
    Ok(payload)
}

/// A cache write failure costs a rediscovery next time, nothing more.
fn store(cache: &mut DiscoveryCache, entry: &CachedDiscovery) {
    if let Err(e) = cache.put(entry) {
        warn!("could not cache discovery: {e}");
    }
}
