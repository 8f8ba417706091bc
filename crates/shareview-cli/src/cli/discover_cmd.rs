//! `shareview discover`: render the page and report the data URL.

use anyhow::Result;
use chrono::Utc;

use shareview::config::{Config, Overrides};
use shareview::{ChromiumLauncher, DiscoveryEngine, DiscoveryError, DiscoveryResult};

use super::output::{ellipsize, Output};

/// Run one discovery with the resolved configuration, behind a spinner.
pub async fn discover(cfg: &Config, out: &Output) -> Result<DiscoveryResult> {
    let chrome_path = cfg
        .chromium_path
        .clone()
        .ok_or(DiscoveryError::BrowserNotFound)?;
    let launcher = ChromiumLauncher::new(chrome_path).with_request_timeout(cfg.timeout);
    let engine = DiscoveryEngine::new(launcher);

    let spinner = out.spinner(format!("Rendering {}", cfg.page_url));
    let outcome = engine
        .discover(&cfg.page_url, &cfg.target, &cfg.discovery_options())
        .await;
    spinner.finish_and_clear();

    Ok(outcome?)
}

pub async fn run(overrides: &Overrides, out: &Output) -> Result<()> {
    let cfg = Config::from_env(overrides)?;
    let result = discover(&cfg, out).await?;

    if out.is_json() {
        out.print_json(&serde_json::json!({
            "picked": result.picked,
            "picked_expiry": result.picked_expiry,
            "expired": result.is_expired_at(Utc::now().fixed_offset()),
            "found": result.found,
            "matching": result.matching,
        }));
        return Ok(());
    }

    if out.is_quiet() {
        println!("{}", result.picked);
        return Ok(());
    }

    out.info(format!("Picked:   {}", result.picked));
    match result.picked_expiry {
        Some(exp) if result.is_expired_at(Utc::now().fixed_offset()) => {
            out.info(format!("Expires:  {exp} (already expired)"))
        }
        Some(exp) => out.info(format!("Expires:  {exp}")),
        None => out.info("Expires:  unknown"),
    }
    out.info(format!(
        "Observed: {} data request(s), {} matching",
        result.found.len(),
        result.matching.len()
    ));
    for url in &result.matching {
        out.info(format!("  * {}", ellipsize(url, 120)));
    }
    Ok(())
}
