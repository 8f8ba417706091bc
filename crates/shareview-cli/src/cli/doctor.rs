//! Environment readiness check.

use std::path::PathBuf;

use anyhow::Result;

use shareview::config::{resolve_cache_dir, Config, Overrides, ENV_CHROMIUM_PATH};
use shareview::find_chromium;

use super::output::Output;

/// Check Chromium availability and report the resolved configuration.
pub fn run(overrides: &Overrides, out: &Output) -> Result<()> {
    let config = Config::from_env(overrides);
    // the configured path still counts when the target is missing
    let chromium = match &config {
        Ok(cfg) => cfg.chromium_path.clone(),
        Err(_) => overrides
            .chromium_path
            .clone()
            .or_else(|| std::env::var(ENV_CHROMIUM_PATH).ok().map(PathBuf::from))
            .filter(|p| p.is_file())
            .or_else(find_chromium),
    };
    let cache_dir =
        resolve_cache_dir(overrides.cache_dir.clone(), |name| std::env::var(name).ok());

    if out.is_json() {
        let config_json = match &config {
            Ok(cfg) => serde_json::json!({
                "page_url": cfg.page_url,
                "view_id": cfg.target.view_id(),
                "share_id": cfg.target.share_id(),
                "user_agent": cfg.user_agent,
                "timeout_ms": cfg.timeout.as_millis() as u64,
                "settle_ms": cfg.settle.as_millis() as u64,
                "data_host": cfg.data_host,
                "cache_ttl_secs": cfg.cache_ttl.as_secs(),
            }),
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        };
        out.print_json(&serde_json::json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "chromium": chromium.as_ref().map(|p| p.display().to_string()),
            "cache_dir": cache_dir.display().to_string(),
            "config": config_json,
            "ready": chromium.is_some() && config.is_ok(),
        }));
        return Ok(());
    }

    println!("Shareview Doctor");
    println!("================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!("[!!] Chromium NOT found. Install Chrome/Chromium or pass --chromium."),
    }

    match &config {
        Ok(cfg) => {
            println!(
                "[OK] Target: view {} / share {}",
                cfg.target.view_id(),
                cfg.target.share_id()
            );
            println!("     Page:    {}", cfg.page_url);
            println!("     Host:    {}", cfg.data_host);
            println!(
                "     Timing:  timeout {}ms, settle {}ms",
                cfg.timeout.as_millis(),
                cfg.settle.as_millis()
            );
        }
        Err(e) => println!("[!!] Configuration: {e}"),
    }
    println!("[..] Cache directory: {}", cache_dir.display());

    println!();
    if chromium.is_some() && config.is_ok() {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}
