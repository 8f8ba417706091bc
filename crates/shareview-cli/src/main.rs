//! `shareview`: discover, fetch and cache a shared table view.

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use shareview::config::Overrides;

mod cli;

use cli::output::Output;

#[derive(Parser)]
#[command(
    name = "shareview",
    about = "Shareview: find and fetch the data behind a public shared table view",
    version,
    after_help = "Identifiers are read from AIRTABLE_VIEW_ID / AIRTABLE_SHARE_ID \
                  (or a .env file) unless given as flags."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Public page that embeds the shared view
    #[arg(long, global = true)]
    page_url: Option<String>,

    /// View identifier to look for
    #[arg(long, global = true)]
    view_id: Option<String>,

    /// Share identifier to look for
    #[arg(long, global = true)]
    share_id: Option<String>,

    /// Browser user-agent string
    #[arg(long, global = true)]
    user_agent: Option<String>,

    /// Navigation timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Extra observation time after DOMContentLoaded, in milliseconds
    #[arg(long, global = true)]
    settle_ms: Option<u64>,

    /// Path to a Chrome/Chromium binary
    #[arg(long, global = true)]
    chromium: Option<PathBuf>,

    /// Directory for cached discoveries
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the page and report the discovered data URL
    Discover,
    /// Discover (cached) and fetch the shared view's JSON
    Fetch {
        /// Ignore and replace any cached discovery
        #[arg(long)]
        fresh: bool,
        /// Reshape the payload into rows keyed by column name
        #[arg(long)]
        table: bool,
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Check Chromium availability and the resolved configuration
    Doctor,
    /// Manage cached discoveries
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove every cached discovery
    Clear,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            page_url: self.page_url.clone(),
            view_id: self.view_id.clone(),
            share_id: self.share_id.clone(),
            user_agent: self.user_agent.clone(),
            timeout_ms: self.timeout_ms,
            settle_ms: self.settle_ms,
            chromium_path: self.chromium.clone(),
            cache_dir: self.cache_dir.clone(),
        }
    }
}

fn init_logging(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // local development convenience; absence is fine
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_json);

    let out = Output::new(cli.json, cli.quiet);
    let overrides = cli.overrides();

    let result = match &cli.command {
        Commands::Discover => cli::discover_cmd::run(&overrides, &out).await,
        Commands::Fetch {
            fresh,
            table,
            output,
        } => cli::fetch_cmd::run(&overrides, &out, *fresh, *table, output.as_deref()).await,
        Commands::Doctor => cli::doctor::run(&overrides, &out),
        Commands::Cache { action } => match action {
            CacheAction::Clear => cli::cache_cmd::run_clear(&overrides, &out),
        },
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "shareview", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if out.is_json() {
            out.print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else if !out.is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
