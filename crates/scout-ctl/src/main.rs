//! scout-ctl — discover coordinators and point the wallet at one.

mod cmd;

use anyhow::{Context, Result};
use scout_core::ScoutConfig;
use scout_services::ScoutContext;

const DEFAULT_SECS: u64 = 10;

fn print_usage() {
    println!("Usage: scout-ctl [--secs <n>] <command>");
    println!();
    println!("Commands:");
    println!("  detect            Show the wallet config this tool would edit");
    println!("  discover          List coordinators announced on the relays");
    println!("  inspect <prefix>  Verify a discovered coordinator and show its round");
    println!("  use <prefix>      Verify a coordinator and write it to the wallet config");
    println!("  relays            Show the relays in use");
    println!("  init              Write a default settings file if none exists");
    println!();
    println!("Options:");
    println!("  --secs <n>   How long to listen for announcements (default: {})", DEFAULT_SECS);
    println!();
    println!("Settings: {}", ScoutConfig::file_path().display());
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut secs = DEFAULT_SECS;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--secs" {
            i += 1;
            secs = args
                .get(i)
                .context("--secs requires a value")?
                .parse()
                .context("--secs must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    if matches!(remaining.as_slice(), ["help"] | ["--help"] | ["-h"] | []) {
        print_usage();
        return Ok(());
    }
    if matches!(remaining.as_slice(), ["init"]) {
        let path = ScoutConfig::write_default_if_missing().context("failed to write settings")?;
        println!("Settings at {}", path.display());
        return Ok(());
    }

    let settings = ScoutConfig::load().context("failed to load settings")?;
    tracing::debug!(relays = ?settings.relays.urls, "settings loaded");
    let ctx = ScoutContext::new(settings).context("failed to initialise")?;

    match remaining.as_slice() {
        ["detect"] => cmd::wallet::cmd_detect(&ctx).await,
        ["discover"] => cmd::discover::cmd_discover(&ctx, secs).await,
        ["inspect", prefix] => cmd::discover::cmd_inspect(&ctx, prefix, secs).await,
        ["use", prefix] => cmd::wallet::cmd_use(&ctx, prefix, secs).await,
        ["relays"] => cmd::discover::cmd_relays(&ctx).await,
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
