//! Wallet config commands.

use anyhow::{bail, Context, Result};
use scout_services::{ScoutContext, WalletStatus};

use super::discover::{discover_for, pick_candidate, print_round};

pub fn print_status(status: &WalletStatus) {
    let detected = match status.detected {
        Some(true) => "yes",
        Some(false) => "no (config file not found)",
        None => "not checked",
    };
    println!("═══════════════════════════════════════");
    println!("  Wallet Config");
    println!("═══════════════════════════════════════");
    println!("  Path        : {}", status.path.display());
    println!("  Detected    : {}", detected);
    println!("  Network     : {}", status.network.as_deref().unwrap_or("-"));
    println!("  Coordinator : {}", status.coordinator.as_deref().unwrap_or("-"));
    if let Some(error) = &status.error {
        println!("  Error       : {}", error);
    }
}

pub async fn cmd_detect(ctx: &ScoutContext) -> Result<()> {
    let status = ctx.detect_wallet().await;
    print_status(&status);
    Ok(())
}

pub async fn cmd_use(ctx: &ScoutContext, prefix: &str, secs: u64) -> Result<()> {
    let status = ctx.detect_wallet().await;
    if let Some(error) = status.error {
        bail!("wallet config at {} is unusable: {}", status.path.display(), error);
    }

    discover_for(ctx, secs).await?;
    let candidate = pick_candidate(ctx, prefix).await?;
    let resolved = ctx
        .verify_candidate(&candidate)
        .await
        .with_context(|| format!("coordinator {} failed verification", candidate.short_pubkey()))?;
    ctx.stop_discovery().await;

    print_round(&resolved);

    ctx.set_coordinator(&resolved.endpoint)
        .await
        .context("failed to write wallet config")?;

    println!();
    println!("Coordinator set to {}", resolved.endpoint);
    print_status(&ctx.wallet_status().await);
    Ok(())
}
