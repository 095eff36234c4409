//! Discovery commands.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use scout_core::DiscoveryEvent;
use scout_services::{ResolvedCoordinator, ScoutContext, StartOutcome};

/// Run discovery for `secs` seconds. The session is left running.
pub async fn discover_for(ctx: &ScoutContext, secs: u64) -> Result<()> {
    match ctx.start_discovery().await.context("discovery failed")? {
        StartOutcome::Active { relays } => {
            eprintln!("Listening on {} relay(s) for {}s...", relays, secs);
        }
        StartOutcome::NoNetwork => bail!("no wallet network detected; run `scout-ctl detect`"),
        StartOutcome::Superseded => bail!("discovery was restarted by another request"),
    }
    tokio::time::sleep(Duration::from_secs(secs)).await;
    Ok(())
}

/// Exactly one candidate whose key starts with `prefix`.
pub async fn pick_candidate(ctx: &ScoutContext, prefix: &str) -> Result<DiscoveryEvent> {
    let mut matches = ctx.find_candidates(prefix).await;
    match matches.len() {
        0 => bail!("no discovered coordinator matches {}", prefix),
        1 => Ok(matches.remove(0)),
        n => bail!("{} coordinators match {}; use a longer prefix", n, prefix),
    }
}

fn age(created_at: u64) -> String {
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    let secs = now.saturating_sub(created_at);
    match secs {
        0..=59 => format!("{}s ago", secs),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

pub async fn cmd_discover(ctx: &ScoutContext, secs: u64) -> Result<()> {
    ctx.detect_wallet().await;
    discover_for(ctx, secs).await?;
    let candidates = ctx.candidates().await;
    ctx.stop_discovery().await;

    if candidates.is_empty() {
        println!("No coordinators discovered.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Discovered Coordinators ({})", candidates.len());
    println!("═══════════════════════════════════════");
    for c in &candidates {
        println!("  ┌─ {}", c.short_pubkey());
        println!("  │  endpoint : {}", c.endpoint().unwrap_or("-"));
        println!("  └─ seen     : {}", age(c.created_at));
    }
    Ok(())
}

pub async fn cmd_inspect(ctx: &ScoutContext, prefix: &str, secs: u64) -> Result<()> {
    ctx.detect_wallet().await;
    discover_for(ctx, secs).await?;
    let candidate = pick_candidate(ctx, prefix).await;
    let result = match candidate {
        Ok(candidate) => ctx.verify_candidate(&candidate).await,
        Err(e) => {
            ctx.stop_discovery().await;
            return Err(e);
        }
    };
    ctx.stop_discovery().await;

    match result {
        Ok(resolved) => print_round(&resolved),
        Err(e) => println!("Verification failed: {}", e),
    }
    Ok(())
}

pub fn print_round(resolved: &ResolvedCoordinator) {
    let p = &resolved.parameters;
    println!("═══════════════════════════════════════");
    println!("  Coordinator {}", resolved.event.short_pubkey());
    println!("═══════════════════════════════════════");
    println!("  Endpoint            : {}", resolved.endpoint);
    println!("  Network             : {}", p.network);
    println!("  Identifier          : {}", p.coordination_identifier);
    println!("  Mining fee rate     : {} sat/kvB", p.mining_fee_rate);
    println!(
        "  Coordination fee    : {:.2}% (free above {} sat)",
        p.coordination_fee_rate.rate * 100.0,
        p.coordination_fee_rate.plebs_dont_pay_threshold
    );
    println!(
        "  Inputs per round    : {} - {}",
        p.min_input_count_by_round, p.max_input_count_by_round
    );
    println!(
        "  Input amounts       : {} - {} sat",
        p.allowed_input_amounts.min, p.allowed_input_amounts.max
    );
    println!(
        "  Output amounts      : {} - {} sat",
        p.allowed_output_amounts.min, p.allowed_output_amounts.max
    );
    println!("  Input types         : {}", p.input_type_names().join(", "));
    println!("  Output types        : {}", p.output_type_names().join(", "));
    println!("  Max suggested       : {} sat", p.max_suggested_amount);
    println!("  Input registration  : {}", p.standard_input_registration_timeout);
    println!("  Connection confirm  : {}", p.connection_confirmation_timeout);
    println!("  Output registration : {}", p.output_registration_timeout);
    println!("  Signing             : {}", p.transaction_signing_timeout);
}

pub async fn cmd_relays(ctx: &ScoutContext) -> Result<()> {
    let relays = ctx.relays().await;
    if relays.is_empty() {
        println!("No relays configured.");
        return Ok(());
    }
    println!("Relays ({}):", relays.len());
    for r in &relays {
        println!("  {}", r);
    }
    Ok(())
}
