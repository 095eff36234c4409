//! coordscout integration test harness.
//!
//! Everything runs in-process: a websocket relay on a loopback port, an HTTP
//! coordinator on another, and a wallet config in a temp directory.
//!
//!   cargo test --test integration
//!
//! Each test owns its relay, coordinator and temp directory, so tests can run
//! in parallel.

mod discovery;
mod verify;

use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use scout_core::{RelayUrl, ScoutConfig, WalletConfig};
use scout_services::ScoutContext;

pub use infra::*;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Temp directory holding one wallet config, removed on drop.
pub struct TempWallet {
    pub dir: PathBuf,
    pub path: PathBuf,
}

impl TempWallet {
    /// `body = None` leaves the config file absent.
    pub fn new(name: &str, body: Option<&str>) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "scout-integration-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("Config.json");
        if let Some(body) = body {
            std::fs::write(&path, body).expect("write wallet config");
        }
        Self { dir, path }
    }

    pub fn config(&self) -> WalletConfig {
        WalletConfig::at(self.path.clone())
    }

    pub fn write(&self, body: &str) {
        std::fs::write(&self.path, body).expect("rewrite wallet config");
    }
}

impl Drop for TempWallet {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// Settings pointing at the given relays, with short timeouts.
pub fn settings(relays: &[&RelayUrl]) -> ScoutConfig {
    let mut settings = ScoutConfig::default();
    settings.relays.urls = relays.iter().map(|r| r.to_string()).collect();
    settings.relays.connect_timeout_secs = 5;
    settings.relays.reconnect_delay_ms = 100;
    settings.verifier.timeout_secs = 5;
    settings
}

pub fn context(relays: &[&RelayUrl], wallet: &TempWallet) -> ScoutContext {
    ScoutContext::with_wallet(settings(relays), wallet.config()).expect("build context")
}

/// Poll `check` until it holds, panicking after ten seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if check().await {
            return;
        }
        if Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

pub const MAINNET_WALLET: &str =
    r#"{"Network": "Main", "MainNetCoordinatorUri": "https://old.example/"}"#;
