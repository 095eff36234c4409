//! Configuration for coordscout, and the wallet config file it edits.
//!
//! Scout settings resolution order: environment variables → config file → defaults.
//!
//! Settings file location:
//!   1. $SCOUT_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/coordscout/config.toml
//!   3. ~/.config/coordscout/config.toml
//!
//! Wallet config location (`Config.json`):
//!   1. $SCOUT_WALLET_CONFIG or `[wallet] config_path`
//!   2. %APPDATA%/WalletWasabi/Client on Windows
//!   3. $HOME/.walletwasabi/client elsewhere
//!
//! Only the wallet's `Network` key and its coordinator key are interpreted;
//! every other key is carried through writes untouched.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::filter::{COORDINATOR_KIND, COORDINATOR_TYPE};
use crate::wire::RelayUrl;

// ── Scout settings ────────────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub relays: RelayConfig,
    pub discovery: DiscoveryConfig,
    pub verifier: VerifierConfig,
    pub wallet: WalletSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Relays to subscribe on. Entries that are not ws/wss URLs are skipped.
    pub urls: Vec<String>,
    /// Budget for the initial connection attempt of a discovery session.
    pub connect_timeout_secs: u64,
    /// Delay before reconnecting a dropped relay.
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Event kind coordinators announce with.
    pub kind: u32,
    /// Required value of the `type` tag.
    pub type_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// HTTP timeout for a coordinator status request.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletSettings {
    /// Wallet `Config.json`. Empty = per-OS default.
    pub config_path: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            urls: vec!["wss://relay.primal.net".to_string()],
            connect_timeout_secs: 10,
            reconnect_delay_ms: 2_000,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            kind: COORDINATOR_KIND,
            type_value: COORDINATOR_TYPE.to_string(),
        }
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("coordscout")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Wallet data directory. Its layout must match what the wallet itself uses.
pub fn wallet_data_dir() -> Result<PathBuf, ConfigError> {
    let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

    if cfg!(windows) {
        non_empty("APPDATA")
            .map(|dir| PathBuf::from(dir).join("WalletWasabi").join("Client"))
            .ok_or(ConfigError::NoDataDir)
    } else {
        non_empty("HOME")
            .map(|dir| PathBuf::from(dir).join(".walletwasabi").join("client"))
            .ok_or(ConfigError::NoDataDir)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, String),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(String),
    #[error("{0} is not a JSON object")]
    NotAnObject(PathBuf),
    #[error("\"Network\" in {0} is not a string")]
    InvalidNetwork(PathBuf),
    #[error("no coordinator configured for {network} (expected key {key})")]
    MissingCoordinator { network: String, key: String },
    #[error("could not find a suitable wallet data directory")]
    NoDataDir,
    #[error("no wallet network detected")]
    NoNetwork,
    #[error("wallet config has an unresolved error; detect it again before writing")]
    WritesBlocked,
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ScoutConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text)
                .map_err(|e| ConfigError::ParseFailed(path.clone(), e.to_string()))?
        } else {
            ScoutConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("SCOUT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&ScoutConfig::default())
                .map_err(|e| ConfigError::SerializeFailed(e.to_string()))?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply SCOUT_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SCOUT_RELAYS") {
            self.relays.urls = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(v) = std::env::var("SCOUT_DISCOVERY__KIND") {
            if let Ok(k) = v.parse() {
                self.discovery.kind = k;
            }
        }
        if let Ok(v) = std::env::var("SCOUT_VERIFIER__TIMEOUT_SECS") {
            if let Ok(t) = v.parse() {
                self.verifier.timeout_secs = t;
            }
        }
        if let Ok(v) = std::env::var("SCOUT_WALLET_CONFIG") {
            self.wallet.config_path = PathBuf::from(v);
        }
    }

    /// Configured relays that parse as ws/wss URLs.
    pub fn relay_urls(&self) -> Vec<RelayUrl> {
        parse_relays(&self.relays.urls)
    }
}

/// Parse relay strings, skipping (and logging) the ones that are not relay URLs.
pub fn parse_relays<S: AsRef<str>>(raw: &[S]) -> Vec<RelayUrl> {
    raw.iter()
        .filter_map(|s| match RelayUrl::parse(s.as_ref()) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(error = %e, "skipping relay");
                None
            }
        })
        .collect()
}

// ── Wallet config ─────────────────────────────────────────────────────────────

/// Network assumed when the wallet config has no `Network` key.
pub const DEFAULT_NETWORK: &str = "mainnet";

/// Outcome of reading the wallet config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// No config file at the expected path.
    Absent,
    /// File present, network and coordinator resolved.
    Present { network: String, coordinator: String },
}

/// Handle on the wallet's `Config.json`.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    path: PathBuf,
}

impl WalletConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Locate the wallet config from settings, falling back to the per-OS default.
    pub fn locate(settings: &WalletSettings) -> Result<Self, ConfigError> {
        if !settings.config_path.as_os_str().is_empty() {
            return Ok(Self::at(settings.config_path.clone()));
        }
        Ok(Self::at(wallet_data_dir()?.join("Config.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the network and coordinator from the wallet config.
    ///
    /// A file that parses but names no coordinator yields
    /// `MissingCoordinator`, which still carries the detected network.
    pub fn detect(&self) -> Result<Detection, ConfigError> {
        if !self.path.exists() {
            return Ok(Detection::Absent);
        }
        let doc = self.read_object()?;

        let network = match doc.get("Network") {
            None | Some(Value::Null) => DEFAULT_NETWORK.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => return Err(ConfigError::InvalidNetwork(self.path.clone())),
        };

        match read_coordinator(&doc, &network) {
            Some(coordinator) => Ok(Detection::Present {
                network,
                coordinator,
            }),
            None => Err(ConfigError::MissingCoordinator {
                key: coordinator_key(&network),
                network,
            }),
        }
    }

    /// Replace the coordinator for `network`, keeping every other key as is.
    pub fn write_coordinator(&self, network: &str, uri: &str) -> Result<(), ConfigError> {
        let mut doc = self.read_object()?;
        doc.insert(coordinator_key(network), Value::String(uri.to_string()));

        let text = serde_json::to_string_pretty(&Value::Object(doc))
            .map_err(|e| ConfigError::SerializeFailed(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text).map_err(|e| ConfigError::WriteFailed(tmp.clone(), e))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| ConfigError::WriteFailed(self.path.clone(), e))?;

        tracing::info!(path = %self.path.display(), network, uri, "coordinator written");
        Ok(())
    }

    fn read_object(&self) -> Result<Map<String, Value>, ConfigError> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| ConfigError::ReadFailed(self.path.clone(), e))?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ConfigError::ParseFailed(self.path.clone(), e.to_string()))?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(ConfigError::NotAnObject(self.path.clone())),
        }
    }
}

/// `<Network>CoordinatorUri`, with the network suffixed by `Net` unless it
/// already ends in `net`.
pub fn coordinator_key(network: &str) -> String {
    if network.to_ascii_lowercase().ends_with("net") {
        format!("{network}CoordinatorUri")
    } else {
        format!("{network}NetCoordinatorUri")
    }
}

/// Legacy backend key used when no coordinator key is present.
pub fn backend_key(network: &str) -> String {
    if network.eq_ignore_ascii_case("testnet") {
        format!("{network}ClearnetBackendUri")
    } else {
        format!("{network}BackendUri")
    }
}

fn read_coordinator(doc: &Map<String, Value>, network: &str) -> Option<String> {
    if let Some(value) = doc.get(&coordinator_key(network)) {
        return value.as_str().map(str::to_string);
    }
    doc.get(&backend_key(network))
        .and_then(Value::as_str)
        .map(str::to_string)
}
