//! Application context — everything a shell drives.
//!
//! Holds the wallet detection result, the relay list, the current discovery
//! session and the expanded (verified) coordinator. Mutating operations go
//! through the busy gate; reads never wait on it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};

use scout_core::config::parse_relays;
use scout_core::{ConfigError, Detection, DiscoveryEvent, DiscoveryFilter, RelayUrl, ScoutConfig, WalletConfig};

use crate::gate::LoadingGate;
use crate::notify::{StateEvent, StateNotifier};
use crate::session::{DiscoveryError, DiscoverySession, SessionState, StartOutcome};
use crate::verifier::{CoordinatorVerifier, ResolvedCoordinator, VerificationError};

/// What the last wallet detection found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletStatus {
    pub path: PathBuf,
    /// `None` until detection has run; `Some(false)` if there is no config file.
    pub detected: Option<bool>,
    pub network: Option<String>,
    pub coordinator: Option<String>,
    /// Set when the file exists but could not be used. Blocks config writes.
    pub error: Option<String>,
}

#[derive(Default)]
struct SessionSlot {
    current: Option<Arc<DiscoverySession>>,
    state: SessionState,
}

pub struct ScoutContext {
    settings: ScoutConfig,
    wallet: WalletConfig,
    verifier: CoordinatorVerifier,
    notifier: StateNotifier,
    gate: LoadingGate,
    relays: Mutex<Vec<RelayUrl>>,
    session: Mutex<SessionSlot>,
    status: Mutex<WalletStatus>,
    expanded: Mutex<Option<ResolvedCoordinator>>,
}

impl ScoutContext {
    /// Build a context from settings, locating the wallet config per OS.
    pub fn new(settings: ScoutConfig) -> Result<Self, DiscoveryError> {
        let wallet = WalletConfig::locate(&settings.wallet)?;
        Self::with_wallet(settings, wallet)
    }

    pub fn with_wallet(settings: ScoutConfig, wallet: WalletConfig) -> Result<Self, DiscoveryError> {
        let verifier =
            CoordinatorVerifier::new(Duration::from_secs(settings.verifier.timeout_secs))?;
        let notifier = StateNotifier::new();
        let relays = settings.relay_urls();
        let status = WalletStatus {
            path: wallet.path().to_path_buf(),
            ..Default::default()
        };

        Ok(Self {
            gate: LoadingGate::new(notifier.clone()),
            relays: Mutex::new(relays),
            session: Mutex::new(SessionSlot::default()),
            status: Mutex::new(status),
            expanded: Mutex::new(None),
            settings,
            wallet,
            verifier,
            notifier,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StateEvent> {
        self.notifier.subscribe()
    }

    pub fn settings(&self) -> &ScoutConfig {
        &self.settings
    }

    // ── Wallet config ─────────────────────────────────────────────────────────

    /// Read the wallet config and record what was found.
    ///
    /// A changed network restarts an active discovery session.
    pub async fn detect_wallet(&self) -> WalletStatus {
        let guard = self.gate.acquire().await;

        let mut status = WalletStatus {
            path: self.wallet.path().to_path_buf(),
            ..Default::default()
        };
        match self.wallet.detect() {
            Ok(Detection::Absent) => {
                status.detected = Some(false);
            }
            Ok(Detection::Present {
                network,
                coordinator,
            }) => {
                status.detected = Some(true);
                status.network = Some(network);
                status.coordinator = Some(coordinator);
            }
            Err(ConfigError::MissingCoordinator { network, key }) => {
                status.detected = Some(true);
                status.error = Some(format!("missing {key}"));
                status.network = Some(network);
            }
            Err(e) => {
                status.detected = Some(true);
                status.error = Some(e.to_string());
            }
        }

        match &status.error {
            Some(error) => {
                tracing::warn!(path = %status.path.display(), error = %error, "wallet config unusable")
            }
            None => tracing::info!(
                path = %status.path.display(),
                detected = ?status.detected,
                network = ?status.network,
                coordinator = ?status.coordinator,
                "wallet detected"
            ),
        }

        let previous = std::mem::replace(&mut *self.status.lock().await, status.clone());
        self.notifier.notify(StateEvent::ConfigChanged);
        drop(guard);

        if previous.network != status.network && self.is_discovering().await {
            tracing::info!(network = ?status.network, "wallet network changed, restarting discovery");
            if let Err(e) = self.start_discovery().await {
                tracing::warn!(error = %e, "discovery restart failed");
            }
        }
        status
    }

    /// Write `uri` as the coordinator for the detected network, then re-detect.
    pub async fn set_coordinator(&self, uri: &str) -> Result<(), ConfigError> {
        let guard = self.gate.acquire().await;

        let result = {
            let status = self.status.lock().await.clone();
            if status.error.is_some() {
                Err(ConfigError::WritesBlocked)
            } else if let Some(network) = status.network {
                self.wallet.write_coordinator(&network, uri)
            } else {
                Err(ConfigError::NoNetwork)
            }
        };

        drop(guard);
        self.detect_wallet().await;
        result
    }

    pub async fn wallet_status(&self) -> WalletStatus {
        self.status.lock().await.clone()
    }

    // ── Relays ────────────────────────────────────────────────────────────────

    pub async fn relays(&self) -> Vec<RelayUrl> {
        self.relays.lock().await.clone()
    }

    /// Replace the relay list. An active session is restarted on the new list.
    ///
    /// Invalid entries are skipped. If every entry is invalid the current
    /// list is kept and `InvalidRelays` is returned; an empty `raw` clears it.
    pub async fn set_relays<S: AsRef<str>>(
        &self,
        raw: &[S],
    ) -> Result<Option<StartOutcome>, DiscoveryError> {
        let relays = parse_relays(raw);
        if relays.is_empty() && !raw.is_empty() {
            return Err(DiscoveryError::InvalidRelays {
                rejected: raw.len(),
            });
        }
        tracing::info!(
            count = relays.len(),
            skipped = raw.len() - relays.len(),
            "relay list updated"
        );
        *self.relays.lock().await = relays;

        if self.is_discovering().await {
            return self.start_discovery().await.map(Some);
        }
        Ok(None)
    }

    /// Hint for a shell: the relay list should only be edited while idle.
    pub async fn relays_editable(&self) -> bool {
        !self.is_discovering().await && !self.is_busy()
    }

    // ── Discovery ─────────────────────────────────────────────────────────────

    /// Start (or restart) discovery for the detected wallet network.
    pub async fn start_discovery(&self) -> Result<StartOutcome, DiscoveryError> {
        let network = self.status.lock().await.network.clone();
        let relays = self.relays().await;

        let session = {
            let mut slot = self.session.lock().await;
            if let Some(previous) = slot.current.take() {
                tracing::debug!(network = previous.network(), "superseding discovery session");
                previous.cancel();
            }

            let Some(network) = network else {
                self.set_state(&mut slot, SessionState::Idle);
                tracing::info!("no wallet network detected, discovery not started");
                return Ok(StartOutcome::NoNetwork);
            };
            if relays.is_empty() {
                self.set_state(&mut slot, SessionState::Idle);
                return Err(DiscoveryError::NoRelays);
            }

            let session = Arc::new(DiscoverySession::new(
                network,
                relays,
                Duration::from_millis(self.settings.relays.reconnect_delay_ms),
                self.notifier.clone(),
            ));
            slot.current = Some(session.clone());
            self.set_state(&mut slot, SessionState::Starting);
            session
        };

        let _guard = self.gate.acquire().await;
        if session.is_cancelled() {
            return Ok(StartOutcome::Superseded);
        }

        let timeout = Duration::from_secs(self.settings.relays.connect_timeout_secs);
        let connected = session.connect(timeout, &self.notifier).await;

        let mut slot = self.session.lock().await;
        let is_current = slot
            .current
            .as_ref()
            .is_some_and(|c| Arc::ptr_eq(c, &session));
        if session.is_cancelled() || !is_current {
            return Ok(StartOutcome::Superseded);
        }

        match connected {
            Ok(open) => {
                let filter = DiscoveryFilter::new(
                    self.settings.discovery.kind,
                    self.settings.discovery.type_value.clone(),
                    session.network(),
                );
                session.spawn_ingest(filter);
                self.set_state(&mut slot, SessionState::Active);
                tracing::info!(network = session.network(), relays = open, "discovery active");
                Ok(StartOutcome::Active { relays: open })
            }
            Err(e) => {
                session.cancel();
                slot.current = None;
                self.set_state(&mut slot, SessionState::Idle);
                tracing::warn!(error = %e, "discovery failed to start");
                Err(e.into())
            }
        }
    }

    /// Stop discovery. Returns without waiting for background tasks.
    pub async fn stop_discovery(&self) {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.current.take() {
            self.set_state(&mut slot, SessionState::Stopping);
            session.cancel();
            tracing::info!(network = session.network(), "discovery stopped");
        }
        self.set_state(&mut slot, SessionState::Idle);
        self.notifier.notify(StateEvent::CandidatesChanged);
    }

    pub async fn session_state(&self) -> SessionState {
        self.session.lock().await.state
    }

    pub async fn is_discovering(&self) -> bool {
        matches!(
            self.session_state().await,
            SessionState::Starting | SessionState::Active
        )
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// Candidates of the current session, in first-seen order.
    pub async fn candidates(&self) -> Vec<DiscoveryEvent> {
        let slot = self.session.lock().await;
        slot.current
            .as_ref()
            .map(|s| s.registry().snapshot())
            .unwrap_or_default()
    }

    /// Candidates whose publisher key starts with `prefix`.
    pub async fn find_candidates(&self, prefix: &str) -> Vec<DiscoveryEvent> {
        let slot = self.session.lock().await;
        slot.current
            .as_ref()
            .map(|s| s.registry().find_by_prefix(prefix))
            .unwrap_or_default()
    }

    fn set_state(&self, slot: &mut SessionSlot, state: SessionState) {
        if slot.state != state {
            slot.state = state;
            self.notifier
                .notify(StateEvent::SessionStateChanged { state });
        }
    }

    // ── Verification ──────────────────────────────────────────────────────────

    /// Verify one candidate and, on success, make it the expanded coordinator.
    pub async fn verify_candidate(
        &self,
        candidate: &DiscoveryEvent,
    ) -> Result<ResolvedCoordinator, VerificationError> {
        let _guard = self.gate.acquire().await;

        let result = self.verifier.verify(candidate).await;
        match &result {
            Ok(resolved) => {
                *self.expanded.lock().await = Some(resolved.clone());
                self.notifier.notify(StateEvent::ExpandedCoordinatorChanged);
            }
            Err(e) => {
                tracing::warn!(pubkey = candidate.short_pubkey(), error = %e, "verification failed");
            }
        }
        result
    }

    pub async fn expanded_coordinator(&self) -> Option<ResolvedCoordinator> {
        self.expanded.lock().await.clone()
    }

    /// Forget the expanded coordinator.
    pub async fn collapse(&self) {
        if self.expanded.lock().await.take().is_some() {
            self.notifier.notify(StateEvent::ExpandedCoordinatorChanged);
        }
    }
}
