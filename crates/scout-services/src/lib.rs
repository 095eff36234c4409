//! scout-services — discovery pipeline and application state.
//!
//! Relay events flow through a per-session `CandidateRegistry`; a
//! `CoordinatorVerifier` confirms a selected candidate over HTTP; the
//! `ScoutContext` ties sessions, the busy gate and the wallet config together.

pub mod context;
pub mod gate;
pub mod notify;
pub mod registry;
pub mod session;
pub mod verifier;

pub use context::{ScoutContext, WalletStatus};
pub use gate::{GateGuard, LoadingGate};
pub use notify::{StateEvent, StateNotifier};
pub use registry::CandidateRegistry;
pub use session::{DiscoveryError, DiscoverySession, SessionState, StartOutcome};
pub use verifier::{CoordinatorVerifier, ResolvedCoordinator, VerificationError};
