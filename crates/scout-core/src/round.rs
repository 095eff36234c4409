//! Coordinator status payload.
//!
//! `POST {endpoint}/wabisabi/status` with `{"roundCheckpoints": []}` returns
//! every round the coordinator currently tracks. Only the fields needed to
//! identify the live round and describe its parameters are modelled; the rest
//! of the payload is ignored.

use serde::{Deserialize, Serialize};

/// Path appended to a coordinator endpoint for the status query.
pub const STATUS_PATH: &str = "wabisabi/status";

/// Event type that carries a round's parameters.
pub const ROUND_CREATED: &str = "RoundCreated";

// ── Request ───────────────────────────────────────────────────────────────────

/// Status request body. An empty checkpoint list asks for every round.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub round_checkpoints: Vec<RoundCheckpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundCheckpoint {
    pub round_id: String,
    pub state_id: u32,
}

// ── Response ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Absent and empty are treated the same: no active rounds.
    #[serde(default)]
    pub round_states: Option<Vec<RoundState>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundState {
    /// ISO-8601 date-time; the round with the latest value is the live one.
    pub input_registration_end: String,
    #[serde(default)]
    pub coinjoin_state: CoinjoinState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoinjoinState {
    #[serde(default)]
    pub events: Vec<CoinjoinEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinjoinEvent {
    #[serde(rename = "Type")]
    pub event_type: String,
    #[serde(rename = "roundParameters", default)]
    pub round_parameters: Option<RoundParameters>,
}

impl RoundState {
    /// First `RoundCreated` event in this round's event list.
    pub fn round_created(&self) -> Option<&CoinjoinEvent> {
        self.coinjoin_state
            .events
            .iter()
            .find(|e| e.event_type == ROUND_CREATED)
    }
}

// ── Round parameters ──────────────────────────────────────────────────────────

/// Parameters of a coordinator's active round.
///
/// Missing fields fall back to zero/empty so that coordinators running an
/// older or newer schema still verify.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoundParameters {
    pub network: String,
    /// sat/kvB.
    pub mining_fee_rate: u64,
    pub coordination_fee_rate: CoordinationFeeRate,
    pub max_suggested_amount: u64,
    pub min_input_count_by_round: u32,
    pub max_input_count_by_round: u32,
    pub allowed_input_amounts: AmountRange,
    pub allowed_output_amounts: AmountRange,
    pub allowed_input_types: Vec<u32>,
    pub allowed_output_types: Vec<u32>,
    /// Timeouts arrive pre-formatted, e.g. `"0d 1h 0m 0s"`.
    pub standard_input_registration_timeout: String,
    pub connection_confirmation_timeout: String,
    pub output_registration_timeout: String,
    pub transaction_signing_timeout: String,
    pub blame_input_registration_timeout: String,
    pub min_amount_credential_value: u64,
    pub max_amount_credential_value: u64,
    pub initial_input_vsize_allocation: u64,
    pub max_vsize_credential_value: u64,
    pub max_vsize_allocation_per_alice: u64,
    pub coordination_identifier: String,
    pub max_transaction_size: u64,
    pub min_relay_tx_fee: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoordinationFeeRate {
    pub rate: f64,
    pub plebs_dont_pay_threshold: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmountRange {
    pub min: u64,
    pub max: u64,
}

/// Script types a round may allow, in coordinator wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    Witness,
    P2pkh,
    P2sh,
    P2pk,
    P2wpkh,
    P2wsh,
    MultiSig,
    Taproot,
}

impl ScriptType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Witness),
            1 => Some(Self::P2pkh),
            2 => Some(Self::P2sh),
            3 => Some(Self::P2pk),
            4 => Some(Self::P2wpkh),
            5 => Some(Self::P2wsh),
            6 => Some(Self::MultiSig),
            7 => Some(Self::Taproot),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Witness => "Witness",
            Self::P2pkh => "P2PKH",
            Self::P2sh => "P2SH",
            Self::P2pk => "P2PK",
            Self::P2wpkh => "P2WPKH",
            Self::P2wsh => "P2WSH",
            Self::MultiSig => "MultiSig",
            Self::Taproot => "Taproot",
        }
    }
}

impl RoundParameters {
    /// Human-readable names of the allowed input script types.
    pub fn input_type_names(&self) -> Vec<&'static str> {
        script_names(&self.allowed_input_types)
    }

    pub fn output_type_names(&self) -> Vec<&'static str> {
        script_names(&self.allowed_output_types)
    }
}

fn script_names(raw: &[u32]) -> Vec<&'static str> {
    raw.iter()
        .map(|v| ScriptType::from_u32(*v).map(ScriptType::name).unwrap_or("Unknown"))
        .collect()
}
